//! Path tracer configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bvh::DEFAULT_MAX_LEAF_SIZE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Direct lighting estimator used at each non-delta hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DirectLighting {
    /// Uniform hemisphere directions; only finds lights by hitting emitters.
    Hemisphere,
    /// Samples each light directly.
    #[default]
    Importance,
}

/// Render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathTracerConfig {
    /// Maximum ray bounce depth
    pub max_ray_depth: u32,
    /// Maximum samples per pixel
    pub ns_aa: u32,
    /// Samples per area light (and hemisphere samples per light)
    pub ns_area_light: u32,
    /// Convergence is checked every this many samples
    pub samples_per_batch: u32,
    /// Relative half-width of the 95% confidence interval that stops sampling
    pub max_tolerance: f64,
    pub direct_lighting: DirectLighting,
    /// Stop sampling a pixel early once it has converged
    pub adaptive: bool,
    pub max_leaf_size: usize,
    /// Base seed for the per-pixel RNG streams
    pub seed: u64,
    /// Bucket edge length in pixels
    pub bucket_size: u32,
}

impl Default for PathTracerConfig {
    fn default() -> Self {
        Self {
            max_ray_depth: 5,
            ns_aa: 16,
            ns_area_light: 4,
            samples_per_batch: 32,
            max_tolerance: 0.05,
            direct_lighting: DirectLighting::Importance,
            adaptive: true,
            max_leaf_size: DEFAULT_MAX_LEAF_SIZE,
            seed: 0,
            bucket_size: 64,
        }
    }
}

impl PathTracerConfig {
    pub fn with_max_ray_depth(mut self, max_ray_depth: u32) -> Self {
        self.max_ray_depth = max_ray_depth;
        self
    }

    pub fn with_samples(mut self, ns_aa: u32, ns_area_light: u32) -> Self {
        self.ns_aa = ns_aa;
        self.ns_area_light = ns_area_light;
        self
    }

    pub fn with_adaptive(mut self, samples_per_batch: u32, max_tolerance: f64) -> Self {
        self.adaptive = true;
        self.samples_per_batch = samples_per_batch;
        self.max_tolerance = max_tolerance;
        self
    }

    pub fn without_adaptive(mut self) -> Self {
        self.adaptive = false;
        self
    }

    pub fn with_direct_lighting(mut self, direct_lighting: DirectLighting) -> Self {
        self.direct_lighting = direct_lighting;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_bucket_size(mut self, bucket_size: u32) -> Self {
        self.bucket_size = bucket_size;
        self
    }

    /// Parse and validate a JSON config; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.ns_aa == 0 {
            return Err(ConfigError::Invalid("ns_aa must be at least 1".into()));
        }
        if self.samples_per_batch == 0 {
            return Err(ConfigError::Invalid("samples_per_batch must be at least 1".into()));
        }
        if self.max_tolerance.is_nan() || self.max_tolerance <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_tolerance must be positive, got {}",
                self.max_tolerance
            )));
        }
        if self.bucket_size == 0 {
            return Err(ConfigError::Invalid("bucket_size must be at least 1".into()));
        }
        Ok(())
    }
}
