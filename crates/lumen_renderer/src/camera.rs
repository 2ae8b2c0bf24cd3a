//! Pinhole and thin-lens camera.

use lumen_math::{Mat3, Ray, Vec3};

/// Camera for generating rays into the scene.
///
/// Image coordinates passed to the ray generators are normalized to `[0, 1]`
/// and measured from the bottom-left corner. In camera space the view
/// direction is -Z and the sensor sits on the plane `z = -1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Image width in pixels
    pub image_width: u32,
    /// Image height in pixels
    pub image_height: u32,

    look_from: Vec3,
    look_at: Vec3,
    vup: Vec3,

    /// Horizontal and vertical field of view in degrees
    hfov: f64,
    vfov: f64,

    /// Near and far clip distances applied to generated rays
    n_clip: f64,
    f_clip: f64,

    lens_radius: f64,
    focal_distance: f64,

    /// Camera-to-world rotation; columns are the camera's X, Y, Z axes.
    c2w: Mat3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        let mut camera = Self {
            image_width: 400,
            image_height: 225,
            look_from: Vec3::ZERO,
            look_at: Vec3::new(0.0, 0.0, -1.0),
            vup: Vec3::Y,
            hfov: 0.0,
            vfov: 40.0,
            n_clip: 0.0,
            f_clip: f64::INFINITY,
            lens_radius: 0.0,
            focal_distance: 1.0,
            c2w: Mat3::IDENTITY,
        };
        camera.update();
        camera
    }

    /// Set image resolution.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.image_width = width.max(1);
        self.image_height = height.max(1);
        self.update();
        self
    }

    /// Set camera position.
    pub fn with_position(mut self, look_from: Vec3, look_at: Vec3, vup: Vec3) -> Self {
        self.look_from = look_from;
        self.look_at = look_at;
        self.vup = vup;
        self.update();
        self
    }

    /// Set the vertical field of view in degrees; the horizontal one follows
    /// from the aspect ratio.
    pub fn with_fov(mut self, vfov: f64) -> Self {
        self.vfov = vfov;
        self.update();
        self
    }

    /// Set thin-lens settings. A zero radius gives a pinhole.
    pub fn with_lens(mut self, lens_radius: f64, focal_distance: f64) -> Self {
        self.lens_radius = lens_radius.max(0.0);
        self.focal_distance = focal_distance;
        self
    }

    /// Set the clip range applied to generated rays.
    pub fn with_clip(mut self, n_clip: f64, f_clip: f64) -> Self {
        self.n_clip = n_clip;
        self.f_clip = f_clip;
        self
    }

    fn update(&mut self) {
        let aspect = f64::from(self.image_width) / f64::from(self.image_height);
        let half_v = (self.vfov.to_radians() * 0.5).tan();
        self.hfov = (2.0 * (aspect * half_v).atan()).to_degrees();

        let w = (self.look_from - self.look_at).normalize();
        let u = self.vup.cross(w).normalize();
        let v = w.cross(u);
        self.c2w = Mat3::from_cols(u, v, w);
    }

    pub fn position(&self) -> Vec3 {
        self.look_from
    }

    pub fn c2w(&self) -> Mat3 {
        self.c2w
    }

    pub fn hfov(&self) -> f64 {
        self.hfov
    }

    pub fn vfov(&self) -> f64 {
        self.vfov
    }

    pub fn clip(&self) -> (f64, f64) {
        (self.n_clip, self.f_clip)
    }

    pub fn lens_radius(&self) -> f64 {
        self.lens_radius
    }

    pub fn focal_distance(&self) -> f64 {
        self.focal_distance
    }

    /// Camera-space point on the `z = -1` sensor plane for image coords (x, y).
    fn sensor_point(&self, x: f64, y: f64) -> Vec3 {
        let half_w = (self.hfov.to_radians() * 0.5).tan();
        let half_h = (self.vfov.to_radians() * 0.5).tan();
        Vec3::new((2.0 * x - 1.0) * half_w, (2.0 * y - 1.0) * half_h, -1.0)
    }

    /// Pinhole ray through normalized image coordinates.
    pub fn generate_ray(&self, x: f64, y: f64) -> Ray {
        let dir = self.c2w * self.sensor_point(x, y);
        Ray::new(self.look_from, dir.normalize()).with_range(self.n_clip, self.f_clip)
    }

    /// Thin-lens ray; `(lens_r, lens_theta)` pick a point on the unit lens
    /// disk (`lens_r` in `[0, 1)` is squared radius, `lens_theta` in radians).
    pub fn generate_ray_for_thin_lens(&self, x: f64, y: f64, lens_r: f64, lens_theta: f64) -> Ray {
        let sensor = self.sensor_point(x, y);
        let r = self.lens_radius * lens_r.sqrt();
        let p_lens = Vec3::new(r * lens_theta.cos(), r * lens_theta.sin(), 0.0);
        let p_focus = sensor * self.focal_distance;
        let dir = (self.c2w * (p_focus - p_lens)).normalize();

        Ray::new(self.look_from + self.c2w * p_lens, dir).with_range(self.n_clip, self.f_clip)
    }
}
