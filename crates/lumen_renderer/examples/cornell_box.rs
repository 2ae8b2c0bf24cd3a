//! Cornell box example.
//!
//! Renders a closed box with a ceiling area light, a mirror sphere and a
//! glass sphere, then writes `cornell.png` and the sample-rate heat map
//! `cornell_rate.png`.
//!
//! Usage: `cargo run --release --example cornell_box [config.json]`

use std::sync::Arc;

use anyhow::Context;
use lumen_renderer::{
    render, Bsdf, Camera, Frame, Light, Mesh, PathTracer, PathTracerConfig, SceneBuilder,
    Spectrum, Vec3,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            PathTracerConfig::from_json_str(&json)?
        }
        None => PathTracerConfig::default().with_samples(256, 4).with_adaptive(32, 0.05),
    };

    let mut builder = SceneBuilder::new().with_max_leaf_size(config.max_leaf_size);
    let white = builder.add_bsdf(Bsdf::diffuse(Spectrum::splat(0.73)));
    let red = builder.add_bsdf(Bsdf::diffuse(Spectrum::new(0.65, 0.05, 0.05)));
    let green = builder.add_bsdf(Bsdf::diffuse(Spectrum::new(0.12, 0.45, 0.15)));
    let mirror = builder.add_bsdf(Bsdf::mirror(Spectrum::splat(0.95)));
    let glass = builder.add_bsdf(Bsdf::glass(1.5, Spectrum::ONE, Spectrum::ONE));
    let gold = builder.add_bsdf(Bsdf::microfacet(
        Spectrum::new(0.143, 0.374, 1.442),
        Spectrum::new(3.983, 2.385, 1.603),
        0.25,
    ));

    // Box spans [-1, 1] on every axis with the open side facing +Z.
    let walls = [
        (Vec3::new(0.0, -1.0, 0.0), Vec3::Y, white),
        (Vec3::new(0.0, 1.0, 0.0), -Vec3::Y, white),
        (Vec3::new(0.0, 0.0, -1.0), Vec3::Z, white),
        (Vec3::new(-1.0, 0.0, 0.0), Vec3::X, red),
        (Vec3::new(1.0, 0.0, 0.0), -Vec3::X, green),
    ];
    for (center, normal, bsdf) in walls {
        builder.add_mesh(quad(center, normal, 1.0)?, bsdf);
    }

    builder.add_sphere(Vec3::new(-0.45, -0.6, -0.35), 0.4, mirror);
    builder.add_sphere(Vec3::new(0.45, -0.6, 0.2), 0.4, glass);
    builder.add_sphere(Vec3::new(0.0, -0.85, 0.55), 0.15, gold);

    builder.add_light(Light::area(
        Spectrum::splat(12.0),
        Vec3::new(0.0, 0.999, 0.0),
        -Vec3::Y,
        Vec3::new(0.5, 0.0, 0.0),
        Vec3::new(0.0, 0.0, 0.5),
    ));
    let scene = builder.build()?;

    let camera = Camera::new()
        .with_resolution(400, 400)
        .with_position(Vec3::new(0.0, 0.0, 3.4), Vec3::ZERO, Vec3::Y)
        .with_fov(40.0);

    let tracer = PathTracer::new(&scene, &camera, config);
    let output = render(&tracer);

    output.framebuffer.save_png("cornell.png")?;
    output.framebuffer.save_sample_rate_png("cornell_rate.png")?;
    println!(
        "Rendered in {:.2?}, wrote cornell.png and cornell_rate.png",
        output.elapsed
    );
    Ok(())
}

/// Two-triangle square of half-size `half` centered at `center`, facing `normal`.
fn quad(center: Vec3, normal: Vec3, half: f64) -> anyhow::Result<Arc<Mesh>> {
    let frame = Frame::from_normal(normal);
    let u = frame.to_world(Vec3::X) * half;
    let v = frame.to_world(Vec3::Y) * half;
    let positions = vec![
        center - u - v,
        center + u - v,
        center + u + v,
        center - u + v,
    ];
    let normals = vec![normal; 4];
    let mesh = Mesh::new(positions, vec![0, 1, 2, 0, 2, 3], Some(normals))?;
    Ok(Arc::new(mesh))
}
