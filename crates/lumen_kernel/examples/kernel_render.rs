//! Kernel dispatch example.
//!
//! Packs a small scene into device records, reloads it from raw bytes the
//! way a device upload would see it, and renders it with the kernel path
//! tracer. Writes `kernel.png`.
//!
//! Usage: `cargo run --release -p lumen_kernel --example kernel_render`

use lumen_kernel::{dispatch, PackedScene};
use lumen_renderer::{
    Bsdf, Camera, EnvironmentLight, Light, PathTracerConfig, SceneBuilder, Spectrum, Vec3,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut builder =
        SceneBuilder::new().with_environment(EnvironmentLight::Sky(Spectrum::new(0.5, 0.7, 1.0)));
    let ground = builder.add_bsdf(Bsdf::diffuse(Spectrum::splat(0.5)));
    let copper = builder.add_bsdf(Bsdf::microfacet(
        Spectrum::new(0.2, 0.92, 1.1),
        Spectrum::new(3.9, 2.45, 2.14),
        0.2,
    ));
    let glass = builder.add_bsdf(Bsdf::glass(1.5, Spectrum::ONE, Spectrum::ONE));
    builder.add_sphere(Vec3::new(0.0, -101.0, 0.0), 100.0, ground);
    builder.add_sphere(Vec3::new(-1.1, 0.0, -4.0), 1.0, copper);
    builder.add_sphere(Vec3::new(1.1, 0.0, -4.0), 1.0, glass);
    builder.add_light(Light::directional(Spectrum::splat(2.0), Vec3::new(-1.0, -2.0, -1.0)));
    let scene = builder.build()?;

    let camera = Camera::new()
        .with_resolution(320, 180)
        .with_position(Vec3::new(0.0, 0.5, 2.0), Vec3::new(0.0, 0.0, -4.0), Vec3::Y)
        .with_fov(35.0);
    let config = PathTracerConfig::default().with_samples(64, 4).without_adaptive();

    let packed = PackedScene::from_scene(&scene, &camera, &config)?;
    let reloaded = PackedScene::from_buffers(&packed.buffers())?;

    let (image, elapsed) = dispatch(&reloaded);
    image.to_framebuffer().save_png("kernel.png")?;
    println!("Rendered in {elapsed:.2?}, wrote kernel.png");
    Ok(())
}
