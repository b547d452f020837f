//! Cinder Runtime
//!
//! Command-line host for the asset pipeline. Loads the named assets on a
//! fixed tick, reports what came back, then releases everything and checks
//! that the rendering context ended up empty.

mod config;

use anyhow::{bail, Context, Result};
use cinder_asset::{Asset, AssetDescriptor, AssetManager, LoadHandle};
use cinder_core::time::TickClock;
use cinder_render::{HeadlessContext, RenderContext};
use clap::Parser;
use config::RuntimeConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Load assets through the Cinder pipeline and report the results.
#[derive(Parser, Debug)]
#[command(name = "cinder", version)]
struct Args {
    /// Asset paths relative to the root. `.atlas` files load as atlases,
    /// anything else as a texture.
    #[arg(required = true)]
    paths: Vec<String>,

    /// JSON runtime configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Asset root directory, overriding the configuration.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Log filter directives, overriding RUST_LOG and the configuration.
    #[arg(long)]
    log: Option<String>,

    /// Upload to a headless GPU device instead of host memory.
    #[arg(long)]
    gpu: bool,

    /// Decode images into host-side pixmaps instead of textures.
    #[arg(long)]
    pixmap: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => cinder_asset::config::load_json::<RuntimeConfig>(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(root) = &args.root {
        config.resolver.root = root.clone();
    }
    init_logging(args.log.as_deref(), &config.log.filter);

    tracing::info!("Cinder v{}", cinder_core::VERSION);
    let render = render_context(args.gpu)?;
    let mut manager = AssetManager::new(
        config.manager.clone(),
        Arc::new(config.resolver.build()),
        render,
    )?;
    manager.set_error_listener(|desc, err| {
        tracing::error!(asset = %desc, error = %err, "load failed");
    });

    let handles: Vec<LoadHandle> = args
        .paths
        .iter()
        .map(|path| manager.load(&descriptor_for(path, args.pixmap)))
        .collect();

    let mut clock = TickClock::with_rate(config.tick_rate_hz);
    while !manager.update() {
        clock.wait_for_next_tick();
        if clock.tick_count() % 30 == 0 {
            tracing::info!(
                progress = %format!("{:.0}%", manager.progress() * 100.0),
                in_flight = manager.in_flight(),
                "loading"
            );
        }
    }
    tracing::info!(
        ticks = clock.tick_count(),
        elapsed_ms = clock.total_time().as_millis() as u64,
        "loading finished"
    );

    let mut failed = 0;
    for handle in &handles {
        match handle.poll() {
            Some(Ok(asset)) => println!("ok    {}  {}", handle.descriptor(), describe(&asset)),
            Some(Err(err)) => {
                failed += 1;
                println!("error {}  {err}", handle.descriptor());
            }
            None => {
                failed += 1;
                println!("error {}  never completed", handle.descriptor());
            }
        }
    }
    tracing::debug!("\n{}", manager.diagnostics());
    for (name, value) in manager.metrics() {
        tracing::debug!(counter = name, value, "pipeline metric");
    }

    for handle in &handles {
        if let Some(Ok(_)) = handle.poll() {
            manager
                .release(handle.descriptor())
                .with_context(|| format!("releasing {}", handle.descriptor()))?;
        }
    }
    let leaked = manager.render_context().live_textures();
    if leaked > 0 {
        bail!("{leaked} textures still alive after releasing every asset");
    }

    if failed > 0 {
        bail!("{failed} of {} assets failed to load", handles.len());
    }
    Ok(())
}

fn init_logging(cli: Option<&str>, configured: &str) {
    let filter = match cli {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn render_context(gpu: bool) -> Result<Box<dyn RenderContext>> {
    if gpu {
        gpu_context()
    } else {
        Ok(Box::new(HeadlessContext::new()))
    }
}

#[cfg(feature = "gpu")]
fn gpu_context() -> Result<Box<dyn RenderContext>> {
    let ctx = cinder_render::WgpuContext::new_headless().context("opening GPU device")?;
    Ok(Box::new(ctx))
}

#[cfg(not(feature = "gpu"))]
fn gpu_context() -> Result<Box<dyn RenderContext>> {
    bail!("--gpu needs a build with the `gpu` feature")
}

fn descriptor_for(path: &str, pixmap: bool) -> AssetDescriptor {
    if path.ends_with(".atlas") {
        AssetDescriptor::atlas(path)
    } else if pixmap {
        AssetDescriptor::pixmap(path)
    } else {
        AssetDescriptor::texture(path)
    }
}

fn describe(asset: &Asset) -> String {
    match asset {
        Asset::Pixmap(p) => format!("pixmap {}x{} {:?}", p.width(), p.height(), p.format()),
        Asset::Texture(t) => match t.size() {
            Some((w, h)) => format!("texture {w}x{h}, {} mip levels", t.mip_levels()),
            None => "texture (disposed)".to_string(),
        },
        Asset::Atlas(a) => format!("atlas {} pages, {} regions", a.pages().len(), a.regions().len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_asset::AssetKind;

    #[test]
    fn extension_picks_the_kind() {
        assert_eq!(descriptor_for("ui/skin.atlas", false).kind(), AssetKind::Atlas);
        assert_eq!(descriptor_for("bg.png", false).kind(), AssetKind::Texture);
        assert_eq!(descriptor_for("bg.png", true).kind(), AssetKind::Pixmap);
    }

    #[test]
    fn flags_parse() {
        let args = Args::try_parse_from(["cinder", "--root", "assets", "--pixmap", "a.png", "b.atlas"])
            .unwrap();
        assert_eq!(args.root, Some(PathBuf::from("assets")));
        assert!(args.pixmap);
        assert!(!args.gpu);
        assert_eq!(args.paths, vec!["a.png", "b.atlas"]);
        assert!(Args::try_parse_from(["cinder"]).is_err());
    }
}
