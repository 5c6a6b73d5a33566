use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use renderer::{check_shaders, NotifierKind, Renderer, RendererConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::Args;
use crate::manifest::{manifest_base, SceneManifest, MANIFEST_FILE};

pub fn run(args: Args) -> Result<()> {
    initialise_tracing();

    let config = build_config(&args)?;
    if args.check {
        return run_check(&config);
    }

    tracing::info!(
        shader_dir = %args.shader_dir.display(),
        scenes = config.scenes.len(),
        "launching vas preview"
    );
    Renderer::new(config)
        .run()
        .context("renderer exited with an error")
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<RendererConfig> {
    let mut config = RendererConfig::with_shader_dir(&args.shader_dir);
    config.surface_size = args.size;
    config.history_capacity = args.history;
    config.timer_poll_limit = args.timer_poll_limit;
    config.notifier = if args.no_dialogs {
        NotifierKind::Log
    } else {
        NotifierKind::Dialog
    };

    if let Some(path) = manifest_path(args) {
        let manifest = SceneManifest::load(&path)?;
        let issues = manifest.validate();
        if !issues.is_empty() {
            for issue in &issues {
                tracing::error!(manifest = %path.display(), "{issue}");
            }
            bail!(
                "scene manifest {} is invalid: {}",
                path.display(),
                issues.join("; ")
            );
        }
        let base = manifest_base(&path);
        config.vertex_shader = manifest.vertex_path(base);
        config.scenes = manifest.scene_sources(base);
        tracing::info!(
            manifest = %path.display(),
            scenes = config.scenes.len(),
            "loaded scene manifest"
        );
    }

    Ok(config)
}

fn manifest_path(args: &Args) -> Option<PathBuf> {
    if let Some(path) = &args.manifest {
        return Some(path.clone());
    }
    let candidate = args.shader_dir.join(MANIFEST_FILE);
    candidate.is_file().then_some(candidate)
}

fn run_check(config: &RendererConfig) -> Result<()> {
    let report = check_shaders(config);

    match &report.vertex {
        Ok(()) => println!("ok      vertex ({})", config.vertex_shader.display()),
        Err(err) => {
            println!("FAILED  vertex ({})", config.vertex_shader.display());
            eprintln!("{err}");
        }
    }
    for scene in &report.scenes {
        println!("{scene}");
        if let Err(err) = &scene.result {
            eprintln!("{err}");
        }
    }

    if !report.passed() {
        bail!("{} shader(s) failed validation", report.failures());
    }
    Ok(())
}
