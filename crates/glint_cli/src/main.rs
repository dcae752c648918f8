// Bake lightmaps for a scene file.
// Run with: cargo run --release -- <scene.json> [--settings bake.json] [--out dir]

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use glint_baker::{SceneBaker, WorkQueue};
use glint_core::{load_scene, BakeSettings};

struct Args {
    scene: PathBuf,
    settings: Option<PathBuf>,
    out: PathBuf,
}

fn parse_args() -> Result<Args> {
    let mut args = env::args().skip(1);
    let mut scene = None;
    let mut settings = None;
    let mut out = PathBuf::from("lightmaps");

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--settings" => {
                settings = Some(PathBuf::from(args.next().context("--settings needs a path")?));
            }
            "--out" => {
                out = PathBuf::from(args.next().context("--out needs a directory")?);
            }
            flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
            path if scene.is_none() => scene = Some(PathBuf::from(path)),
            extra => bail!("Unexpected argument {}", extra),
        }
    }

    let Some(scene) = scene else {
        bail!("Usage: glint <scene.json> [--settings bake.json] [--out dir]");
    };
    Ok(Args {
        scene,
        settings,
        out,
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let start = Instant::now();

    let settings = match &args.settings {
        Some(path) => BakeSettings::from_json_file(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?,
        None => BakeSettings::default(),
    };
    let scene = load_scene(&args.scene)
        .with_context(|| format!("Failed to load scene {}", args.scene.display()))?;

    let queue = WorkQueue::new(settings.worker_threads).context("Failed to start worker pool")?;
    let mut baker = SceneBaker::new(settings.clone()).context("Invalid bake settings")?;
    baker.load_scene(&scene, None).context("Failed to prepare scene")?;
    baker.bake(&queue).context("Bake failed")?;

    let output = baker.generate_lightmaps().context("Failed to generate lightmaps")?;
    let names = output
        .save(&args.out, settings.output_format)
        .with_context(|| format!("Failed to save lightmaps to {}", args.out.display()))?;

    let data_path = args.out.join(format!("{}.bake", scene.name));
    baker
        .bake_data()
        .write(&data_path)
        .with_context(|| format!("Failed to write {}", data_path.display()))?;

    let vertex_colors = baker.vertex_color_data(&output);
    if !vertex_colors.is_empty() {
        let colors_path = args.out.join(format!("{}.vcol", scene.name));
        vertex_colors
            .write(&colors_path)
            .with_context(|| format!("Failed to write {}", colors_path.display()))?;
        log::info!(
            "Wrote {} vertex color sets to {}",
            vertex_colors.records.len(),
            colors_path.display()
        );
    }

    log::info!(
        "Wrote {} atlases and {} in {:.2?}",
        names.len(),
        data_path.display(),
        start.elapsed()
    );
    Ok(())
}
