use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use training_tile_extraction::config::{default_workers, parse_class_map};
use training_tile_extraction::{ClassCodeAssignment, ExtractionConfig, Pipeline};
use training_tile_extraction::pipeline::group_label_sources;

#[derive(Parser, Debug)]
#[command(name = "training-tile-extraction", version = "0.1.0")]
struct Args {
    /// Root directory of scene imagery, one <path>_<row>_<year> subfolder per scene
    #[arg(long, default_value = "./image_data")]
    image_dir: String,

    /// Directory of rasterized label sources, named <name>_<path>_<row>_<year>.npy
    #[arg(long, default_value = "./label_data")]
    label_dir: String,

    /// Output directory for the training corpus
    #[arg(long, default_value = "./training_data")]
    corpus_dir: String,

    /// Edge length of a square training tile, in pixels
    #[arg(long, default_value = "608")]
    tile_size: usize,

    /// Number of classes, including background class 0
    #[arg(long, default_value = "4")]
    n_classes: usize,

    /// How many tiles to buffer before a parallel flush to disk
    #[arg(long, default_value = "50")]
    tile_batch: usize,

    /// Corpus writer pool size; 0 picks a bounded host default
    #[arg(long, default_value = "0")]
    workers: usize,

    /// Filename suffix marking cloud/water masks (repeatable)
    #[arg(long = "mask-suffix", default_value = "_fmask.npy")]
    mask_suffixes: Vec<String>,

    /// Filename suffix marking a band raster, in band order (repeatable)
    #[arg(long = "band-suffix")]
    band_suffixes: Vec<String>,

    /// Class code assignment PREFIX=CODE, e.g. irrigated=1 (repeatable)
    #[arg(long = "class-map")]
    class_map: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .init();
    info!("=== training-tile-extraction start ===");

    let args = Args::parse();
    info!("Parsed command-line args: {:?}", args);

    let mut config = ExtractionConfig {
        tile_size: args.tile_size,
        n_classes: args.n_classes,
        tile_batch: args.tile_batch,
        workers: if args.workers == 0 { default_workers() } else { args.workers },
        mask_suffixes: args.mask_suffixes.clone(),
        ..ExtractionConfig::default()
    };
    if !args.band_suffixes.is_empty() {
        config.band_suffixes = args.band_suffixes.clone();
    }

    let mut class_map = ClassCodeAssignment::default();
    for raw in &args.class_map {
        let (prefix, code) = parse_class_map(raw)?;
        class_map.push(prefix, code);
    }
    if class_map.is_empty() {
        error!("no --class-map entries given => nothing to extract!");
        return Ok(());
    }

    let pipeline = Pipeline::with_defaults(config).context("building pipeline")?;

    let grouped = group_label_sources(Path::new(&args.label_dir), &class_map)
        .with_context(|| format!("scanning label sources under {:?}", args.label_dir))?;
    let total_scenes = grouped.len();
    info!("Found label sources for {} scenes in {:?}", total_scenes, args.label_dir);
    if total_scenes == 0 {
        error!("No usable label sources found => nothing to do!");
        return Ok(());
    }

    let pb = ProgressBar::new(total_scenes as u64);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}/{len:3} {msg}")
            .unwrap()
            .progress_chars("##-"),
    );

    let image_dir = Path::new(&args.image_dir);
    let corpus_dir = Path::new(&args.corpus_dir);
    let mut total_written = 0usize;
    for (scene, sources) in &grouped {
        info!("extracting data for scene {}", scene);
        let scene_dir = image_dir.join(scene.dir_name());
        match pipeline.extract_scene(&scene_dir, sources, corpus_dir) {
            Ok(stats) => {
                total_written += stats.written;
                info!(
                    "scene {} => {} tiles written ({} masked, {} clipped)",
                    scene, stats.written, stats.skipped_masked, stats.skipped_shape
                );
            }
            Err(e) => {
                warn!("scene {} failed, skipping: {}", scene, e);
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message("All done.");
    info!("=== Done. {} tiles written to {:?} ===", total_written, corpus_dir);
    Ok(())
}
