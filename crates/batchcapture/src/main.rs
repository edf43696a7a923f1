use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

use capture::config::{DEFAULT_JPEG_QUALITY, DEFAULT_WELD_DISTANCE};
use capture::{Pipeline, PipelineConfig};

mod aligner;
mod atlas;
mod export;
mod obj;
mod report;

use aligner::{OverlapAligner, DEFAULT_MATCH_RADIUS, DEFAULT_MIN_MATCHES};
use atlas::{AtlasBaker, DEFAULT_TILE_SIZE};
use obj::ObjTileImporter;
use report::RunReport;

#[derive(Parser, Debug, Clone)]
#[command(name = "batchcapture", version)]
struct Args {
    /// Directory holding the numbered capture tiles (`1.obj`, `2.zip`, ...)
    #[arg(long, env = "BATCHCAPTURE_INPUT_DIR", default_value = "tiles")]
    input_dir: PathBuf,

    /// Project directory; baked maps go to `<project>/Textures` unless overridden.
    #[arg(long, env = "BATCHCAPTURE_PROJECT_DIR", default_value = ".")]
    project_dir: PathBuf,

    /// Prefix of exported images (default: project directory name).
    #[arg(long, env = "BATCHCAPTURE_PROJECT_NAME")]
    project_name: Option<String>,

    #[arg(long, env = "BATCHCAPTURE_TEXTURE_DIR")]
    texture_dir: Option<PathBuf>,

    /// Where the merged capture OBJ is written (default: project directory).
    #[arg(long, env = "BATCHCAPTURE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Vertices closer than this are welded after each map is joined.
    #[arg(long, env = "BATCHCAPTURE_WELD_DISTANCE", default_value_t = DEFAULT_WELD_DISTANCE)]
    weld_distance: f64,

    #[arg(long, env = "BATCHCAPTURE_JPEG_QUALITY", default_value_t = DEFAULT_JPEG_QUALITY)]
    jpeg_quality: u8,

    /// Tile file extensions; repeat for several.
    #[arg(
        long = "extension",
        env = "BATCHCAPTURE_EXTENSIONS",
        value_delimiter = ',',
        default_values_t = [String::from("obj"), String::from("zip")]
    )]
    extensions: Vec<String>,

    /// Read every tile on the thread pool before registration starts.
    #[arg(long, env = "BATCHCAPTURE_PARALLEL_IMPORT", default_value_t = false)]
    parallel_import: bool,

    /// Fewest vertex pairs needed to accept an overlap.
    #[arg(long, env = "BATCHCAPTURE_MIN_MATCHES", default_value_t = DEFAULT_MIN_MATCHES)]
    min_matches: usize,

    /// Largest distance between paired vertices of two tiles.
    #[arg(long, env = "BATCHCAPTURE_MATCH_RADIUS", default_value_t = DEFAULT_MATCH_RADIUS)]
    match_radius: f64,

    /// Atlas cell size in pixels.
    #[arg(long, env = "BATCHCAPTURE_ATLAS_TILE_SIZE", default_value_t = DEFAULT_TILE_SIZE)]
    atlas_tile_size: u32,

    /// Write a JSON run report here.
    #[arg(long, env = "BATCHCAPTURE_REPORT")]
    report: Option<PathBuf>,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::for_project(&self.project_dir);
        if config.project_name.is_empty() {
            // `.` and `/` have no file name of their own.
            config.project_name = std::env::current_dir()
                .ok()
                .and_then(|d| d.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "project".to_owned());
        }
        if let Some(name) = &self.project_name {
            config.project_name = name.clone();
        }
        if let Some(dir) = &self.texture_dir {
            config.texture_dir = dir.clone();
        }
        config.weld_distance = self.weld_distance;
        config.jpeg_quality = self.jpeg_quality;
        config.parallel_import = self.parallel_import;
        config.tile_extensions = self.extensions.clone();
        config
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.pipeline_config();
    let output_dir = args.output_dir.clone().unwrap_or_else(|| args.project_dir.clone());

    info!("----------------------------------------");
    info!("Batch capture: {}", config.project_name);
    info!("  tiles    : {}", args.input_dir.display());
    info!("  textures : {}", config.texture_dir.display());
    info!("  output   : {}", output_dir.display());
    info!("----------------------------------------");

    let mut pipeline = Pipeline::new(
        config,
        ObjTileImporter,
        OverlapAligner {
            match_radius: args.match_radius,
            min_matches: args.min_matches,
        },
        AtlasBaker {
            tile_size: args.atlas_tile_size,
        },
    );

    let outcome = pipeline
        .run(&args.input_dir)
        .with_context(|| format!("Processing tiles in {}", args.input_dir.display()))?;

    let exported = export::write_capture(
        &outcome.scene,
        outcome.capture,
        &output_dir,
        &pipeline.config().project_name,
    )?;
    info!(
        "Wrote {} objects to {}",
        exported.objects,
        exported.obj.display()
    );

    for failure in &outcome.bake_failures {
        warn!("{}", failure);
    }
    info!("----------------------------------------");
    info!(
        "{} tiles, {} maps, {} failed, {:.2} s",
        outcome.tiles.len(),
        outcome.maps.len(),
        outcome.bake_failures.len(),
        outcome.timings.total.as_secs_f64()
    );

    if let Some(path) = &args.report {
        RunReport::from_outcome(&outcome, Some(exported.obj.clone())).write(path)?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}
