//! JSON run report.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use capture::{CleanupReport, RunOutcome, Tile};

#[derive(Debug, Serialize)]
pub struct MapEntry {
    pub tile_index: usize,
    pub tile: String,
    pub name: String,
    pub image: PathBuf,
    pub cleanup: CleanupReport,
}

#[derive(Debug, Serialize)]
pub struct FailureEntry {
    pub tile_index: usize,
    pub tile: String,
    pub cause: String,
}

#[derive(Debug, Serialize)]
pub struct Timings {
    pub import_s: f64,
    pub registration_s: f64,
    pub baking_s: f64,
    pub assembly_s: f64,
    pub total_s: f64,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub tiles: Vec<Tile>,
    pub capture_group: String,
    pub capture_objects: usize,
    pub maps: Vec<MapEntry>,
    pub failures: Vec<FailureEntry>,
    pub timings: Timings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<PathBuf>,
}

impl RunReport {
    pub fn from_outcome(outcome: &RunOutcome, export: Option<PathBuf>) -> Self {
        let label = |i: usize| {
            outcome
                .tiles
                .get(i)
                .map(|t| t.source_id.clone())
                .unwrap_or_else(|| format!("#{i}"))
        };
        let capture = outcome.scene.group(outcome.capture);

        Self {
            tiles: outcome.tiles.clone(),
            capture_group: capture.map(|g| g.name().to_owned()).unwrap_or_default(),
            capture_objects: capture.map_or(0, |g| g.len()),
            maps: outcome
                .maps
                .iter()
                .map(|m| MapEntry {
                    tile_index: m.tile_index,
                    tile: label(m.tile_index),
                    name: m.name.clone(),
                    image: m.image_path.clone(),
                    cleanup: m.cleanup,
                })
                .collect(),
            failures: outcome
                .bake_failures
                .iter()
                .map(|f| FailureEntry {
                    tile_index: f.tile_index,
                    tile: f.tile.clone(),
                    cause: f.cause.to_string(),
                })
                .collect(),
            timings: Timings {
                import_s: outcome.timings.import.as_secs_f64(),
                registration_s: outcome.timings.registration.as_secs_f64(),
                baking_s: outcome.timings.baking.as_secs_f64(),
                assembly_s: outcome.timings.assembly.as_secs_f64(),
                total_s: outcome.timings.total.as_secs_f64(),
            },
            export,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Creating report {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Writing report {}", path.display()))
    }
}
