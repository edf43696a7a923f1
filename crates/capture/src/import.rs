//! Import stage: one tile group per catalogued tile.

use log::info;
use rayon::prelude::*;
use std::time::Instant;

use crate::catalog::Tile;
use crate::error::{PipelineError, ServiceError, ServiceFailure};
use crate::scene::GeometryObject;
use crate::services::TileImporter;
use crate::state::PipelineState;

/// Import every tile of `state.tiles` in order and record its group.
///
/// The first failing tile aborts the stage: later tiles depend on its
/// geometry for their overlap. With `parallel` set, the importer runs on the
/// rayon pool, but objects are still inserted in tile order so handles and
/// group contents match a sequential run.
pub fn import_tiles(
    state: &mut PipelineState,
    importer: &dyn TileImporter,
    parallel: bool,
) -> Result<(), PipelineError> {
    let total = state.tiles.len();

    let imported: Vec<Result<Vec<GeometryObject>, ServiceError>> = if parallel {
        info!("Importing {} tiles in parallel", total);
        state
            .tiles
            .par_iter()
            .map(|tile| importer.import(&tile.source_path))
            .collect()
    } else {
        Vec::with_capacity(total)
    };

    let mut imported = imported.into_iter();

    for (index, tile) in state.tiles.iter().enumerate() {
        let start = Instant::now();

        let result = if parallel {
            imported
                .next()
                .unwrap_or_else(|| Err(ServiceFailure::boxed("missing import result")))
        } else {
            info!("Importing {} ({}/{})", file_label(tile), index + 1, total);
            importer.import(&tile.source_path)
        };

        let objects = result.map_err(|source| PipelineError::ImportFailure {
            tile: tile.source_id.clone(),
            source,
        })?;

        if objects.is_empty() {
            return Err(PipelineError::ImportFailure {
                tile: tile.source_id.clone(),
                source: ServiceFailure::boxed("importer produced no objects"),
            });
        }

        // Later stages index vertices without bounds checks.
        for object in &objects {
            object
                .mesh
                .read()
                .validate()
                .map_err(|err| PipelineError::ImportFailure {
                    tile: tile.source_id.clone(),
                    source: ServiceFailure::boxed(format!("object {:?}: {}", object.name, err)),
                })?;
        }

        let group = state.scene.create_group(tile.source_id.clone());
        let count = objects.len();
        for object in objects {
            state.scene.add_object(group, object)?;
        }
        state.tile_groups.push(group);

        info!(
            "{} imported: {} objects ({:.2} s)",
            file_label(tile),
            count,
            start.elapsed().as_secs_f64()
        );
    }

    Ok(())
}

fn file_label(tile: &Tile) -> String {
    tile.source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| tile.source_id.clone())
}
