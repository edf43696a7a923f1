//! Map baking: one textured, welded object per original tile.
//!
//! For each provenance record the live objects of that tile are baked into a
//! single image, the image is written as JPEG, the objects share a material
//! named after the map, are joined into the first of them, and the joined
//! mesh is cleaned. A failure only costs that tile its map.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageError, RgbImage};
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::cleanup::{clean_objects, CleanupPolicy, CleanupReport};
use crate::config::{map_name, PipelineConfig};
use crate::error::{BakeCause, BakeFailure};
use crate::scene::{Material, ObjectId};
use crate::services::TextureBaker;
use crate::state::{PipelineState, ProvenanceRecord};

/// A successfully baked map.
#[derive(Debug, Clone)]
pub struct MapOutput {
    pub tile_index: usize,
    pub object: ObjectId,
    pub name: String,
    pub material: Arc<Material>,
    pub image_path: PathBuf,
    pub cleanup: CleanupReport,
}

#[derive(Debug, Default)]
pub struct BakeSummary {
    pub maps: Vec<MapOutput>,
    pub failures: Vec<BakeFailure>,
}

/// Bake every tile recorded in `state.provenance`, in tile order.
pub fn bake_maps(
    state: &mut PipelineState,
    baker: &mut dyn TextureBaker,
    config: &PipelineConfig,
) -> BakeSummary {
    let policy = CleanupPolicy::from(config);
    let records = state.provenance.clone();
    let mut summary = BakeSummary::default();

    for record in &records {
        let tile_index = record.tile_index();
        match bake_one(state, baker, config, &policy, record) {
            Ok(map) => {
                info!(
                    "{} baked: {} ({} -> {} vertices)",
                    map.name,
                    map.image_path.display(),
                    map.cleanup.initial_vertices,
                    map.cleanup.final_vertices
                );
                summary.maps.push(map);
            }
            Err(cause) => {
                let failure = BakeFailure {
                    tile_index,
                    tile: state.tile_label(tile_index),
                    cause,
                };
                warn!("{}", failure);
                summary.failures.push(failure);
            }
        }
    }

    summary
}

/// Bake one tile's map.
///
/// The representative object takes the name `Map <i>` only once the image
/// is exported and the selection joined. A tile that fails at any step keeps
/// its objects, unjoined and under their imported names, so no `Map <i>`
/// object exists without its image.
fn bake_one(
    state: &mut PipelineState,
    baker: &mut dyn TextureBaker,
    config: &PipelineConfig,
    policy: &CleanupPolicy,
    record: &ProvenanceRecord,
) -> Result<MapOutput, BakeCause> {
    let start = Instant::now();
    let tile_index = record.tile_index();
    let name = map_name(tile_index);

    // Registration may have deleted some of the tile's objects.
    let live: Vec<ObjectId> = record
        .objects()
        .iter()
        .copied()
        .filter(|&id| state.scene.contains(id))
        .collect();
    info!(
        "{}: {} of {} objects still live",
        name,
        live.len(),
        record.objects().len()
    );

    let Some(&active) = live.first() else {
        return Err(BakeCause::EmptySelection);
    };

    let image = baker
        .bake(&mut state.scene, &live, active)
        .map_err(BakeCause::Service)?;

    let image_path = config.map_image_path(tile_index);
    export_jpeg(&image, &image_path, config.jpeg_quality).map_err(|source| BakeCause::Export {
        path: image_path.clone(),
        source,
    })?;

    let material = Arc::new(Material {
        name: name.clone(),
        texture: Some(image_path.clone()),
    });
    for &id in &live {
        if let Some(object) = state.scene.object_mut(id) {
            object.material = Some(material.clone());
        }
    }

    state.scene.join_objects(active, &live)?;
    if let Some(object) = state.scene.object_mut(active) {
        object.name = name.clone();
    }

    let cleanup = clean_objects(&state.scene, &[active], policy);

    debug!("{} finished in {:.2} s", name, start.elapsed().as_secs_f64());

    Ok(MapOutput {
        tile_index,
        object: active,
        name,
        material,
        image_path,
        cleanup,
    })
}

/// Write `image` as a JPEG, creating the parent directory and replacing any
/// previous file.
pub fn export_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<(), ImageError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(ImageError::IoError)?;
    }

    let file = File::create(path).map_err(ImageError::IoError)?;
    let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality.clamp(1, 100));
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    )
}
