//! Run configuration.

use std::path::{Path, PathBuf};

/// Vertices closer than this are welded after a map is joined. The unit is
/// whatever the tile geometry uses.
pub const DEFAULT_WELD_DISTANCE: f64 = 1.0;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

pub const DEFAULT_CAPTURE_GROUP: &str = "Capture";

/// Directory, relative to the project, that receives baked map images.
pub const TEXTURE_DIR_NAME: &str = "Textures";

pub const DEFAULT_TILE_EXTENSION: &str = "rdc";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub weld_distance: f64,
    /// Where baked map images are written. Created on demand.
    pub texture_dir: PathBuf,
    /// Prefix of every exported image name.
    pub project_name: String,
    pub jpeg_quality: u8,
    /// Run the importer for all tiles on the rayon pool before registration.
    pub parallel_import: bool,
    pub capture_group_name: String,
    /// File extensions (without the dot) accepted by the catalog.
    pub tile_extensions: Vec<String>,
}

impl PipelineConfig {
    /// Configuration rooted at a project directory: images go to
    /// `<project_dir>/Textures` and are prefixed with the directory name.
    pub fn for_project(project_dir: impl AsRef<Path>) -> Self {
        let project_dir = project_dir.as_ref();
        let project_name = project_dir
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();

        Self {
            weld_distance: DEFAULT_WELD_DISTANCE,
            texture_dir: project_dir.join(TEXTURE_DIR_NAME),
            project_name,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            parallel_import: false,
            capture_group_name: DEFAULT_CAPTURE_GROUP.to_owned(),
            tile_extensions: vec![DEFAULT_TILE_EXTENSION.to_owned()],
        }
    }

    /// `<texture dir>/<project name>_Map <i>.jpg`
    pub fn map_image_path(&self, tile_index: usize) -> PathBuf {
        self.texture_dir
            .join(format!("{}_{}.jpg", self.project_name, map_name(tile_index)))
    }
}

/// Name given to the baked object (and its material) for a tile.
pub fn map_name(tile_index: usize) -> String {
    format!("Map {tile_index}")
}
