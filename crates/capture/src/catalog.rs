//! Tile discovery and ordering.
//!
//! Tiles are the files of one directory whose extension matches the
//! configured list. A tile's ordinal is its file stem read as an unsigned
//! integer, so `2, 10, 1` sorts as `1, 2, 10`.

use log::debug;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tile {
    pub ordinal: u64,
    /// File stem, used as the tile group's name.
    pub source_id: String,
    pub source_path: PathBuf,
}

/// List the tiles in `dir` in ascending ordinal order.
///
/// Sub-directories are not searched. Files with a matching extension but a
/// non-numeric stem, or two files resolving to the same ordinal (`1` and
/// `001`), are configuration errors.
pub fn discover(dir: &Path, extensions: &[String]) -> Result<Vec<Tile>, PipelineError> {
    let mut tiles = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(|err| PipelineError::Io {
            path: dir.to_path_buf(),
            source: err.into(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if !extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            continue;
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_owned();
        let ordinal = stem
            .parse::<u64>()
            .map_err(|_| PipelineError::InvalidTileName { path: path.clone() })?;

        debug!("Catalogued tile {} (ordinal {})", path.display(), ordinal);
        tiles.push(Tile {
            ordinal,
            source_id: stem,
            source_path: path,
        });
    }

    if tiles.is_empty() {
        return Err(PipelineError::EmptyCatalog {
            dir: dir.to_path_buf(),
            extensions: extensions.to_vec(),
        });
    }

    tiles.sort_by_key(|t| t.ordinal);

    if let Some(pair) = tiles.windows(2).find(|w| w[0].ordinal == w[1].ordinal) {
        return Err(PipelineError::DuplicateOrdinal {
            ordinal: pair[0].ordinal,
            first: pair[0].source_path.clone(),
            second: pair[1].source_path.clone(),
        });
    }

    Ok(tiles)
}
