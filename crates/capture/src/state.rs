//! Explicit pipeline state threaded through every stage.

use std::sync::Arc;

use crate::catalog::Tile;
use crate::scene::{GroupId, ObjectGroup, ObjectId, Scene};

/// Objects that came from one original tile, frozen at capture time.
///
/// Later moves, joins or deletions never alter a record; consumers filter the
/// handles against the live scene instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceRecord {
    tile_index: usize,
    objects: Arc<[ObjectId]>,
}

impl ProvenanceRecord {
    pub(crate) fn capture(tile_index: usize, group: &ObjectGroup) -> Self {
        Self {
            tile_index,
            objects: group.objects().into(),
        }
    }

    pub fn tile_index(&self) -> usize {
        self.tile_index
    }

    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PipelineState {
    pub scene: Scene,
    /// Catalogue in processing order.
    pub tiles: Vec<Tile>,
    /// One group per tile, parallel to `tiles`.
    pub tile_groups: Vec<GroupId>,
    /// One record per tile, parallel to `tiles`, filled by registration.
    pub provenance: Vec<ProvenanceRecord>,
    /// Group holding every registered object once the chain completes.
    pub accumulation: Option<GroupId>,
}

impl PipelineState {
    pub fn new(tiles: Vec<Tile>) -> Self {
        Self {
            tiles,
            ..Self::default()
        }
    }

    pub fn tile_label(&self, tile_index: usize) -> String {
        self.tiles
            .get(tile_index)
            .map(|t| t.source_id.clone())
            .unwrap_or_else(|| format!("#{tile_index}"))
    }
}
