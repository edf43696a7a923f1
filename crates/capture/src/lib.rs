//! Batch capture assembly for overlapping scan tiles.
//!
//! Tiles are imported in ascending numeric order, chained through pairwise
//! registration so every tile is aligned against everything before it, baked
//! into one textured map per original tile, and finally collected into a
//! single `Capture` group.
//!
//! Importing, registering and texture baking are external services behind
//! the traits in [`services`]; the crate owns ordering, provenance, error
//! policy and the geometry cleanup that follows each bake.

pub mod assemble;
pub mod baking;
pub mod catalog;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod import;
pub mod pipeline;
pub mod registration;
pub mod scene;
pub mod services;
pub mod state;

#[cfg(test)]
mod testing;

pub use baking::{export_jpeg, BakeSummary, MapOutput};
pub use catalog::Tile;
pub use cleanup::{CleanupPolicy, CleanupReport};
pub use config::PipelineConfig;
pub use error::{BakeCause, BakeFailure, PipelineError, SceneError, ServiceError, ServiceFailure};
pub use pipeline::{Pipeline, RunOutcome, StageTimings};
pub use scene::{
    GeometryObject, GroupId, Material, Mesh, MeshRef, ObjectGroup, ObjectId, ObjectKind, Scene,
};
pub use services::{RegistrationRequest, RegistrationService, TextureBaker, TileImporter};
pub use state::{PipelineState, ProvenanceRecord};
