//! Error taxonomy for the capture pipeline.
//!
//! Everything in [`PipelineError`] aborts the run. [`BakeFailure`] is
//! tile-local: it is collected into the run outcome and the run continues.

use std::path::PathBuf;
use thiserror::Error;

use crate::scene::{GroupId, ObjectId};

/// Error produced by an external service (importer, registration, baker).
pub type ServiceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Plain-message service error for implementations without a richer type.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ServiceFailure(pub String);

impl ServiceFailure {
    pub fn boxed(message: impl Into<String>) -> ServiceError {
        Box::new(Self(message.into()))
    }
}

/// Misuse of the object/group arena.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("unknown {0}")]
    UnknownObject(ObjectId),

    #[error("unknown {0}")]
    UnknownGroup(GroupId),

    #[error("group {group:?} still holds {remaining} object(s)")]
    GroupNotEmpty { group: String, remaining: usize },

    #[error("malformed mesh: {0}")]
    MalformedMesh(String),
}

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no tiles with extension {extensions:?} in {}", dir.display())]
    EmptyCatalog {
        dir: PathBuf,
        extensions: Vec<String>,
    },

    #[error("pipeline state holds no tiles")]
    NoTiles,

    #[error("tile file {} does not have a numeric name", path.display())]
    InvalidTileName { path: PathBuf },

    #[error("tiles {} and {} share ordinal {ordinal}", first.display(), second.display())]
    DuplicateOrdinal {
        ordinal: u64,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("tile importer failed on tile {tile}: {source}")]
    ImportFailure {
        tile: String,
        #[source]
        source: ServiceError,
    },

    #[error("registration service failed at tile {tile_index} ({tile}): {source}")]
    RegistrationFailure {
        tile_index: usize,
        tile: String,
        #[source]
        source: ServiceError,
    },

    #[error("group {group:?} still holds {remaining} object(s) after assembly")]
    AssemblyInvariantViolation { group: String, remaining: usize },

    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// A map that could not be produced. The run carries on without it.
#[derive(Debug, Error)]
#[error("map {tile_index} (tile {tile}) was not baked: {cause}")]
pub struct BakeFailure {
    pub tile_index: usize,
    pub tile: String,
    #[source]
    pub cause: BakeCause,
}

#[derive(Debug, Error)]
pub enum BakeCause {
    #[error("no objects from this tile are left in the scene")]
    EmptySelection,

    #[error("texture baking service: {0}")]
    Service(#[source] ServiceError),

    #[error("could not export {}: {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Scene(#[from] SceneError),
}
