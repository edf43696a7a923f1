//! Contracts for the external collaborators driven by the pipeline.
//!
//! The pipeline never looks inside these services; it only decides when they
//! run, what they are handed, and how their results are folded back into
//! the scene.

use image::RgbImage;
use std::path::Path;

use crate::error::ServiceError;
use crate::scene::{GeometryObject, GroupId, ObjectId, Scene};

/// Turns one capture file into the objects it contains.
///
/// Implementations must be shareable across threads so imports can run
/// ahead of registration on a worker pool.
pub trait TileImporter: Send + Sync {
    fn import(&self, path: &Path) -> Result<Vec<GeometryObject>, ServiceError>;
}

/// The two groups related by one registration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationRequest {
    /// Everything registered so far.
    pub reference: GroupId,
    /// The tile being aligned onto `reference`.
    pub target: GroupId,
    /// Representative member of `reference`.
    pub reference_anchor: ObjectId,
    /// Representative member of `target`.
    pub target_anchor: ObjectId,
}

/// Aligns the target group onto the reference group using their shared
/// overlap, mutating transforms in place.
///
/// The service works on the full content of both groups; the anchors only
/// identify them. It may delete objects it considers duplicated by the
/// overlap. Failing to find any overlap is an error.
pub trait RegistrationService {
    fn align_and_merge(
        &mut self,
        scene: &mut Scene,
        request: &RegistrationRequest,
    ) -> Result<(), ServiceError>;
}

/// Projects the materials of a selection into one packed image.
///
/// The returned image must be addressable by the selection's texture
/// coordinates once the call returns; the service may rewrite them.
pub trait TextureBaker {
    fn bake(
        &mut self,
        scene: &mut Scene,
        selection: &[ObjectId],
        active: ObjectId,
    ) -> Result<RgbImage, ServiceError>;
}
