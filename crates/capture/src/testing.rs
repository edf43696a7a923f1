//! Scripted stand-ins for the external services.
//!
//! Every object a fake imports is named `<tile>/<n>`, which lets the fakes
//! tell which original tiles a group currently holds.

use glam::{DAffine3, DVec3};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::catalog::Tile;
use crate::error::{ServiceError, ServiceFailure};
use crate::scene::{GeometryObject, Mesh, ObjectId, ObjectKind, Scene};
use crate::services::{RegistrationRequest, RegistrationService, TextureBaker, TileImporter};

pub(crate) const DEFAULT_OBJECTS_PER_TILE: usize = 2;

/// Tile records for numeric names, with paths under a fake directory.
pub(crate) fn tiles(names: &[&str]) -> Vec<Tile> {
    names
        .iter()
        .map(|&name| Tile {
            ordinal: name.parse().unwrap_or_default(),
            source_id: name.to_owned(),
            source_path: PathBuf::from("tiles").join(format!("{name}.rdc")),
        })
        .collect()
}

pub(crate) fn tile_of(object_name: &str) -> &str {
    object_name.split('/').next().unwrap_or_default()
}

/// A unit quad, split into two triangles.
pub(crate) fn quad() -> Mesh {
    Mesh {
        positions: vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        ],
        uvs: Some(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]),
        faces: vec![vec![0, 1, 2], vec![0, 2, 3]],
        edges: Vec::new(),
    }
}

#[derive(Default)]
pub(crate) struct FakeImporter {
    counts: HashMap<String, usize>,
    failing: HashSet<String>,
    malformed: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeImporter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_count(mut self, tile: &str, count: usize) -> Self {
        self.counts.insert(tile.to_owned(), count);
        self
    }

    pub(crate) fn failing(mut self, tile: &str) -> Self {
        self.failing.insert(tile.to_owned());
        self
    }

    /// Import `tile` with a face pointing past its vertices.
    pub(crate) fn malformed(mut self, tile: &str) -> Self {
        self.malformed.insert(tile.to_owned());
        self
    }

    /// Tiles imported so far, in call order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl TileImporter for FakeImporter {
    fn import(&self, path: &Path) -> Result<Vec<GeometryObject>, ServiceError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_owned();
        self.calls.lock().push(stem.clone());

        if self.failing.contains(&stem) {
            return Err(ServiceFailure::boxed(format!("cannot read {stem}")));
        }

        let count = self
            .counts
            .get(&stem)
            .copied()
            .unwrap_or(DEFAULT_OBJECTS_PER_TILE);
        let offset: f64 = stem.parse().unwrap_or(0.0);

        Ok((0..count)
            .map(|n| {
                let mut mesh = quad();
                if self.malformed.contains(&stem) {
                    mesh.faces.push(vec![0, 2, 9]);
                }
                let mut object =
                    GeometryObject::new(format!("{stem}/{n}"), ObjectKind::Mesh, mesh.into_shared());
                object.transform =
                    DAffine3::from_translation(DVec3::new(offset * 10.0 + n as f64 * 2.0, 0.0, 0.0));
                object
            })
            .collect())
    }
}

/// Succeeds when the target tile overlaps any tile already in the reference
/// group, per a declared symmetric overlap list.
pub(crate) struct ScriptedRegistration {
    overlaps: HashSet<(String, String)>,
    delete_duplicates_of: HashSet<String>,
    /// `(target tile, tiles in reference)` for every call.
    pub(crate) calls: Vec<(String, Vec<String>)>,
}

impl ScriptedRegistration {
    pub(crate) fn new(overlaps: &[(&str, &str)]) -> Self {
        let mut set = HashSet::new();
        for &(a, b) in overlaps {
            set.insert((a.to_owned(), b.to_owned()));
            set.insert((b.to_owned(), a.to_owned()));
        }
        Self {
            overlaps: set,
            delete_duplicates_of: HashSet::new(),
            calls: Vec::new(),
        }
    }

    /// When registering `tile`, delete every one of its objects but the first.
    pub(crate) fn deleting_duplicates_of(mut self, tile: &str) -> Self {
        self.delete_duplicates_of.insert(tile.to_owned());
        self
    }
}

fn tiles_of(scene: &Scene, ids: &[ObjectId]) -> BTreeSet<String> {
    ids.iter()
        .filter_map(|&id| scene.object(id))
        .map(|o| tile_of(&o.name).to_owned())
        .collect()
}

impl RegistrationService for ScriptedRegistration {
    fn align_and_merge(
        &mut self,
        scene: &mut Scene,
        request: &RegistrationRequest,
    ) -> Result<(), ServiceError> {
        let reference = scene.members(request.reference)?;
        let target = scene.members(request.target)?;

        let target_tile = scene
            .object(request.target_anchor)
            .map(|o| tile_of(&o.name).to_owned())
            .ok_or_else(|| ServiceFailure::boxed("target anchor missing"))?;
        let reference_tiles = tiles_of(scene, &reference);

        self.calls
            .push((target_tile.clone(), reference_tiles.iter().cloned().collect()));

        let overlapping = reference_tiles
            .iter()
            .any(|r| self.overlaps.contains(&(target_tile.clone(), r.clone())));
        if !overlapping {
            return Err(ServiceFailure::boxed(format!(
                "no overlap found between tile {target_tile} and the accumulation"
            )));
        }

        for &id in &target {
            if let Some(object) = scene.object_mut(id) {
                object.transform = DAffine3::from_translation(DVec3::new(0.0, 0.5, 0.0)) * object.transform;
            }
        }

        if self.delete_duplicates_of.contains(&target_tile) {
            for &id in target.iter().skip(1) {
                scene.remove_object(id)?;
            }
        }

        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeBaker {
    failing: HashSet<String>,
    /// Tiles present in each selection handed to the baker.
    pub(crate) selections: Vec<Vec<String>>,
}

impl FakeBaker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(mut self, tile: &str) -> Self {
        self.failing.insert(tile.to_owned());
        self
    }
}

impl TextureBaker for FakeBaker {
    fn bake(
        &mut self,
        scene: &mut Scene,
        selection: &[ObjectId],
        _active: ObjectId,
    ) -> Result<RgbImage, ServiceError> {
        let tiles: Vec<String> = tiles_of(scene, selection).into_iter().collect();
        self.selections.push(tiles.clone());

        if tiles.iter().any(|t| self.failing.contains(t)) {
            return Err(ServiceFailure::boxed("atlas packing failed"));
        }

        Ok(RgbImage::from_pixel(8, 8, Rgb([200, 120, 40])))
    }
}
