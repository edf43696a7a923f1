//! Vertex welding and wire-vertex removal for baked maps.
//!
//! Overlapping capture tiles leave duplicated vertices along their seams.
//! Welding collapses every vertex onto the earliest surviving vertex within
//! the weld distance; faces that collapse below three distinct corners leave
//! their sides behind as loose edges. Vertices whose only edges are loose
//! ("wire" vertices, neither manifold nor boundary) are weld artefacts and are
//! deleted along with those edges.
//!
//! The pass is idempotent: surviving vertices are pairwise further apart than
//! the weld distance, and no vertex left behind is wire.

use glam::DVec3;
use log::debug;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::{PipelineConfig, DEFAULT_WELD_DISTANCE};
use crate::scene::{Mesh, ObjectId, Scene};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleanupPolicy {
    /// Vertices at most this far apart are welded.
    pub weld_distance: f64,
    pub remove_wire: bool,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            weld_distance: DEFAULT_WELD_DISTANCE,
            remove_wire: true,
        }
    }
}

impl From<&PipelineConfig> for CleanupPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            weld_distance: config.weld_distance,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Distinct meshes processed.
    pub meshes: usize,
    pub initial_vertices: usize,
    pub final_vertices: usize,
}

impl CleanupReport {
    fn absorb(&mut self, other: CleanupReport) {
        self.meshes += other.meshes;
        self.initial_vertices += other.initial_vertices;
        self.final_vertices += other.final_vertices;
    }
}

/// Clean the meshes behind `objects`, visiting each shared mesh once.
pub fn clean_objects(scene: &Scene, objects: &[ObjectId], policy: &CleanupPolicy) -> CleanupReport {
    let mut seen = HashSet::new();
    let mut report = CleanupReport::default();

    for object in objects.iter().filter_map(|&id| scene.object(id)) {
        if !seen.insert(Arc::as_ptr(&object.mesh)) {
            continue;
        }
        let mut mesh = object.mesh.write();
        report.absorb(clean_mesh(&mut mesh, policy));
    }

    debug!(
        "Cleanup: {} mesh(es), {} -> {} vertices",
        report.meshes, report.initial_vertices, report.final_vertices
    );
    report
}

/// Weld and strip wire vertices from a single mesh in place.
pub fn clean_mesh(mesh: &mut Mesh, policy: &CleanupPolicy) -> CleanupReport {
    let initial = mesh.vertex_count();
    if initial == 0 {
        return CleanupReport {
            meshes: 1,
            ..CleanupReport::default()
        };
    }

    let remap = weld_map(&mesh.positions, policy.weld_distance);

    // Faces: remap corners, drop repeated neighbours, collapse degenerates.
    let mut faces = Vec::with_capacity(mesh.faces.len());
    let mut loose: Vec<[u32; 2]> = mesh
        .edges
        .iter()
        .map(|&[a, b]| [remap[a as usize], remap[b as usize]])
        .collect();

    for face in &mesh.faces {
        let mut ring: Vec<u32> = face.iter().map(|&v| remap[v as usize]).collect();
        ring.dedup();
        while ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }

        let distinct: HashSet<u32> = ring.iter().copied().collect();
        if distinct.len() >= 3 {
            faces.push(ring);
        } else {
            loose.extend(ring_edges(&ring));
        }
    }

    let face_edges: HashSet<[u32; 2]> = faces
        .iter()
        .flat_map(|f| ring_edges(f))
        .map(ordered)
        .collect();

    let mut seen_edges = HashSet::new();
    loose.retain(|&[a, b]| {
        a != b && !face_edges.contains(&ordered([a, b])) && seen_edges.insert(ordered([a, b]))
    });

    // Wire vertices: touched by loose edges only.
    let count = mesh.positions.len();
    let mut on_face = vec![false; count];
    for &v in faces.iter().flatten() {
        on_face[v as usize] = true;
    }
    let mut on_loose = vec![false; count];
    for &[a, b] in &loose {
        on_loose[a as usize] = true;
        on_loose[b as usize] = true;
    }

    let keep: Vec<bool> = (0..count)
        .map(|v| {
            let survivor = remap[v] as usize == v;
            let wire = policy.remove_wire && on_loose[v] && !on_face[v];
            survivor && !wire
        })
        .collect();

    // Compact.
    let mut new_index = vec![u32::MAX; count];
    let mut positions = Vec::with_capacity(count);
    let mut uvs = mesh.uvs.as_ref().map(|_| Vec::with_capacity(count));
    for v in (0..count).filter(|&v| keep[v]) {
        new_index[v] = positions.len() as u32;
        positions.push(mesh.positions[v]);
        if let (Some(dst), Some(src)) = (uvs.as_mut(), mesh.uvs.as_ref()) {
            dst.push(src.get(v).copied().unwrap_or([0.0, 0.0]));
        }
    }

    mesh.faces = faces
        .into_iter()
        .map(|f| f.into_iter().map(|v| new_index[v as usize]).collect())
        .collect();
    mesh.edges = loose
        .into_iter()
        .filter(|&[a, b]| keep[a as usize] && keep[b as usize])
        .map(|[a, b]| [new_index[a as usize], new_index[b as usize]])
        .collect();
    mesh.positions = positions;
    mesh.uvs = uvs;

    CleanupReport {
        meshes: 1,
        initial_vertices: initial,
        final_vertices: mesh.vertex_count(),
    }
}

/// For every vertex, the index of the vertex it welds onto (itself when it
/// survives). Survivors are chosen in index order.
fn weld_map(positions: &[DVec3], distance: f64) -> Vec<u32> {
    let mut remap: Vec<u32> = (0..positions.len() as u32).collect();
    if !distance.is_finite() || distance <= 0.0 {
        return remap;
    }

    let limit = distance * distance;
    let cell_of = |p: DVec3| {
        let c = (p / distance).floor();
        (c.x as i64, c.y as i64, c.z as i64)
    };

    let mut grid: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();

    for (index, &p) in positions.iter().enumerate() {
        let (cx, cy, cz) = cell_of(p);
        let mut best: Option<u32> = None;

        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = (cx.saturating_add(dx), cy.saturating_add(dy), cz.saturating_add(dz));
                    let Some(bucket) = grid.get(&key) else {
                        continue;
                    };
                    for &candidate in bucket {
                        if positions[candidate as usize].distance_squared(p) <= limit
                            && best.map_or(true, |b| candidate < b)
                        {
                            best = Some(candidate);
                        }
                    }
                }
            }
        }

        match best {
            Some(survivor) => remap[index] = survivor,
            None => grid.entry((cx, cy, cz)).or_default().push(index as u32),
        }
    }

    remap
}

fn ring_edges(ring: &[u32]) -> impl Iterator<Item = [u32; 2]> + '_ {
    let n = ring.len();
    (0..n).filter(move |_| n > 1).map(move |i| [ring[i], ring[(i + 1) % n]])
}

#[inline]
fn ordered([a, b]: [u32; 2]) -> [u32; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}
