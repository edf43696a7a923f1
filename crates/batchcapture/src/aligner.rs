//! Translation-only overlap registration.
//!
//! Reference vertices are binned into a 2D grid; every target vertex is
//! paired with its nearest reference vertex within `match_radius`, and the
//! target group is shifted by the robust median of those offsets.

use glam::{DAffine3, DVec3};
use log::debug;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;

use capture::{
    ObjectId, RegistrationRequest, RegistrationService, Scene, ServiceError, ServiceFailure,
};

pub const DEFAULT_MATCH_RADIUS: f64 = 2.0;
pub const DEFAULT_MIN_MATCHES: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct OverlapAligner {
    pub match_radius: f64,
    pub min_matches: usize,
}

impl Default for OverlapAligner {
    fn default() -> Self {
        Self {
            match_radius: DEFAULT_MATCH_RADIUS,
            min_matches: DEFAULT_MIN_MATCHES,
        }
    }
}

struct Grid {
    cell: f64,
    map: HashMap<(i64, i64), Vec<usize>>,
}

impl Grid {
    fn build(points: &[DVec3], cell: f64) -> Self {
        let mut map: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for (i, p) in points.iter().enumerate() {
            map.entry(Self::key(p, cell)).or_default().push(i);
        }
        Self { cell, map }
    }

    fn key(p: &DVec3, cell: f64) -> (i64, i64) {
        ((p.x / cell).floor() as i64, (p.y / cell).floor() as i64)
    }

    fn neighbors(&self, p: &DVec3) -> impl Iterator<Item = usize> + '_ {
        let (ix, iy) = Self::key(p, self.cell);
        (-1..=1i64).flat_map(move |dx| {
            (-1..=1i64)
                .filter_map(move |dy| {
                    self.map
                        .get(&(ix.saturating_add(dx), iy.saturating_add(dy)))
                })
                .flatten()
                .copied()
        })
    }
}

fn median(mut v: Vec<f64>) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    let mid = v.len() / 2;
    v.select_nth_unstable_by(mid, |a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    Some(v[mid])
}

fn median_offset(offsets: &[DVec3]) -> Option<DVec3> {
    Some(DVec3::new(
        median(offsets.iter().map(|d| d.x).collect())?,
        median(offsets.iter().map(|d| d.y).collect())?,
        median(offsets.iter().map(|d| d.z).collect())?,
    ))
}

fn world_points(scene: &Scene, ids: &[ObjectId]) -> Vec<DVec3> {
    ids.iter()
        .filter_map(|&id| scene.object(id))
        .flat_map(|o| o.world_positions())
        .filter(|p| p.is_finite())
        .collect()
}

impl OverlapAligner {
    /// Offset that moves `target` onto `reference`, or the number of
    /// matches found when there were too few.
    pub fn estimate_offset(&self, reference: &[DVec3], target: &[DVec3]) -> Result<DVec3, usize> {
        let radius = self.match_radius;
        let grid = Grid::build(reference, radius);

        let offsets: Vec<DVec3> = target
            .par_iter()
            .filter_map(|t| {
                grid.neighbors(t)
                    .map(|j| (reference[j] - *t, reference[j].distance_squared(*t)))
                    .filter(|&(_, d2)| d2 <= radius * radius)
                    .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
                    .map(|(offset, _)| offset)
            })
            .collect();

        if offsets.len() < self.min_matches.max(1) {
            return Err(offsets.len());
        }

        let first = median_offset(&offsets).ok_or(0usize)?;

        // One rejection pass: drop pairs far from the first estimate.
        let kept: Vec<DVec3> = offsets
            .iter()
            .copied()
            .filter(|d| d.distance(first) <= radius * 0.5)
            .collect();

        Ok(median_offset(&kept).unwrap_or(first))
    }
}

impl RegistrationService for OverlapAligner {
    fn align_and_merge(
        &mut self,
        scene: &mut Scene,
        request: &RegistrationRequest,
    ) -> Result<(), ServiceError> {
        let reference_ids = scene.members(request.reference)?;
        let target_ids = scene.members(request.target)?;

        let reference = world_points(scene, &reference_ids);
        let target = world_points(scene, &target_ids);

        let offset = self.estimate_offset(&reference, &target).map_err(|found| {
            ServiceFailure::boxed(format!(
                "no overlap found ({found} matches within {} m, need {})",
                self.match_radius, self.min_matches
            ))
        })?;

        debug!(
            "Shifting {} objects by ({:.3}, {:.3}, {:.3})",
            target_ids.len(),
            offset.x,
            offset.y,
            offset.z
        );

        let shift = DAffine3::from_translation(offset);
        for id in target_ids {
            if let Some(object) = scene.object_mut(id) {
                object.transform = shift * object.transform;
            }
        }

        Ok(())
    }
}
