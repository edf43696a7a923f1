//! Sequential registration chain.
//!
//! Tile groups are visited in ascending tile order. At step `i` the group of
//! tile `i` already holds everything registered through tile `i`, so tile
//! `i + 1` is aligned against the whole accumulation so far. After the
//! service returns, the reference group is drained into the target group,
//! which becomes the reference of the next step. The last tile group ends up
//! holding every object: that group is the accumulation.
//!
//! Provenance is captured exactly once per tile, before the tile's group
//! receives anything from an earlier tile.

use log::info;
use std::time::Instant;

use crate::error::{PipelineError, ServiceFailure};
use crate::scene::{GroupId, ObjectId};
use crate::services::{RegistrationRequest, RegistrationService};
use crate::state::{PipelineState, ProvenanceRecord};

/// Run the chain over `state.tile_groups`, filling `state.provenance` and
/// `state.accumulation`. Returns the accumulation group.
///
/// Any service failure is fatal: a partially registered scene is not safe to
/// bake or export.
pub fn register_chain(
    state: &mut PipelineState,
    service: &mut dyn RegistrationService,
) -> Result<GroupId, PipelineError> {
    let groups = state.tile_groups.clone();
    let Some(&last) = groups.last() else {
        return Err(PipelineError::NoTiles);
    };

    state.provenance.clear();
    state.provenance.reserve(groups.len());

    let first = state.scene.group(groups[0]).ok_or_else(|| unknown(groups[0]))?;
    state.provenance.push(ProvenanceRecord::capture(0, first));

    if groups.len() == 1 {
        info!("Single tile; nothing to register");
        state.accumulation = Some(last);
        return Ok(last);
    }

    for step in 0..groups.len() - 1 {
        let reference = groups[step];
        let target = groups[step + 1];
        let target_index = step + 1;
        let start = Instant::now();

        info!(
            "Registering tile {} onto tiles {}..={} ({}/{})",
            state.tile_label(target_index),
            state.tile_label(0),
            state.tile_label(step),
            target_index,
            groups.len() - 1
        );

        let request = RegistrationRequest {
            reference,
            target,
            reference_anchor: anchor(state, reference, target_index)?,
            target_anchor: anchor(state, target, target_index)?,
        };

        service
            .align_and_merge(&mut state.scene, &request)
            .map_err(|source| PipelineError::RegistrationFailure {
                tile_index: target_index,
                tile: state.tile_label(target_index),
                source,
            })?;

        // The target still holds only its own tile's objects here.
        let target_group = state.scene.group(target).ok_or_else(|| unknown(target))?;
        state
            .provenance
            .push(ProvenanceRecord::capture(target_index, target_group));

        let moved = state.scene.move_all(reference, target)?;

        info!(
            "Tile {} registered; accumulation now {} objects (+{} carried, {:.2} s)",
            state.tile_label(target_index),
            state.scene.group(target).map_or(0, |g| g.len()),
            moved,
            start.elapsed().as_secs_f64()
        );
    }

    state.accumulation = Some(last);
    Ok(last)
}

/// First member of `group`, standing in for the whole group.
fn anchor(
    state: &PipelineState,
    group: GroupId,
    tile_index: usize,
) -> Result<ObjectId, PipelineError> {
    let members = state.scene.group(group).ok_or_else(|| unknown(group))?;
    members
        .objects()
        .first()
        .copied()
        .ok_or_else(|| PipelineError::RegistrationFailure {
            tile_index,
            tile: state.tile_label(tile_index),
            source: ServiceFailure::boxed(format!(
                "group {:?} has no object to anchor on",
                members.name()
            )),
        })
}

fn unknown(group: GroupId) -> PipelineError {
    PipelineError::Scene(crate::error::SceneError::UnknownGroup(group))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::import_tiles;
    use crate::testing::{tile_of, tiles, FakeImporter, ScriptedRegistration};
    use std::collections::BTreeSet;

    fn imported(names: &[&str]) -> PipelineState {
        let mut state = PipelineState::new(tiles(names));
        import_tiles(&mut state, &FakeImporter::new(), false).unwrap();
        state
    }

    fn tiles_in(state: &PipelineState, ids: &[ObjectId]) -> BTreeSet<String> {
        ids.iter()
            .map(|&id| tile_of(&state.scene.object(id).unwrap().name).to_owned())
            .collect()
    }

    #[test]
    fn single_tile_skips_registration() {
        let mut state = imported(&["1"]);
        let before = state.scene.members(state.tile_groups[0]).unwrap();
        let mut service = ScriptedRegistration::new(&[]);

        let accumulation = register_chain(&mut state, &mut service).unwrap();

        assert!(service.calls.is_empty());
        assert_eq!(accumulation, state.tile_groups[0]);
        assert_eq!(state.scene.members(accumulation).unwrap(), before);
        assert_eq!(state.provenance.len(), 1);
        assert_eq!(state.provenance[0].objects(), before.as_slice());
    }

    #[test]
    fn empty_state_has_no_chain() {
        let mut state = PipelineState::default();
        let mut service = ScriptedRegistration::new(&[]);

        assert!(matches!(
            register_chain(&mut state, &mut service),
            Err(PipelineError::NoTiles)
        ));
        assert!(service.calls.is_empty());
    }

    #[test]
    fn each_step_aligns_against_everything_so_far() {
        let mut state = imported(&["1", "2", "3"]);
        let mut service = ScriptedRegistration::new(&[("1", "2"), ("2", "3")]);

        register_chain(&mut state, &mut service).unwrap();

        let seen: Vec<(String, Vec<String>)> = service.calls.clone();
        assert_eq!(
            seen,
            vec![
                ("2".to_owned(), vec!["1".to_owned()]),
                ("3".to_owned(), vec!["1".to_owned(), "2".to_owned()]),
            ]
        );
    }

    #[test]
    fn accumulation_holds_every_object_and_provenance_is_per_tile() {
        let mut state = imported(&["1", "2", "3"]);
        let originals: Vec<Vec<ObjectId>> = state
            .tile_groups
            .iter()
            .map(|&g| state.scene.members(g).unwrap())
            .collect();
        let mut service = ScriptedRegistration::new(&[("1", "2"), ("2", "3")]);

        let accumulation = register_chain(&mut state, &mut service).unwrap();

        assert_eq!(state.accumulation, Some(accumulation));
        let all: BTreeSet<ObjectId> = originals.iter().flatten().copied().collect();
        let merged: BTreeSet<ObjectId> =
            state.scene.members(accumulation).unwrap().into_iter().collect();
        assert_eq!(merged, all);

        for (index, record) in state.provenance.iter().enumerate() {
            assert_eq!(record.tile_index(), index);
            assert_eq!(record.objects(), originals[index].as_slice());
            assert_eq!(tiles_in(&state, record.objects()).len(), 1);
        }

        for &group in &state.tile_groups[..2] {
            assert!(state.scene.group(group).unwrap().is_empty());
        }
    }

    #[test]
    fn staircase_order_succeeds_without_direct_overlap() {
        let mut state = imported(&["1", "2", "3"]);
        // 1-3 never overlap; 3 still registers through 2.
        let mut service = ScriptedRegistration::new(&[("1", "2"), ("2", "3")]);

        assert!(register_chain(&mut state, &mut service).is_ok());
    }

    #[test]
    fn tile_without_preceding_overlap_fails_the_chain() {
        // A=1, C=2, B=3: C has no overlap with A.
        let mut state = imported(&["1", "2", "3"]);
        let mut service = ScriptedRegistration::new(&[("1", "3"), ("3", "2")]);

        match register_chain(&mut state, &mut service) {
            Err(PipelineError::RegistrationFailure {
                tile_index, tile, ..
            }) => {
                assert_eq!(tile_index, 1);
                assert_eq!(tile, "2");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(service.calls.len(), 1);
        assert_eq!(state.accumulation, None);
    }

    #[test]
    fn provenance_is_captured_after_service_deletions() {
        let mut state = imported(&["1", "2"]);
        let doomed = state.scene.members(state.tile_groups[1]).unwrap()[1];
        let mut service = ScriptedRegistration::new(&[("1", "2")]).deleting_duplicates_of("2");

        register_chain(&mut state, &mut service).unwrap();

        assert!(!state.scene.contains(doomed));
        assert!(!state.provenance[1].objects().contains(&doomed));
        assert_eq!(state.provenance[1].objects().len(), 1);
    }
}
