//! Final assembly of the merged capture.

use log::info;

use crate::error::{PipelineError, SceneError};
use crate::scene::GroupId;
use crate::state::PipelineState;

/// Move the accumulation into a new group named `name` and delete every
/// tile group, all of which must be empty by now.
pub fn assemble(state: &mut PipelineState, name: &str) -> Result<GroupId, PipelineError> {
    let accumulation = state
        .accumulation
        .ok_or_else(|| PipelineError::AssemblyInvariantViolation {
            group: "<accumulation>".to_owned(),
            remaining: 0,
        })?;

    let capture = state.scene.create_group(name);
    let moved = state.scene.move_all(accumulation, capture)?;

    for &group in &state.tile_groups {
        match state.scene.remove_group(group) {
            Ok(_) | Err(SceneError::UnknownGroup(_)) => {}
            Err(SceneError::GroupNotEmpty { group, remaining }) => {
                return Err(PipelineError::AssemblyInvariantViolation { group, remaining });
            }
            Err(other) => return Err(other.into()),
        }
    }

    state.tile_groups.clear();
    state.accumulation = None;

    info!("{} assembled with {} objects", name, moved);
    Ok(capture)
}
