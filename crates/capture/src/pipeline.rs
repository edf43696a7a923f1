//! End-to-end driver: catalog, import, register, bake, assemble.

use log::info;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::assemble::assemble;
use crate::baking::{bake_maps, MapOutput};
use crate::catalog::{discover, Tile};
use crate::config::PipelineConfig;
use crate::error::{BakeFailure, PipelineError};
use crate::import::import_tiles;
use crate::registration::register_chain;
use crate::scene::{GroupId, Scene};
use crate::services::{RegistrationService, TextureBaker, TileImporter};
use crate::state::{PipelineState, ProvenanceRecord};

#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub import: Duration,
    pub registration: Duration,
    pub baking: Duration,
    pub assembly: Duration,
    pub total: Duration,
}

/// Everything a completed run leaves behind.
#[derive(Debug)]
pub struct RunOutcome {
    pub scene: Scene,
    pub tiles: Vec<Tile>,
    pub provenance: Vec<ProvenanceRecord>,
    pub capture: GroupId,
    pub maps: Vec<MapOutput>,
    pub bake_failures: Vec<BakeFailure>,
    pub timings: StageTimings,
}

impl RunOutcome {
    /// True when every tile produced a map.
    pub fn is_complete(&self) -> bool {
        self.bake_failures.is_empty()
    }
}

pub struct Pipeline<I, R, B> {
    config: PipelineConfig,
    importer: I,
    registration: R,
    baker: B,
}

impl<I, R, B> Pipeline<I, R, B>
where
    I: TileImporter,
    R: RegistrationService,
    B: TextureBaker,
{
    pub fn new(config: PipelineConfig, importer: I, registration: R, baker: B) -> Self {
        Self {
            config,
            importer,
            registration,
            baker,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registration(&self) -> &R {
        &self.registration
    }

    pub fn baker(&self) -> &B {
        &self.baker
    }

    /// Discover the tiles under `input_dir` and run every stage over them.
    pub fn run(&mut self, input_dir: &Path) -> Result<RunOutcome, PipelineError> {
        let tiles = discover(input_dir, &self.config.tile_extensions)?;
        info!("{} tiles found in {}", tiles.len(), input_dir.display());

        let mut state = PipelineState::new(tiles);
        self.execute(&mut state)
    }

    /// Run import, registration, baking and assembly over an already
    /// catalogued state. On a fatal error `state` is left as the failing
    /// stage found it and holds no capture group.
    ///
    /// The texture directory is created before any tile is imported; if that
    /// fails the run stops without touching a service.
    pub fn execute(&mut self, state: &mut PipelineState) -> Result<RunOutcome, PipelineError> {
        let run_start = Instant::now();
        let mut timings = StageTimings::default();

        if state.tiles.is_empty() {
            return Err(PipelineError::NoTiles);
        }

        let texture_dir = &self.config.texture_dir;
        fs::create_dir_all(texture_dir).map_err(|source| PipelineError::Io {
            path: texture_dir.clone(),
            source,
        })?;

        let stage = Instant::now();
        import_tiles(state, &self.importer, self.config.parallel_import)?;
        timings.import = stage.elapsed();

        let stage = Instant::now();
        register_chain(state, &mut self.registration)?;
        timings.registration = stage.elapsed();

        let stage = Instant::now();
        let baked = bake_maps(state, &mut self.baker, &self.config);
        timings.baking = stage.elapsed();

        let stage = Instant::now();
        let capture = assemble(state, &self.config.capture_group_name)?;
        timings.assembly = stage.elapsed();

        timings.total = run_start.elapsed();
        info!(
            "Run finished in {:.2} s: {} maps, {} failed",
            timings.total.as_secs_f64(),
            baked.maps.len(),
            baked.failures.len()
        );

        Ok(RunOutcome {
            scene: std::mem::take(&mut state.scene),
            tiles: std::mem::take(&mut state.tiles),
            provenance: std::mem::take(&mut state.provenance),
            capture,
            maps: baked.maps,
            bake_failures: baked.failures,
            timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ObjectId;
    use crate::testing::{tiles, FakeBaker, FakeImporter, ScriptedRegistration};
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn pipeline(
        project: &Path,
        overlaps: &[(&str, &str)],
        baker: FakeBaker,
    ) -> Pipeline<FakeImporter, ScriptedRegistration, FakeBaker> {
        let mut config = PipelineConfig::for_project(project);
        config.weld_distance = 0.01;
        Pipeline::new(
            config,
            FakeImporter::new(),
            ScriptedRegistration::new(overlaps),
            baker,
        )
    }

    fn catalog_dir(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            fs::write(dir.path().join(format!("{name}.rdc")), b"tile").unwrap();
        }
        dir
    }

    #[test]
    fn staircase_run_produces_a_single_capture_group() {
        let input = catalog_dir(&["1", "2", "3"]);
        let project = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(project.path(), &[("1", "2"), ("2", "3")], FakeBaker::new());

        let outcome = pipeline.run(input.path()).unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.maps.len(), 3);
        assert_eq!(outcome.scene.group_count(), 1);
        let capture = outcome.scene.group(outcome.capture).unwrap();
        assert_eq!(capture.name(), "Capture");
        assert_eq!(capture.len(), 3);
        for map in &outcome.maps {
            assert_eq!(outcome.scene.owner(map.object), Some(outcome.capture));
            assert!(map.image_path.is_file());
        }
    }

    #[test]
    fn out_of_order_tile_aborts_without_capture() {
        // A=1, C=2, B=3: C only overlaps B, which comes after it.
        let project = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(project.path(), &[("1", "3"), ("3", "2")], FakeBaker::new());
        let mut state = PipelineState::new(tiles(&["1", "2", "3"]));

        match pipeline.execute(&mut state) {
            Err(PipelineError::RegistrationFailure { tile, .. }) => assert_eq!(tile, "2"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(state.scene.group_by_name("Capture"), None);
        assert!(pipeline.baker().selections.is_empty());
    }

    #[test]
    fn single_tile_never_calls_registration() {
        let input = catalog_dir(&["7"]);
        let project = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(project.path(), &[], FakeBaker::new());

        let outcome = pipeline.run(input.path()).unwrap();

        assert!(pipeline.registration().calls.is_empty());
        assert_eq!(outcome.maps.len(), 1);
        assert_eq!(outcome.maps[0].name, "Map 0");
    }

    #[test]
    fn one_bake_failure_keeps_the_rest_of_the_run() {
        let input = catalog_dir(&["1", "2", "3"]);
        let project = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(
            project.path(),
            &[("1", "2"), ("2", "3")],
            FakeBaker::new().failing("2"),
        );

        let outcome = pipeline.run(input.path()).unwrap();

        assert!(!outcome.is_complete());
        assert_eq!(outcome.maps.len(), 2);
        assert_eq!(outcome.bake_failures.len(), 1);
        assert_eq!(outcome.bake_failures[0].tile, "2");

        // Unbaked tile 2 keeps its two original objects.
        let capture = outcome.scene.group(outcome.capture).unwrap();
        assert_eq!(capture.len(), 4);
        assert!(outcome
            .provenance[1]
            .objects()
            .iter()
            .all(|&id| outcome.scene.owner(id) == Some(outcome.capture)));
    }

    #[test]
    fn tiles_are_processed_in_numeric_order() {
        let input = catalog_dir(&["2", "10", "1"]);
        let project = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(project.path(), &[("1", "2"), ("2", "10")], FakeBaker::new());

        let outcome = pipeline.run(input.path()).unwrap();

        let order: Vec<&str> = outcome.tiles.iter().map(|t| t.source_id.as_str()).collect();
        assert_eq!(order, ["1", "2", "10"]);
        let targets: Vec<&str> = pipeline
            .registration()
            .calls
            .iter()
            .map(|(target, _)| target.as_str())
            .collect();
        assert_eq!(targets, ["2", "10"]);
    }

    #[test]
    fn provenance_partitions_the_imported_objects() {
        let input = catalog_dir(&["1", "2", "3"]);
        let project = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(project.path(), &[("1", "2"), ("2", "3")], FakeBaker::new());

        let outcome = pipeline.run(input.path()).unwrap();

        let mut seen = BTreeSet::<ObjectId>::new();
        for record in &outcome.provenance {
            assert!(!record.is_empty());
            for &id in record.objects() {
                assert!(seen.insert(id), "{id} appears in two records");
            }
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn empty_input_directory_is_fatal() {
        let input = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(project.path(), &[], FakeBaker::new());

        assert!(matches!(
            pipeline.run(input.path()),
            Err(PipelineError::EmptyCatalog { .. })
        ));
    }

    #[test]
    fn unusable_texture_directory_stops_before_import() {
        let project = tempfile::tempdir().unwrap();
        let blocker = project.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();

        let mut pipeline = pipeline(project.path(), &[("1", "2")], FakeBaker::new());
        pipeline.config.texture_dir = blocker.join("Textures");
        let mut state = PipelineState::new(tiles(&["1", "2"]));

        match pipeline.execute(&mut state) {
            Err(PipelineError::Io { path, .. }) => assert_eq!(path, blocker.join("Textures")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(pipeline.importer.calls().is_empty());
        assert!(pipeline.registration().calls.is_empty());
        assert!(pipeline.baker().selections.is_empty());
    }

    #[test]
    fn empty_state_is_rejected() {
        let project = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(project.path(), &[], FakeBaker::new());

        assert!(matches!(
            pipeline.execute(&mut PipelineState::default()),
            Err(PipelineError::NoTiles)
        ));
    }

    #[test]
    fn images_land_in_the_project_texture_directory() {
        let input = catalog_dir(&["1", "2"]);
        let project = tempfile::tempdir().unwrap();
        let site: PathBuf = project.path().join("site");
        let mut pipeline = pipeline(&site, &[("1", "2")], FakeBaker::new());

        pipeline.run(input.path()).unwrap();

        assert!(site.join("Textures").join("site_Map 0.jpg").is_file());
        assert!(site.join("Textures").join("site_Map 1.jpg").is_file());
    }
}
