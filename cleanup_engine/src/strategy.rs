use std::path::{Path, PathBuf};

use cleanup_formats::{read_snapshot, snapshot_path, EnvironmentInfo};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::config::CleanupConfig;
use crate::environment::{
    active_environment, positions_from_records, positions_in_place, positions_on_slots,
    random_environment, PositionsMap,
};
use crate::error::SessionError;
use crate::input::PointerTarget;
use crate::mode::ExecutionMode;
use crate::registry::ObjectRegistry;
use crate::world::{EntityId, World};

/// Object placement for one trial.
#[derive(Debug, Clone, Default)]
pub struct TrialLayout {
    pub grasping_target: Option<EntityId>,
    pub destination: Option<EntityId>,
    pub graspables: PositionsMap,
    pub destinations: PositionsMap,
}

/// Behaviour that differs between replaying generated data and generating it.
pub trait ModeStrategy {
    fn mode(&self) -> ExecutionMode;

    /// Picks the environment layout for `trial` among `environments`.
    fn select_environment(
        &mut self,
        world: &World,
        environments: &[EntityId],
        trial: u32,
    ) -> Result<EnvironmentInfo, SessionError>;

    fn build_layout(
        &mut self,
        world: &World,
        registry: &mut ObjectRegistry,
        info: &EnvironmentInfo,
    ) -> Result<TrialLayout, SessionError>;

    /// Object the avatar's pointing makes the grasping target, if any.
    fn pointed_target(&self, _pointer: &PointerTarget) -> Option<Option<EntityId>> {
        None
    }

    fn pointed_destination(&self, _pointer: &PointerTarget) -> Option<Option<EntityId>> {
        None
    }

    /// Snapshot directory when this mode persists layouts.
    fn snapshot_dir(&self) -> Option<&Path> {
        None
    }
}

pub fn strategy_for(config: &CleanupConfig, trial: u32) -> Box<dyn ModeStrategy> {
    match config.execution_mode {
        ExecutionMode::Competition => Box::new(CompetitionStrategy::new(config.snapshot_dir.clone())),
        ExecutionMode::DataGeneration => {
            let rng = match config.random_seed {
                Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(u64::from(trial))),
                None => SmallRng::seed_from_u64(rand::random()),
            };
            Box::new(DataGenerationStrategy::new(config.snapshot_dir.clone(), rng))
        }
    }
}

/// Replays the snapshot written for the trial during data generation.
#[derive(Debug, Clone)]
pub struct CompetitionStrategy {
    snapshot_dir: PathBuf,
}

impl CompetitionStrategy {
    pub fn new(snapshot_dir: PathBuf) -> Self {
        Self { snapshot_dir }
    }
}

impl ModeStrategy for CompetitionStrategy {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Competition
    }

    fn select_environment(
        &mut self,
        _world: &World,
        _environments: &[EntityId],
        trial: u32,
    ) -> Result<EnvironmentInfo, SessionError> {
        let path = snapshot_path(&self.snapshot_dir, trial);
        let info = read_snapshot(&path)?;
        log::info!(
            "Loaded environment info. path={} environment={}",
            path.display(),
            info.environment_name
        );
        Ok(info)
    }

    fn build_layout(
        &mut self,
        world: &World,
        registry: &mut ObjectRegistry,
        info: &EnvironmentInfo,
    ) -> Result<TrialLayout, SessionError> {
        let grasping_target = registry
            .graspable_named(world, &info.grasping_target_name)
            .ok_or_else(|| SessionError::UnknownObject {
                kind: "Grasping target",
                name: info.grasping_target_name.clone(),
            })?;
        let graspables = positions_from_records(
            world,
            registry.graspables(),
            &info.graspables_positions,
            "Graspable object",
        )?;
        let destination = registry
            .destination_named(world, &info.destination_name)
            .ok_or_else(|| SessionError::UnknownObject {
                kind: "Destination",
                name: info.destination_name.clone(),
            })?;
        let destinations = positions_from_records(
            world,
            registry.destination_candidates(),
            &info.destinations_positions,
            "Destination candidate",
        )?;

        Ok(TrialLayout {
            grasping_target: Some(grasping_target),
            destination: Some(destination),
            graspables,
            destinations,
        })
    }
}

/// Lays objects out at random and lets the avatar choose target and
/// destination by pointing.
#[derive(Debug, Clone)]
pub struct DataGenerationStrategy {
    snapshot_dir: PathBuf,
    rng: SmallRng,
}

impl DataGenerationStrategy {
    pub fn new(snapshot_dir: PathBuf, rng: SmallRng) -> Self {
        Self { snapshot_dir, rng }
    }
}

impl ModeStrategy for DataGenerationStrategy {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::DataGeneration
    }

    fn select_environment(
        &mut self,
        world: &World,
        environments: &[EntityId],
        _trial: u32,
    ) -> Result<EnvironmentInfo, SessionError> {
        let chosen = match active_environment(world, environments) {
            Some(active) => {
                log::warn!("Selected an active environment. name={}", world.label(active));
                active
            }
            None => random_environment(environments, &mut self.rng)
                .ok_or(SessionError::NoEnvironments)?,
        };
        Ok(EnvironmentInfo::named(world.label(chosen)))
    }

    fn build_layout(
        &mut self,
        world: &World,
        registry: &mut ObjectRegistry,
        _info: &EnvironmentInfo,
    ) -> Result<TrialLayout, SessionError> {
        registry.shuffle_placements(&mut self.rng);
        Ok(TrialLayout {
            grasping_target: None,
            destination: None,
            graspables: positions_on_slots(world, registry.graspables(), registry.placement_slots()),
            destinations: positions_in_place(world, registry.destination_candidates()),
        })
    }

    fn pointed_target(&self, pointer: &PointerTarget) -> Option<Option<EntityId>> {
        Some(pointer.nearest_graspable)
    }

    fn pointed_destination(&self, pointer: &PointerTarget) -> Option<Option<EntityId>> {
        Some(pointer.nearest_destination)
    }

    fn snapshot_dir(&self) -> Option<&Path> {
        Some(&self.snapshot_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Transform;
    use cleanup_formats::{write_snapshot, EntityTag, RelocatableObjectInfo, Vec3};
    use tempfile::tempdir;

    fn world_with(names: &[(&str, bool)]) -> (World, Vec<EntityId>) {
        let mut world = World::new();
        let ids = names
            .iter()
            .map(|(name, active)| {
                let id = world.spawn(name, EntityTag::Environment, Transform::default(), None);
                world.set_active(id, *active);
                id
            })
            .collect();
        (world, ids)
    }

    #[test]
    fn data_generation_prefers_the_active_environment() {
        let (world, ids) = world_with(&[("LayoutA", false), ("LayoutB", true)]);
        let mut strategy =
            DataGenerationStrategy::new(PathBuf::from("unused"), SmallRng::seed_from_u64(1));
        let info = strategy
            .select_environment(&world, &ids, 1)
            .expect("selected");
        assert_eq!(info.environment_name, "LayoutB");
        assert!(info.graspables_positions.is_empty());
    }

    #[test]
    fn data_generation_picks_randomly_when_none_active() {
        let (world, ids) = world_with(&[("LayoutA", false), ("LayoutB", false)]);
        let mut strategy =
            DataGenerationStrategy::new(PathBuf::from("unused"), SmallRng::seed_from_u64(3));
        let info = strategy
            .select_environment(&world, &ids, 1)
            .expect("selected");
        assert!(["LayoutA", "LayoutB"].contains(&info.environment_name.as_str()));
    }

    #[test]
    fn competition_requires_the_snapshot() {
        let dir = tempdir().expect("tempdir");
        let (world, ids) = world_with(&[("LayoutA", true)]);
        let mut strategy = CompetitionStrategy::new(dir.path().to_path_buf());
        assert!(matches!(
            strategy.select_environment(&world, &ids, 4),
            Err(SessionError::Snapshot(_))
        ));

        let info = EnvironmentInfo {
            environment_name: "LayoutA".to_string(),
            grasping_target_name: "apple".to_string(),
            destination_name: "trashbox".to_string(),
            graspables_positions: vec![RelocatableObjectInfo {
                name: "apple".to_string(),
                position: Vec3::new(1.0, 0.7, 0.0),
                euler_angles: Vec3::ZERO,
            }],
            destinations_positions: Vec::new(),
        };
        write_snapshot(&snapshot_path(dir.path(), 4), &info).expect("write");
        let loaded = strategy
            .select_environment(&world, &ids, 4)
            .expect("snapshot loads");
        assert_eq!(loaded, info);
    }

    #[test]
    fn only_data_generation_adopts_pointing() {
        let pointer = PointerTarget {
            nearest_graspable: Some(EntityId(9)),
            nearest_destination: None,
        };
        let competition = CompetitionStrategy::new(PathBuf::from("unused"));
        assert_eq!(competition.pointed_target(&pointer), None);
        assert!(competition.snapshot_dir().is_none());

        let generation =
            DataGenerationStrategy::new(PathBuf::from("out"), SmallRng::seed_from_u64(0));
        assert_eq!(generation.pointed_target(&pointer), Some(Some(EntityId(9))));
        assert_eq!(generation.pointed_destination(&pointer), Some(None));
    }
}
