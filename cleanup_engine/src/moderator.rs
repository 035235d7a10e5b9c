use std::path::PathBuf;
use std::task::Poll;

use cleanup_formats::{snapshot_path, EnvironmentInfo};
use serde::Serialize;

use crate::config::CleanupConfig;
use crate::deployment::{
    ContactDetector, DeploymentCheck, DeploymentState, GraspingDetector, HierarchyGraspingDetector,
    ProximityContactDetector,
};
use crate::environment::{
    activate_only, ensure_unique_environments, layout_snapshot, PositionsMap,
};
use crate::error::SessionError;
use crate::input::PointerTarget;
use crate::mode::{ExecutionMode, PlaybackType};
use crate::playback::{PlaybackBindings, PlaybackComponents, TimedPlayback};
use crate::registry::ObjectRegistry;
use crate::strategy::{strategy_for, ModeStrategy};
use crate::world::{EntityId, World};
use crate::writer::{SnapshotWriter, WriteJob};

/// Phase of one trial as driven by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeratorStep {
    TaskStart,
    SendingPickItUpMsg,
    SendingCleanUpMsg,
    WaitForTaskFinished,
    Judgement,
    WaitForNextTask,
}

/// Per-trial progress reported by the avatar and the deployment check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionFlags {
    pub pressed_button_for_data_generation: bool,
    pub pointed_target: bool,
    pub pointed_destination: bool,
    pub deployment: DeploymentState,
}

/// Engine-side collaborators a moderator is wired to.
pub struct ModeratorCollaborators {
    pub playback: PlaybackComponents,
    pub contact_detector: Box<dyn ContactDetector>,
    pub grasping_detector: Box<dyn GraspingDetector>,
}

impl ModeratorCollaborators {
    /// Clock-driven playback, proximity contact and hierarchy grasping.
    pub fn reference(avatar_motion_seconds: f32, settle_frames: u32) -> Self {
        Self {
            playback: PlaybackComponents {
                world_recorder: Box::new(TimedPlayback::recorder()),
                world_player: Box::new(TimedPlayback::player(avatar_motion_seconds)),
                avatar_motion_recorder: Box::new(TimedPlayback::recorder()),
                avatar_motion_player: Box::new(TimedPlayback::player(avatar_motion_seconds)),
            },
            contact_detector: Box::new(ProximityContactDetector::new(0.3, 0.5, settle_frames)),
            grasping_detector: Box::new(HierarchyGraspingDetector),
        }
    }
}

/// Trial state for one environment: which objects are in play, where they
/// were placed, and what the avatar and robot have done so far.
pub struct ModeratorTool {
    strategy: Box<dyn ModeStrategy>,
    registry: ObjectRegistry,
    environment_name: String,
    trial: u32,
    grasping_target: Option<EntityId>,
    destination: Option<EntityId>,
    graspables_positions: PositionsMap,
    destinations_positions: PositionsMap,
    flags: SessionFlags,
    playback: PlaybackBindings,
    contact_detector: Box<dyn ContactDetector>,
    grasping_detector: Box<dyn GraspingDetector>,
    deployment_check: Option<DeploymentCheck>,
}

impl ModeratorTool {
    pub fn new(
        world: &mut World,
        config: &CleanupConfig,
        trial: u32,
        collaborators: ModeratorCollaborators,
    ) -> Result<Self, SessionError> {
        Self::with_strategy(
            world,
            strategy_for(config, trial),
            config.playback_type,
            trial,
            collaborators,
        )
    }

    pub fn with_strategy(
        world: &mut World,
        mut strategy: Box<dyn ModeStrategy>,
        playback_type: PlaybackType,
        trial: u32,
        collaborators: ModeratorCollaborators,
    ) -> Result<Self, SessionError> {
        let environments = world.environments();
        ensure_unique_environments(world, &environments)?;

        let info = strategy.select_environment(world, &environments, trial)?;
        activate_only(world, &environments, &info.environment_name)?;
        log::info!("Environment name={}", info.environment_name);

        let registry = ObjectRegistry::discover(world)?;
        let playback = PlaybackBindings::select(collaborators.playback, playback_type, strategy.mode());

        let mut tool = Self {
            strategy,
            registry,
            environment_name: info.environment_name.clone(),
            trial,
            grasping_target: None,
            destination: None,
            graspables_positions: PositionsMap::new(),
            destinations_positions: PositionsMap::new(),
            flags: SessionFlags::default(),
            playback,
            contact_detector: collaborators.contact_detector,
            grasping_detector: collaborators.grasping_detector,
            deployment_check: None,
        };
        tool.initialize(world, &info)?;
        Ok(tool)
    }

    /// Places every graspable and destination for the trial and clears the
    /// session flags.
    pub fn initialize(&mut self, world: &mut World, info: &EnvironmentInfo) -> Result<(), SessionError> {
        self.cancel_deployment_check();
        self.registry.deactivate_placement_slots(world);

        let layout = self.strategy.build_layout(world, &mut self.registry, info)?;
        layout.graspables.apply(world);
        layout.destinations.apply(world);

        self.grasping_target = layout.grasping_target;
        self.destination = layout.destination;
        self.graspables_positions = layout.graspables;
        self.destinations_positions = layout.destinations;
        self.flags = SessionFlags::default();
        Ok(())
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.strategy.mode()
    }

    pub fn trial(&self) -> u32 {
        self.trial
    }

    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn graspables(&self) -> &[EntityId] {
        self.registry.graspables()
    }

    pub fn robot(&self) -> EntityId {
        self.registry.robot()
    }

    pub fn grasping_target(&self) -> Option<EntityId> {
        self.grasping_target
    }

    pub fn destination(&self) -> Option<EntityId> {
        self.destination
    }

    pub fn graspables_positions(&self) -> &PositionsMap {
        &self.graspables_positions
    }

    pub fn destinations_positions(&self) -> &PositionsMap {
        &self.destinations_positions
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn has_pressed_button_for_data_generation(&self) -> bool {
        self.flags.pressed_button_for_data_generation
    }

    pub fn has_pointed_target(&self) -> bool {
        self.flags.pointed_target
    }

    pub fn has_pointed_destination(&self) -> bool {
        self.flags.pointed_destination
    }

    pub fn is_grasping_candidate(&self, world: &World, target: EntityId) -> bool {
        self.registry.is_grasping_candidate(world, target)
    }

    pub fn is_destination_candidate(&self, world: &World, destination: EntityId) -> bool {
        self.registry.is_destination_candidate(world, destination)
    }

    pub fn task_detail(&self, world: &World) -> String {
        let name = |id: Option<EntityId>| id.map(|id| world.label(id)).unwrap_or_default();
        format!(
            "Target={},  Destination={}",
            name(self.grasping_target),
            name(self.destination)
        )
    }

    /// Records that the avatar pointed at something. Only the two sending
    /// steps accept pointing; anything else is logged and ignored.
    pub fn point_object(&mut self, pointer: &PointerTarget, step: ModeratorStep) {
        match step {
            ModeratorStep::SendingPickItUpMsg => {
                self.flags.pointed_target = true;
                if let Some(target) = self.strategy.pointed_target(pointer) {
                    if target.is_none() {
                        log::warn!("No graspable object is pointed at");
                    }
                    self.grasping_target = target;
                }
            }
            ModeratorStep::SendingCleanUpMsg => {
                self.flags.pointed_destination = true;
                if let Some(destination) = self.strategy.pointed_destination(pointer) {
                    if destination.is_none() {
                        log::warn!("No destination candidate is pointed at");
                    }
                    self.destination = destination;
                }
            }
            _ => log::warn!("This pointing by the avatar is an invalid timing. step={step:?}"),
        }
    }

    /// Clears the pointing recorded from `step` onwards so the avatar can
    /// point again.
    pub fn reopen_pointing(&mut self, step: ModeratorStep) {
        match step {
            ModeratorStep::SendingPickItUpMsg => {
                self.flags.pointed_target = false;
                self.flags.pointed_destination = false;
            }
            ModeratorStep::SendingCleanUpMsg => self.flags.pointed_destination = false,
            _ => log::warn!("Pointing cannot be reopened. step={step:?}"),
        }
    }

    pub fn press_a_or_x(&mut self, step: ModeratorStep) {
        match step {
            ModeratorStep::TaskStart => self.flags.pressed_button_for_data_generation = true,
            ModeratorStep::WaitForTaskFinished
            | ModeratorStep::Judgement
            | ModeratorStep::WaitForNextTask => self.playback.stop_avatar_motion(),
            _ => log::warn!(
                "This pressing A or X by the avatar is an invalid timing. step={step:?}"
            ),
        }
    }

    /// Starts a deployment check, replacing any check still in flight.
    pub fn begin_deployment_check(&mut self) -> Result<(), SessionError> {
        let target = self.grasping_target.ok_or(SessionError::TargetNotSelected)?;
        let destination = self.destination.ok_or(SessionError::DestinationNotSelected)?;
        self.cancel_deployment_check();
        self.flags.deployment = DeploymentState::Unknown;
        self.deployment_check = Some(DeploymentCheck::new(target, destination, self.registry.robot()));
        Ok(())
    }

    /// Resumes the running check. Without one, reports the last outcome.
    pub fn poll_deployment(&mut self, world: &World) -> Poll<DeploymentState> {
        let Some(check) = self.deployment_check else {
            return Poll::Ready(self.flags.deployment);
        };
        match check.poll(world, self.contact_detector.as_mut()) {
            Poll::Ready(state) => {
                self.deployment_check = None;
                self.flags.deployment = state;
                Poll::Ready(state)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    pub fn cancel_deployment_check(&mut self) {
        if let Some(check) = self.deployment_check.take() {
            check.cancel(self.contact_detector.as_mut());
        }
    }

    pub fn is_deployment_check_finished(&self) -> bool {
        self.flags.deployment.is_finished()
    }

    pub fn is_deployment_succeeded(&self) -> bool {
        self.flags.deployment.is_succeeded()
    }

    /// True when the robot holds exactly the grasping target.
    pub fn is_correct_object(&self, world: &World) -> bool {
        match (
            self.grasping_detector.grasped_object(world, self.registry.robot()),
            self.grasping_target,
        ) {
            (Some(held), Some(target)) => held == target,
            _ => false,
        }
    }

    pub fn initialize_playback(&mut self) {
        self.playback.initialize(self.trial);
    }

    pub fn is_playback_initialized(&self) -> bool {
        self.playback.is_initialized()
    }

    pub fn start_playback(&mut self) {
        self.playback.start();
    }

    pub fn stop_playback(&mut self) {
        self.playback.stop();
    }

    pub fn is_playback_finished(&self) -> bool {
        self.playback.is_finished()
    }

    pub fn tick_playback(&mut self, delta_seconds: f32) {
        self.playback.tick(delta_seconds);
    }

    /// Snapshot of the current trial; target and destination must be chosen.
    pub fn environment_info(&self, world: &World) -> Result<EnvironmentInfo, SessionError> {
        let target = self.grasping_target.ok_or(SessionError::TargetNotSelected)?;
        let destination = self.destination.ok_or(SessionError::DestinationNotSelected)?;
        Ok(layout_snapshot(
            world,
            &self.environment_name,
            target,
            destination,
            &self.graspables_positions,
            &self.destinations_positions,
        ))
    }

    /// Queues the trial snapshot on the background writer and returns the
    /// path it will be written to.
    pub fn save_environment_info(
        &self,
        world: &World,
        writer: &SnapshotWriter,
    ) -> Result<PathBuf, SessionError> {
        let dir = self
            .strategy
            .snapshot_dir()
            .ok_or(SessionError::NotInDataGeneration)?;
        let info = self.environment_info(world)?;
        let path = snapshot_path(dir, self.trial);
        writer.submit(WriteJob {
            info,
            path: path.clone(),
        })?;
        Ok(path)
    }
}

impl Drop for ModeratorTool {
    fn drop(&mut self) {
        self.cancel_deployment_check();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::SLOT_SURFACE_RATIO;
    use cleanup_formats::{EntityTag, SceneEntity, SceneFile, Vec3};
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    const SLOT_HEIGHT: f32 = 0.9;
    const SLOT_SCALE_Y: f32 = 0.2;

    fn scene() -> SceneFile {
        let mut layout = SceneEntity::new("LayoutA", EntityTag::Environment);
        for (index, name) in ["apple", "cup", "can"].into_iter().enumerate() {
            layout = layout.with_child(
                SceneEntity::new(name, EntityTag::GraspingCandidate)
                    .at(Vec3::new(index as f32, 0.0, 5.0))
                    .with_rigidbody(),
            );
        }
        for name in ["sponge", "ball"] {
            layout = layout.with_child(SceneEntity::new(name, EntityTag::DummyGraspingCandidate));
        }
        for index in 0..6 {
            layout = layout.with_child(
                SceneEntity::new(format!("slot{index:02}"), EntityTag::GraspingCandidatePosition)
                    .at(Vec3::new(index as f32 * 0.5, SLOT_HEIGHT, 1.0))
                    .scaled(Vec3::new(0.1, SLOT_SCALE_Y, 0.1)),
            );
        }
        layout = layout
            .with_child(
                SceneEntity::new("trashbox", EntityTag::DestinationCandidate)
                    .at(Vec3::new(-1.0, 0.3, 0.0)),
            )
            .with_child(
                SceneEntity::new("shelf", EntityTag::DestinationCandidate)
                    .at(Vec3::new(-2.0, 0.8, 0.0)),
            );

        let other = SceneEntity::new("LayoutB", EntityTag::Environment)
            .inactive()
            .with_child(SceneEntity::new("plate", EntityTag::GraspingCandidate));

        SceneFile {
            entities: vec![layout, other, SceneEntity::new("hsrb", EntityTag::Robot)],
        }
    }

    fn data_generation() -> (World, ModeratorTool) {
        let mut world = World::from_scene(&scene());
        let config = CleanupConfig {
            execution_mode: ExecutionMode::DataGeneration,
            random_seed: Some(5),
            ..CleanupConfig::default()
        };
        let tool = ModeratorTool::new(
            &mut world,
            &config,
            1,
            ModeratorCollaborators::reference(1.0, 2),
        )
        .expect("moderator builds");
        (world, tool)
    }

    fn pointer_at(graspable: Option<EntityId>, destination: Option<EntityId>) -> PointerTarget {
        PointerTarget {
            nearest_graspable: graspable,
            nearest_destination: destination,
        }
    }

    #[test]
    fn data_generation_places_every_graspable_on_a_slot() {
        let (world, tool) = data_generation();
        assert_eq!(tool.environment_name(), "LayoutA");
        assert_eq!(tool.graspables_positions().len(), 5);

        let expected_height = SLOT_HEIGHT - SLOT_SURFACE_RATIO * SLOT_SCALE_Y;
        let mut names = BTreeSet::new();
        for (info, entity) in tool.graspables_positions().iter() {
            assert!((info.position.y - expected_height).abs() < 1e-5);
            let placed = world.transform(*entity).expect("entity exists");
            assert_eq!(placed.position, info.position);
            names.insert(info.name.clone());
        }
        let expected: BTreeSet<String> = ["apple", "cup", "can", "sponge", "ball"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(names, expected);

        let slots = tool.registry().placement_slots();
        assert!(slots.iter().all(|slot| !world.is_active_self(*slot)));
        assert_eq!(tool.grasping_target(), None);
        assert_eq!(tool.flags(), SessionFlags::default());
    }

    #[test]
    fn pointing_at_the_wrong_step_changes_nothing() {
        let (world, mut tool) = data_generation();
        let apple = world.find_by_name("apple");
        let before = tool.flags();
        tool.point_object(&pointer_at(apple, None), ModeratorStep::WaitForNextTask);
        tool.point_object(&pointer_at(apple, None), ModeratorStep::TaskStart);
        assert_eq!(tool.flags(), before);
        assert_eq!(tool.grasping_target(), None);
    }

    #[test]
    fn pointing_selects_target_and_destination_in_data_generation() {
        let (world, mut tool) = data_generation();
        let apple = world.find_by_name("apple");
        let shelf = world.find_by_name("shelf");
        tool.point_object(&pointer_at(apple, None), ModeratorStep::SendingPickItUpMsg);
        tool.point_object(&pointer_at(None, shelf), ModeratorStep::SendingCleanUpMsg);
        assert!(tool.has_pointed_target());
        assert!(tool.has_pointed_destination());
        assert_eq!(tool.grasping_target(), apple);
        assert_eq!(tool.task_detail(&world), "Target=apple,  Destination=shelf");
    }

    #[test]
    fn correct_object_follows_what_the_robot_holds() {
        let (mut world, mut tool) = data_generation();
        let apple = world.find_by_name("apple").expect("apple");
        let cup = world.find_by_name("cup").expect("cup");
        assert!(!tool.is_correct_object(&world), "no target yet");

        tool.point_object(&pointer_at(Some(apple), None), ModeratorStep::SendingPickItUpMsg);
        assert!(!tool.is_correct_object(&world), "nothing held");

        world.set_parent(cup, Some(tool.robot()));
        assert!(!tool.is_correct_object(&world));

        world.set_parent(cup, None);
        world.set_parent(apple, Some(tool.robot()));
        assert!(tool.is_correct_object(&world));
    }

    #[test]
    fn deployment_succeeds_once_target_rests_on_destination() {
        let (mut world, mut tool) = data_generation();
        let apple = world.find_by_name("apple").expect("apple");
        let trashbox = world.find_by_name("trashbox").expect("trashbox");
        assert!(matches!(
            tool.begin_deployment_check(),
            Err(SessionError::TargetNotSelected)
        ));

        tool.point_object(&pointer_at(Some(apple), None), ModeratorStep::SendingPickItUpMsg);
        tool.point_object(&pointer_at(None, Some(trashbox)), ModeratorStep::SendingCleanUpMsg);

        world.set_parent(apple, Some(tool.robot()));
        tool.begin_deployment_check().expect("target and destination chosen");
        assert_eq!(
            tool.poll_deployment(&world),
            Poll::Ready(DeploymentState::Failed)
        );
        assert!(tool.is_deployment_check_finished());
        assert!(!tool.is_deployment_succeeded());

        world.set_parent(apple, None);
        world.set_pose(apple, Vec3::new(-1.0, 0.4, 0.05), Vec3::ZERO);
        tool.begin_deployment_check().expect("restart");
        assert!(!tool.is_deployment_check_finished());
        assert_eq!(tool.poll_deployment(&world), Poll::Pending);
        assert_eq!(
            tool.poll_deployment(&world),
            Poll::Ready(DeploymentState::Succeeded)
        );
        assert!(tool.is_deployment_succeeded());
    }

    #[test]
    fn reopening_pick_up_clears_both_pointings() {
        let (world, mut tool) = data_generation();
        let apple = world.find_by_name("apple");
        let shelf = world.find_by_name("shelf");
        tool.point_object(&pointer_at(apple, None), ModeratorStep::SendingPickItUpMsg);
        tool.point_object(&pointer_at(None, shelf), ModeratorStep::SendingCleanUpMsg);

        tool.reopen_pointing(ModeratorStep::SendingCleanUpMsg);
        assert!(tool.has_pointed_target());
        assert!(!tool.has_pointed_destination());

        tool.reopen_pointing(ModeratorStep::SendingPickItUpMsg);
        assert!(!tool.has_pointed_target());
        assert_eq!(tool.grasping_target(), apple, "target kept until pointed again");
    }

    #[test]
    fn press_at_task_start_confirms_data_generation() {
        let (_world, mut tool) = data_generation();
        tool.press_a_or_x(ModeratorStep::SendingCleanUpMsg);
        assert!(!tool.has_pressed_button_for_data_generation());
        tool.press_a_or_x(ModeratorStep::TaskStart);
        assert!(tool.has_pressed_button_for_data_generation());
    }

    #[test]
    fn competition_without_snapshot_is_fatal() {
        let dir = tempdir().expect("tempdir");
        let mut world = World::from_scene(&scene());
        let config = CleanupConfig {
            execution_mode: ExecutionMode::Competition,
            snapshot_dir: dir.path().to_path_buf(),
            ..CleanupConfig::default()
        };
        let result = ModeratorTool::new(
            &mut world,
            &config,
            1,
            ModeratorCollaborators::reference(1.0, 2),
        );
        assert!(matches!(result, Err(SessionError::Snapshot(_))));
    }

    #[test]
    fn competition_rejects_unknown_target() {
        let dir = tempdir().expect("tempdir");
        let mut world = World::from_scene(&scene());
        let info = EnvironmentInfo {
            environment_name: "LayoutA".to_string(),
            grasping_target_name: "banana".to_string(),
            destination_name: "trashbox".to_string(),
            graspables_positions: Vec::new(),
            destinations_positions: Vec::new(),
        };
        cleanup_formats::write_snapshot(&snapshot_path(dir.path(), 2), &info).expect("write");
        let config = CleanupConfig {
            execution_mode: ExecutionMode::Competition,
            snapshot_dir: dir.path().to_path_buf(),
            ..CleanupConfig::default()
        };
        let result = ModeratorTool::new(
            &mut world,
            &config,
            2,
            ModeratorCollaborators::reference(1.0, 2),
        );
        assert!(matches!(
            result,
            Err(SessionError::UnknownObject { name, .. }) if name == "banana"
        ));
    }

    #[test]
    fn saving_requires_data_generation_and_a_choice() {
        let dir = tempdir().expect("tempdir");
        let mut world = World::from_scene(&scene());
        let config = CleanupConfig {
            execution_mode: ExecutionMode::DataGeneration,
            snapshot_dir: dir.path().to_path_buf(),
            random_seed: Some(9),
            ..CleanupConfig::default()
        };
        let mut tool = ModeratorTool::new(
            &mut world,
            &config,
            3,
            ModeratorCollaborators::reference(1.0, 2),
        )
        .expect("moderator");
        let writer = SnapshotWriter::spawn().expect("writer");
        assert!(matches!(
            tool.save_environment_info(&world, &writer),
            Err(SessionError::TargetNotSelected)
        ));

        let apple = world.find_by_name("apple");
        let trashbox = world.find_by_name("trashbox");
        tool.point_object(&pointer_at(apple, None), ModeratorStep::SendingPickItUpMsg);
        tool.point_object(&pointer_at(None, trashbox), ModeratorStep::SendingCleanUpMsg);
        let path = tool
            .save_environment_info(&world, &writer)
            .expect("snapshot queued");
        assert_eq!(path, dir.path().join("EnvironmentInfo03.json"));

        let outcomes = writer.finish();
        assert_eq!(outcomes.len(), 1);
        let saved = cleanup_formats::read_snapshot(&path).expect("snapshot on disk");
        assert_eq!(saved.grasping_target_name, "apple");
        assert_eq!(saved.destination_name, "trashbox");
        assert_eq!(saved.graspables_positions.len(), 5);
        assert_eq!(saved.destinations_positions.len(), 2);
    }
}
