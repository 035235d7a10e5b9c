use std::cell::Cell;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::task::Poll;

use anyhow::Context;
use cleanup_formats::SceneFile;
use serde::Serialize;

use crate::config::{CleanupConfig, SensorRates, SessionLedger};
use crate::deployment::{DeploymentState, SettleWatch};
use crate::input::{AvatarEvent, AvatarInputRouter, ControllerFrame};
use crate::mode::ExecutionMode;
use crate::moderator::{ModeratorCollaborators, ModeratorStep, ModeratorTool};
use crate::score::{ScoreKind, ScoreManager, TimeIsUpHandler};
use crate::world::{EntityId, World};
use crate::writer::{SnapshotWriter, WriteOutcome};

/// Text messages the robot sends to the moderator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RobotMessage {
    IAmReady,
    ObjectGrasped,
    TaskFinished,
    PointItAgain,
    IsThisCorrect,
}

impl RobotMessage {
    pub const ALL: [RobotMessage; 5] = [
        RobotMessage::IAmReady,
        RobotMessage::ObjectGrasped,
        RobotMessage::TaskFinished,
        RobotMessage::PointItAgain,
        RobotMessage::IsThisCorrect,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RobotMessage::IAmReady => "I_am_ready",
            RobotMessage::ObjectGrasped => "Object_grasped",
            RobotMessage::TaskFinished => "Task_finished",
            RobotMessage::PointItAgain => "Point_it_again",
            RobotMessage::IsThisCorrect => "Is_this_correct?",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        RobotMessage::ALL
            .into_iter()
            .find(|message| message.as_str() == raw)
    }
}

/// Text messages the moderator sends to the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModeratorMessage {
    AreYouReady,
    PickItUp,
    CleanUp,
    TaskSucceeded,
    TaskFailed,
    MissionComplete,
    Yes,
    No,
}

impl ModeratorMessage {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeratorMessage::AreYouReady => "Are_you_ready?",
            ModeratorMessage::PickItUp => "Pick_it_up!",
            ModeratorMessage::CleanUp => "Clean_up!",
            ModeratorMessage::TaskSucceeded => "Task_succeeded",
            ModeratorMessage::TaskFailed => "Task_failed",
            ModeratorMessage::MissionComplete => "Mission_complete",
            ModeratorMessage::Yes => "Yes",
            ModeratorMessage::No => "No",
        }
    }
}

impl fmt::Display for ModeratorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the engine-side collaborators for each trial's moderator.
pub trait CollaboratorFactory {
    fn collaborators(&mut self, trial: u32) -> ModeratorCollaborators;
}

#[derive(Debug, Clone, Copy)]
pub struct ReferenceCollaborators {
    pub avatar_motion_seconds: f32,
    pub settle_frames: u32,
}

impl Default for ReferenceCollaborators {
    fn default() -> Self {
        Self {
            avatar_motion_seconds: 5.0,
            settle_frames: 30,
        }
    }
}

impl CollaboratorFactory for ReferenceCollaborators {
    fn collaborators(&mut self, _trial: u32) -> ModeratorCollaborators {
        ModeratorCollaborators::reference(self.avatar_motion_seconds, self.settle_frames)
    }
}

#[derive(Default)]
struct TimeUpLatch {
    fired: Cell<bool>,
}

impl TimeUpLatch {
    fn take(&self) -> bool {
        self.fired.replace(false)
    }
}

impl TimeIsUpHandler for TimeUpLatch {
    fn on_time_is_up(&self) {
        self.fired.set(true);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRecord {
    pub path: PathBuf,
    /// `None` until the writer reports back.
    pub written: Option<bool>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialReport {
    pub trial: u32,
    pub environment: String,
    pub grasping_target: Option<String>,
    pub destination: Option<String>,
    pub score: i32,
    pub deployment: DeploymentState,
    pub timed_out: bool,
    pub completed: bool,
    pub snapshot: Option<SnapshotRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub execution_mode: ExecutionMode,
    pub trials: Vec<TrialReport>,
    pub total_score: i64,
    pub sensor_rates: SensorRates,
}

#[derive(Debug, Default)]
struct TrialProgress {
    robot_ready: bool,
    object_grasped: bool,
    task_finished: bool,
    timed_out: bool,
    skip_deployment_check: bool,
    deployment: DeploymentState,
    snapshot: Option<SnapshotRecord>,
}

fn post(outbox: &mut Vec<ModeratorMessage>, message: ModeratorMessage) {
    log::info!("Sending message: {message}");
    outbox.push(message);
}

/// Drives trials one after another: owns the world, the moderator of the
/// current trial, the score engine and the snapshot writer. The host calls
/// `initialize` once, `tick` every frame and `teardown` at the end.
pub struct CleanupSession {
    config: CleanupConfig,
    scene: SceneFile,
    factory: Box<dyn CollaboratorFactory>,
    world: World,
    moderator: Option<ModeratorTool>,
    score: ScoreManager,
    ledger: SessionLedger,
    router: AvatarInputRouter,
    writer: Option<SnapshotWriter>,
    time_up: Rc<TimeUpLatch>,
    step: ModeratorStep,
    progress: TrialProgress,
    settle_watches: Vec<SettleWatch>,
    reports: Vec<TrialReport>,
    outbox: Vec<ModeratorMessage>,
    sensor_rates: SensorRates,
    finished: bool,
}

impl CleanupSession {
    pub fn new(
        config: CleanupConfig,
        scene: SceneFile,
        factory: Box<dyn CollaboratorFactory>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let writer = match config.execution_mode {
            ExecutionMode::DataGeneration => Some(SnapshotWriter::spawn()?),
            ExecutionMode::Competition => None,
        };
        let time_up = Rc::new(TimeUpLatch::default());
        let mut score = ScoreManager::new(config.session_time_limit);
        score.add_time_up_handler(time_up.clone());
        let sensor_rates =
            SensorRates::for_mode(config.execution_mode, config.reduce_load_in_data_gen);
        log::info!(
            "Execution mode={} sensor intervals(ms) depth={} rgb={} stereo={} wide={}",
            config.execution_mode,
            sensor_rates.xtion_depth_ms,
            sensor_rates.xtion_rgb_ms,
            sensor_rates.stereo_rgb_ms,
            sensor_rates.wide_rgb_ms
        );

        Ok(Self {
            ledger: SessionLedger::with_score_file(config.score_file.clone()),
            config,
            scene,
            factory,
            world: World::new(),
            moderator: None,
            score,
            router: AvatarInputRouter::new(),
            writer,
            time_up,
            step: ModeratorStep::TaskStart,
            progress: TrialProgress::default(),
            settle_watches: Vec::new(),
            reports: Vec::new(),
            outbox: Vec::new(),
            sensor_rates,
            finished: false,
        })
    }

    pub fn initialize(&mut self) -> anyhow::Result<()> {
        self.start_trial()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// The host bridge mirrors physics and grasping into the world here.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn moderator(&self) -> Option<&ModeratorTool> {
        self.moderator.as_ref()
    }

    pub fn step(&self) -> ModeratorStep {
        self.step
    }

    pub fn trial(&self) -> u32 {
        self.ledger.number_of_trials()
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    pub fn score(&self) -> &ScoreManager {
        &self.score
    }

    /// For registering score listeners and the panel.
    pub fn score_mut(&mut self) -> &mut ScoreManager {
        &mut self.score
    }

    pub fn sensor_rates(&self) -> SensorRates {
        self.sensor_rates
    }

    pub fn reports(&self) -> &[TrialReport] {
        &self.reports
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Messages queued for the robot since the last call.
    pub fn take_outgoing(&mut self) -> Vec<ModeratorMessage> {
        std::mem::take(&mut self.outbox)
    }

    fn start_trial(&mut self) -> anyhow::Result<()> {
        let trial = self.ledger.increment_number_of_trials();
        log::info!("Trial {trial} start");

        self.world = World::from_scene(&self.scene);
        let collaborators = self.factory.collaborators(trial);
        let mut moderator = ModeratorTool::new(&mut self.world, &self.config, trial, collaborators)
            .with_context(|| format!("initializing trial {trial}"))?;

        self.settle_watches = moderator
            .graspables()
            .iter()
            .copied()
            .filter(|id| self.world.rigidbody(*id).is_some())
            .map(SettleWatch::new)
            .collect();

        self.score.start(&self.ledger);
        moderator.initialize_playback();
        self.moderator = Some(moderator);
        self.progress = TrialProgress::default();
        self.step = ModeratorStep::TaskStart;
        self.time_up.take();
        post(&mut self.outbox, ModeratorMessage::AreYouReady);
        Ok(())
    }

    pub fn handle_controller_frame(&mut self, frame: &ControllerFrame) {
        let Some(moderator) = self.moderator.as_ref() else {
            return;
        };
        let events = self.router.route(frame, &self.world, moderator.registry());
        for event in events {
            self.handle_avatar_event(event);
        }
    }

    pub fn handle_avatar_event(&mut self, event: AvatarEvent) {
        let Some(moderator) = self.moderator.as_mut() else {
            return;
        };
        match event {
            AvatarEvent::PointByLeft(target) | AvatarEvent::PointByRight(target) => {
                moderator.point_object(&target, self.step)
            }
            AvatarEvent::PressA | AvatarEvent::PressX => moderator.press_a_or_x(self.step),
        }
    }

    pub fn receive_robot_message(&mut self, raw: &str) {
        let Some(message) = RobotMessage::parse(raw) else {
            log::warn!("Received an illegal message. message={raw}");
            return;
        };
        log::info!("Received message: {}", message.as_str());
        let Some(moderator) = self.moderator.as_mut() else {
            log::warn!("No trial is running. message={}", message.as_str());
            return;
        };

        let step = self.step;
        match message {
            RobotMessage::IAmReady if step == ModeratorStep::TaskStart => {
                self.progress.robot_ready = true;
            }
            RobotMessage::ObjectGrasped
                if matches!(
                    step,
                    ModeratorStep::SendingCleanUpMsg | ModeratorStep::WaitForTaskFinished
                ) =>
            {
                if self.progress.object_grasped {
                    log::warn!("The grasping target has already been grasped");
                    return;
                }
                let kind = if moderator.is_correct_object(&self.world) {
                    self.progress.object_grasped = true;
                    ScoreKind::ObjectGraspedSuccess
                } else {
                    ScoreKind::ObjectGraspedFailure
                };
                self.score.add_score(kind, &self.ledger);
            }
            RobotMessage::IsThisCorrect
                if matches!(
                    step,
                    ModeratorStep::SendingPickItUpMsg
                        | ModeratorStep::SendingCleanUpMsg
                        | ModeratorStep::WaitForTaskFinished
                ) =>
            {
                self.score.add_score(ScoreKind::AskedCorrectOrNot, &self.ledger);
                let answer = if moderator.is_correct_object(&self.world) {
                    ModeratorMessage::Yes
                } else {
                    ModeratorMessage::No
                };
                post(&mut self.outbox, answer);
            }
            RobotMessage::PointItAgain
                if matches!(
                    step,
                    ModeratorStep::SendingCleanUpMsg | ModeratorStep::WaitForTaskFinished
                ) =>
            {
                self.score.add_score(ScoreKind::PointItAgain, &self.ledger);
                let reopened = if self.progress.object_grasped {
                    ModeratorStep::SendingCleanUpMsg
                } else {
                    ModeratorStep::SendingPickItUpMsg
                };
                moderator.reopen_pointing(reopened);
                self.step = reopened;
            }
            RobotMessage::TaskFinished if step == ModeratorStep::WaitForTaskFinished => {
                self.progress.task_finished = true;
            }
            _ => log::warn!(
                "This message is an invalid timing. message={} step={step:?}",
                message.as_str()
            ),
        }
    }

    pub fn on_robot_collision(&mut self) {
        self.score.on_robot_collision_enter(&self.ledger);
    }

    pub fn on_object_collision(&mut self) {
        self.score.on_object_collision_enter(&self.ledger);
    }

    pub fn tick(&mut self, delta_seconds: f32) -> anyhow::Result<()> {
        if self.finished {
            return Ok(());
        }

        let outcomes = self
            .writer
            .as_ref()
            .map(SnapshotWriter::drain_results)
            .unwrap_or_default();
        for outcome in outcomes {
            self.record_write_outcome(outcome);
        }

        self.settle_watches
            .retain(|watch| watch.poll(&mut self.world).is_pending());

        if let Some(moderator) = self.moderator.as_mut() {
            moderator.tick_playback(delta_seconds);
        }
        self.score.tick(delta_seconds);
        if self.time_up.take() {
            self.on_time_up();
        }

        self.advance()
    }

    fn on_time_up(&mut self) {
        if matches!(
            self.step,
            ModeratorStep::SendingPickItUpMsg
                | ModeratorStep::SendingCleanUpMsg
                | ModeratorStep::WaitForTaskFinished
        ) {
            log::info!("Time is up. step={:?}", self.step);
            self.progress.timed_out = true;
            self.progress.task_finished = true;
            self.step = ModeratorStep::WaitForTaskFinished;
        }
    }

    fn advance(&mut self) -> anyhow::Result<()> {
        let Some(moderator) = self.moderator.as_mut() else {
            return Ok(());
        };

        match self.step {
            ModeratorStep::TaskStart => {
                let ready = match moderator.execution_mode() {
                    ExecutionMode::Competition => self.progress.robot_ready,
                    ExecutionMode::DataGeneration => {
                        moderator.has_pressed_button_for_data_generation()
                    }
                };
                if ready && moderator.is_playback_initialized() {
                    moderator.start_playback();
                    self.score.task_start();
                    self.step = ModeratorStep::SendingPickItUpMsg;
                }
            }
            ModeratorStep::SendingPickItUpMsg => {
                if moderator.has_pointed_target() {
                    post(&mut self.outbox, ModeratorMessage::PickItUp);
                    self.step = ModeratorStep::SendingCleanUpMsg;
                }
            }
            ModeratorStep::SendingCleanUpMsg => {
                if moderator.has_pointed_destination() {
                    post(&mut self.outbox, ModeratorMessage::CleanUp);
                    self.step = ModeratorStep::WaitForTaskFinished;
                }
            }
            ModeratorStep::WaitForTaskFinished => {
                if self.progress.task_finished {
                    if let Err(err) = moderator.begin_deployment_check() {
                        log::warn!("Deployment cannot be checked: {err}");
                        self.progress.skip_deployment_check = true;
                    }
                    self.step = ModeratorStep::Judgement;
                }
            }
            ModeratorStep::Judgement => {
                let outcome = if self.progress.skip_deployment_check {
                    Poll::Ready(DeploymentState::Failed)
                } else {
                    moderator.poll_deployment(&self.world)
                };
                let Poll::Ready(state) = outcome else {
                    return Ok(());
                };
                self.progress.deployment = state;

                if state.is_succeeded() {
                    self.score.add_score(ScoreKind::CleanupSuccess, &self.ledger);
                    post(&mut self.outbox, ModeratorMessage::TaskSucceeded);
                } else {
                    self.score.add_score(ScoreKind::CleanupFailure, &self.ledger);
                    post(&mut self.outbox, ModeratorMessage::TaskFailed);
                }

                if let Some(writer) = &self.writer {
                    match moderator.save_environment_info(&self.world, writer) {
                        Ok(path) => {
                            self.progress.snapshot = Some(SnapshotRecord {
                                path,
                                written: None,
                                error: None,
                            });
                        }
                        Err(err) => log::error!("Environment info is not saved: {err}"),
                    }
                }

                moderator.stop_playback();
                // The trial is judged even if persisting the total fails.
                self.step = ModeratorStep::WaitForNextTask;
                self.score
                    .task_end(&mut self.ledger)
                    .with_context(|| format!("ending trial {}", moderator.trial()))?;
            }
            ModeratorStep::WaitForNextTask => {
                if moderator.is_playback_finished() {
                    self.complete_trial()?;
                }
            }
        }
        Ok(())
    }

    fn current_report(&self, completed: bool) -> Option<TrialReport> {
        let moderator = self.moderator.as_ref()?;
        let name = |id: EntityId| self.world.name(id).map(str::to_string);
        Some(TrialReport {
            trial: moderator.trial(),
            environment: moderator.environment_name().to_string(),
            grasping_target: moderator.grasping_target().and_then(name),
            destination: moderator.destination().and_then(name),
            score: self.score.score(),
            deployment: self.progress.deployment,
            timed_out: self.progress.timed_out,
            completed,
            snapshot: self.progress.snapshot.clone(),
        })
    }

    fn complete_trial(&mut self) -> anyhow::Result<()> {
        if let Some(report) = self.current_report(true) {
            log::info!(
                "Trial {} finished. score={} deployment={:?}",
                report.trial,
                report.score,
                report.deployment
            );
            self.reports.push(report);
        }
        self.moderator = None;
        self.progress = TrialProgress::default();

        if self.ledger.number_of_trials() >= self.config.max_number_of_trials {
            post(&mut self.outbox, ModeratorMessage::MissionComplete);
            self.finished = true;
            return Ok(());
        }
        self.start_trial()
    }

    fn record_write_outcome(&mut self, outcome: WriteOutcome) {
        let error = match outcome.result {
            Ok(()) => None,
            Err(err) => {
                log::error!(
                    "Failed to save environment info. path={} error={err}",
                    outcome.path.display()
                );
                Some(err.to_string())
            }
        };
        let record = self
            .reports
            .iter_mut()
            .filter_map(|report| report.snapshot.as_mut())
            .chain(self.progress.snapshot.as_mut())
            .find(|record| record.path == outcome.path);
        match record {
            Some(record) => {
                record.written = Some(error.is_none());
                record.error = error;
            }
            None => log::warn!(
                "Write outcome for an unknown snapshot. path={}",
                outcome.path.display()
            ),
        }
    }

    /// Stops the run: abandons the trial in progress, flushes pending
    /// snapshot writes and returns the run summary.
    pub fn teardown(&mut self) -> RunReport {
        if let Some(report) = self.current_report(false) {
            log::warn!("Trial {} was not completed", report.trial);
            self.reports.push(report);
        }
        self.moderator = None;
        self.settle_watches.clear();

        if let Some(writer) = self.writer.take() {
            for outcome in writer.finish() {
                self.record_write_outcome(outcome);
            }
        }
        self.finished = true;

        RunReport {
            execution_mode: self.config.execution_mode,
            trials: self.reports.clone(),
            total_score: self.ledger.total_score(),
            sensor_rates: self.sensor_rates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::PointerTarget;
    use cleanup_formats::{EntityTag, SceneEntity, Vec3};
    use tempfile::tempdir;

    fn scene() -> SceneFile {
        let mut layout = SceneEntity::new("LayoutA", EntityTag::Environment)
            .with_child(SceneEntity::new("apple", EntityTag::GraspingCandidate).with_rigidbody())
            .with_child(SceneEntity::new("can", EntityTag::DummyGraspingCandidate));
        for index in 0..3 {
            layout = layout.with_child(
                SceneEntity::new(format!("slot{index}"), EntityTag::GraspingCandidatePosition)
                    .at(Vec3::new(index as f32, 0.9, 1.0)),
            );
        }
        layout = layout.with_child(
            SceneEntity::new("trashbox", EntityTag::DestinationCandidate)
                .at(Vec3::new(-1.0, 0.3, 0.0)),
        );
        SceneFile {
            entities: vec![layout, SceneEntity::new("hsrb", EntityTag::Robot)],
        }
    }

    fn session(mode: ExecutionMode, trials: u32) -> (CleanupSession, tempfile::TempDir) {
        let dir = tempdir().expect("tempdir");
        let config = CleanupConfig {
            execution_mode: mode,
            max_number_of_trials: trials,
            session_time_limit: 10,
            snapshot_dir: dir.path().to_path_buf(),
            random_seed: Some(1),
            ..CleanupConfig::default()
        };
        let factory = ReferenceCollaborators {
            avatar_motion_seconds: 0.5,
            settle_frames: 2,
        };
        let mut session =
            CleanupSession::new(config, scene(), Box::new(factory)).expect("session builds");
        session.initialize().expect("first trial");
        (session, dir)
    }

    fn point(session: &mut CleanupSession, name: &str) {
        let id = session.world().find_by_name(name);
        let target = match name {
            "trashbox" => PointerTarget {
                nearest_graspable: None,
                nearest_destination: id,
            },
            _ => PointerTarget {
                nearest_graspable: id,
                nearest_destination: None,
            },
        };
        session.handle_avatar_event(AvatarEvent::PointByRight(target));
    }

    #[test]
    fn robot_messages_parse_from_wire_text() {
        assert_eq!(
            RobotMessage::parse("Is_this_correct?"),
            Some(RobotMessage::IsThisCorrect)
        );
        assert_eq!(RobotMessage::parse(" I_am_ready\n"), Some(RobotMessage::IAmReady));
        assert_eq!(RobotMessage::parse("Hello"), None);
        assert_eq!(ModeratorMessage::PickItUp.to_string(), "Pick_it_up!");
    }

    #[test]
    fn data_generation_trial_runs_to_mission_complete() {
        let (mut session, dir) = session(ExecutionMode::DataGeneration, 1);
        assert_eq!(session.take_outgoing(), vec![ModeratorMessage::AreYouReady]);

        session.tick(0.1).expect("tick");
        assert_eq!(session.step(), ModeratorStep::TaskStart);
        session.handle_avatar_event(AvatarEvent::PressA);
        session.tick(0.1).expect("tick");
        assert_eq!(session.step(), ModeratorStep::SendingPickItUpMsg);

        point(&mut session, "apple");
        session.tick(0.1).expect("tick");
        point(&mut session, "trashbox");
        session.tick(0.1).expect("tick");
        assert_eq!(session.step(), ModeratorStep::WaitForTaskFinished);

        let apple = session.world().find_by_name("apple").expect("apple");
        let robot = session.moderator().expect("moderator").robot();
        session.world_mut().set_parent(apple, Some(robot));
        session.receive_robot_message("Object_grasped");
        assert_eq!(session.score().score(), 50);

        session.world_mut().set_parent(apple, None);
        session
            .world_mut()
            .set_pose(apple, Vec3::new(-1.0, 0.35, 0.0), Vec3::ZERO);
        session.receive_robot_message("Task_finished");
        for _ in 0..6 {
            session.tick(0.1).expect("tick");
        }

        assert!(session.is_finished());
        assert_eq!(
            session.take_outgoing(),
            vec![
                ModeratorMessage::PickItUp,
                ModeratorMessage::CleanUp,
                ModeratorMessage::TaskSucceeded,
                ModeratorMessage::MissionComplete,
            ]
        );
        assert_eq!(session.ledger().total_score(), 100);

        let report = session.teardown();
        assert_eq!(report.trials.len(), 1);
        let trial = &report.trials[0];
        assert_eq!(trial.deployment, DeploymentState::Succeeded);
        assert_eq!(trial.grasping_target.as_deref(), Some("apple"));
        let snapshot = trial.snapshot.as_ref().expect("snapshot queued");
        assert_eq!(snapshot.written, Some(true));
        assert_eq!(snapshot.path, dir.path().join("EnvironmentInfo01.json"));
    }

    #[test]
    fn time_up_fails_the_trial() {
        let (mut session, _dir) = session(ExecutionMode::DataGeneration, 2);
        session.handle_avatar_event(AvatarEvent::PressX);
        session.tick(0.1).expect("tick");
        assert_eq!(session.step(), ModeratorStep::SendingPickItUpMsg);

        // No target was pointed at, so the check is skipped and fails.
        session.tick(11.0).expect("tick");
        assert_eq!(session.step(), ModeratorStep::Judgement);
        session.tick(0.1).expect("tick");
        assert_eq!(session.step(), ModeratorStep::WaitForNextTask);
        session.tick(0.1).expect("tick");

        assert_eq!(session.trial(), 2, "second trial started");
        let report = &session.reports()[0];
        assert!(report.timed_out);
        assert_eq!(report.deployment, DeploymentState::Failed);
        assert_eq!(report.score, -10);
    }

    #[test]
    fn failed_score_file_write_judges_the_trial_once() {
        let dir = tempdir().expect("tempdir");
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file").expect("blocker file");
        let config = CleanupConfig {
            execution_mode: ExecutionMode::DataGeneration,
            max_number_of_trials: 2,
            session_time_limit: 10,
            snapshot_dir: dir.path().to_path_buf(),
            score_file: Some(blocker.join("score.json")),
            random_seed: Some(1),
            ..CleanupConfig::default()
        };
        let mut session = CleanupSession::new(
            config,
            scene(),
            Box::new(ReferenceCollaborators {
                avatar_motion_seconds: 0.5,
                settle_frames: 2,
            }),
        )
        .expect("session builds");
        session.initialize().expect("first trial");
        session.handle_avatar_event(AvatarEvent::PressA);
        session.tick(0.1).expect("tick");
        session.tick(11.0).expect("tick");
        assert_eq!(session.step(), ModeratorStep::Judgement);

        let err = session.tick(0.1).expect_err("score file cannot be written");
        assert!(format!("{err:#}").contains("ending trial 1"));
        assert_eq!(session.step(), ModeratorStep::WaitForNextTask);
        assert_eq!(session.ledger().trial_scores(), &[-10]);

        session.tick(0.1).expect("next trial starts");
        assert_eq!(session.trial(), 2);
        assert_eq!(session.ledger().trial_scores(), &[-10]);
        assert_eq!(session.ledger().total_score(), -10);
        assert_eq!(session.reports().len(), 1);
    }

    #[test]
    fn point_it_again_reopens_pick_up() {
        let (mut session, _dir) = session(ExecutionMode::DataGeneration, 1);
        session.handle_avatar_event(AvatarEvent::PressA);
        session.tick(0.1).expect("tick");
        point(&mut session, "apple");
        session.tick(0.1).expect("tick");
        assert_eq!(session.step(), ModeratorStep::SendingCleanUpMsg);

        session.receive_robot_message("Point_it_again");
        assert_eq!(session.step(), ModeratorStep::SendingPickItUpMsg);
        assert_eq!(session.score().score(), -10);
        session.tick(0.1).expect("tick");
        assert_eq!(session.step(), ModeratorStep::SendingPickItUpMsg);

        session.receive_robot_message("Is_this_correct?");
        assert_eq!(session.score().score(), -20);
        assert_eq!(session.take_outgoing().last(), Some(&ModeratorMessage::No));
    }

    #[test]
    fn competition_without_snapshot_fails_to_start() {
        let dir = tempdir().expect("tempdir");
        let config = CleanupConfig {
            execution_mode: ExecutionMode::Competition,
            snapshot_dir: dir.path().to_path_buf(),
            ..CleanupConfig::default()
        };
        let mut session = CleanupSession::new(
            config,
            scene(),
            Box::new(ReferenceCollaborators::default()),
        )
        .expect("session builds");
        let err = session.initialize().expect_err("no snapshot for trial 1");
        assert!(format!("{err:#}").contains("environment info file does not exist"));
    }

    #[test]
    fn messages_at_the_wrong_step_are_ignored() {
        let (mut session, _dir) = session(ExecutionMode::DataGeneration, 1);
        session.receive_robot_message("Task_finished");
        session.receive_robot_message("Object_grasped");
        session.receive_robot_message("nonsense");
        assert_eq!(session.score().score(), 0);
        session.on_robot_collision();
        assert_eq!(session.score().score(), 0);
    }
}
