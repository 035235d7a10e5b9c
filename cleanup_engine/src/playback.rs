use crate::mode::{ExecutionMode, PlaybackType};

/// Lifecycle shared by the world and avatar-motion recorders and players.
pub trait PlaybackSession {
    fn initialize(&mut self, trial: u32);

    fn is_initialized(&self) -> bool;

    /// Starts recording or playing; false when the stream cannot start.
    fn start(&mut self) -> bool;

    /// Stops the stream; false when nothing was running.
    fn stop(&mut self) -> bool;

    fn is_finished(&self) -> bool;

    /// Advances time-driven streams. Streams fed by the engine ignore it.
    fn tick(&mut self, _delta_seconds: f32) {}
}

/// The four concrete playback collaborators a moderator can be bound to.
pub struct PlaybackComponents {
    pub world_recorder: Box<dyn PlaybackSession>,
    pub world_player: Box<dyn PlaybackSession>,
    pub avatar_motion_recorder: Box<dyn PlaybackSession>,
    pub avatar_motion_player: Box<dyn PlaybackSession>,
}

struct BoundStream {
    stream: Box<dyn PlaybackSession>,
    label: &'static str,
}

/// World stream chosen by the playback switch plus the avatar-motion stream
/// chosen by the execution mode. Selected once when the moderator is built.
pub struct PlaybackBindings {
    world: Option<BoundStream>,
    avatar: BoundStream,
}

impl PlaybackBindings {
    pub fn select(
        components: PlaybackComponents,
        playback_type: PlaybackType,
        mode: ExecutionMode,
    ) -> Self {
        let PlaybackComponents {
            world_recorder,
            world_player,
            avatar_motion_recorder,
            avatar_motion_player,
        } = components;

        let world = match playback_type {
            PlaybackType::Off => None,
            PlaybackType::Record => Some(BoundStream {
                stream: world_recorder,
                label: "world playback recording",
            }),
            PlaybackType::Play => Some(BoundStream {
                stream: world_player,
                label: "world playback playing",
            }),
        };

        let avatar = match mode {
            ExecutionMode::Competition => BoundStream {
                stream: avatar_motion_player,
                label: "avatar motion playing",
            },
            ExecutionMode::DataGeneration => BoundStream {
                stream: avatar_motion_recorder,
                label: "avatar motion recording",
            },
        };

        Self { world, avatar }
    }

    pub fn initialize(&mut self, trial: u32) {
        if let Some(world) = self.world.as_mut() {
            world.stream.initialize(trial);
        }
        self.avatar.stream.initialize(trial);
    }

    pub fn is_initialized(&self) -> bool {
        self.world
            .as_ref()
            .map_or(true, |world| world.stream.is_initialized())
            && self.avatar.stream.is_initialized()
    }

    pub fn start(&mut self) {
        if let Some(world) = self.world.as_mut() {
            if !world.stream.start() {
                log::warn!("Cannot start the {}", world.label);
            }
        }
        if !self.avatar.stream.start() {
            log::warn!("Cannot start the {}", self.avatar.label);
        }
    }

    pub fn stop(&mut self) {
        if let Some(world) = self.world.as_mut() {
            if !world.stream.stop() {
                log::warn!("Cannot stop the {}", world.label);
            }
        }
        self.stop_avatar_motion();
    }

    pub fn stop_avatar_motion(&mut self) {
        if !self.avatar.stream.stop() {
            log::warn!("Cannot stop the {}", self.avatar.label);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.world
            .as_ref()
            .map_or(true, |world| world.stream.is_finished())
            && self.avatar.stream.is_finished()
    }

    pub fn tick(&mut self, delta_seconds: f32) {
        if let Some(world) = self.world.as_mut() {
            world.stream.tick(delta_seconds);
        }
        self.avatar.stream.tick(delta_seconds);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimedState {
    Idle,
    Running,
    Finished,
}

/// Clock-driven stand-in for a recorder or player. With a `duration` it plays
/// out on its own; without one it runs until stopped.
#[derive(Debug, Clone)]
pub struct TimedPlayback {
    duration: Option<f32>,
    trial: Option<u32>,
    state: TimedState,
    elapsed: f32,
}

impl TimedPlayback {
    pub fn recorder() -> Self {
        Self::with_duration(None)
    }

    pub fn player(duration_seconds: f32) -> Self {
        Self::with_duration(Some(duration_seconds))
    }

    fn with_duration(duration: Option<f32>) -> Self {
        Self {
            duration,
            trial: None,
            state: TimedState::Idle,
            elapsed: 0.0,
        }
    }

    pub fn trial(&self) -> Option<u32> {
        self.trial
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn is_running(&self) -> bool {
        self.state == TimedState::Running
    }
}

impl PlaybackSession for TimedPlayback {
    fn initialize(&mut self, trial: u32) {
        self.trial = Some(trial);
        self.state = TimedState::Idle;
        self.elapsed = 0.0;
    }

    fn is_initialized(&self) -> bool {
        self.trial.is_some()
    }

    fn start(&mut self) -> bool {
        if self.trial.is_none() || self.state != TimedState::Idle {
            return false;
        }
        self.state = TimedState::Running;
        true
    }

    fn stop(&mut self) -> bool {
        if self.state != TimedState::Running {
            return false;
        }
        self.state = TimedState::Finished;
        true
    }

    fn is_finished(&self) -> bool {
        match self.state {
            TimedState::Finished => true,
            // Never started: nothing to wait for.
            TimedState::Idle => true,
            TimedState::Running => false,
        }
    }

    fn tick(&mut self, delta_seconds: f32) {
        if self.state != TimedState::Running {
            return;
        }
        self.elapsed += delta_seconds;
        if let Some(duration) = self.duration {
            if self.elapsed >= duration {
                self.state = TimedState::Finished;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Calls {
        log: Vec<String>,
    }

    struct Probe {
        name: &'static str,
        calls: Rc<RefCell<Calls>>,
        start_ok: bool,
    }

    impl Probe {
        fn boxed(name: &'static str, calls: &Rc<RefCell<Calls>>) -> Box<dyn PlaybackSession> {
            Box::new(Probe {
                name,
                calls: calls.clone(),
                start_ok: name != "avatar_player",
            })
        }

        fn note(&self, call: &str) {
            self.calls
                .borrow_mut()
                .log
                .push(format!("{}.{call}", self.name));
        }
    }

    impl PlaybackSession for Probe {
        fn initialize(&mut self, trial: u32) {
            self.note(&format!("initialize({trial})"));
        }

        fn is_initialized(&self) -> bool {
            true
        }

        fn start(&mut self) -> bool {
            self.note("start");
            self.start_ok
        }

        fn stop(&mut self) -> bool {
            self.note("stop");
            true
        }

        fn is_finished(&self) -> bool {
            true
        }
    }

    fn components(calls: &Rc<RefCell<Calls>>) -> PlaybackComponents {
        PlaybackComponents {
            world_recorder: Probe::boxed("world_recorder", calls),
            world_player: Probe::boxed("world_player", calls),
            avatar_motion_recorder: Probe::boxed("avatar_recorder", calls),
            avatar_motion_player: Probe::boxed("avatar_player", calls),
        }
    }

    #[test]
    fn competition_with_world_play_binds_players() {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let mut bindings = PlaybackBindings::select(
            components(&calls),
            PlaybackType::Play,
            ExecutionMode::Competition,
        );
        bindings.initialize(2);
        bindings.start();
        assert_eq!(
            calls.borrow().log,
            vec![
                "world_player.initialize(2)",
                "avatar_player.initialize(2)",
                "world_player.start",
                "avatar_player.start",
            ]
        );
    }

    #[test]
    fn data_generation_without_world_stream_only_touches_recorder() {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let mut bindings = PlaybackBindings::select(
            components(&calls),
            PlaybackType::Off,
            ExecutionMode::DataGeneration,
        );
        bindings.initialize(1);
        bindings.stop();
        assert!(bindings.is_initialized());
        assert_eq!(
            calls.borrow().log,
            vec!["avatar_recorder.initialize(1)", "avatar_recorder.stop"]
        );
    }

    #[test]
    fn timed_player_finishes_after_duration() {
        let mut player = TimedPlayback::player(1.0);
        assert!(!player.start(), "cannot start before initialize");
        player.initialize(3);
        assert!(player.start());
        assert!(!player.start());
        player.tick(0.6);
        assert!(!player.is_finished());
        player.tick(0.6);
        assert!(player.is_finished());
        assert!(!player.stop());
    }

    #[test]
    fn timed_recorder_runs_until_stopped() {
        let mut recorder = TimedPlayback::recorder();
        recorder.initialize(1);
        assert!(recorder.start());
        recorder.tick(100.0);
        assert!(!recorder.is_finished());
        assert!(recorder.stop());
        assert!(recorder.is_finished());
    }
}
