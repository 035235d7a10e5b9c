use std::convert::TryFrom;
use std::rc::Rc;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::config::SessionLedger;

pub const MAX_SCORE: i32 = 999;
pub const MIN_SCORE: i32 = -999;

const DEFAULT_TIME_SCALE: f32 = 1.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoreError {
    #[error("illegal score type. type={0}")]
    UnknownKind(String),
}

/// Discrete session events that carry a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    ObjectGraspedSuccess,
    ObjectGraspedFailure,
    CleanupSuccess,
    CleanupFailure,
    AskedCorrectOrNot,
    PointItAgain,
    HsrCollisionEnter,
    ObjectCollisionEnter,
}

impl ScoreKind {
    pub const ALL: [ScoreKind; 8] = [
        ScoreKind::ObjectGraspedSuccess,
        ScoreKind::ObjectGraspedFailure,
        ScoreKind::CleanupSuccess,
        ScoreKind::CleanupFailure,
        ScoreKind::AskedCorrectOrNot,
        ScoreKind::PointItAgain,
        ScoreKind::HsrCollisionEnter,
        ScoreKind::ObjectCollisionEnter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScoreKind::ObjectGraspedSuccess => "object_grasped_success",
            ScoreKind::ObjectGraspedFailure => "object_grasped_failure",
            ScoreKind::CleanupSuccess => "cleanup_success",
            ScoreKind::CleanupFailure => "cleanup_failure",
            ScoreKind::AskedCorrectOrNot => "asked_correct_or_not",
            ScoreKind::PointItAgain => "point_it_again",
            ScoreKind::HsrCollisionEnter => "hsr_collision_enter",
            ScoreKind::ObjectCollisionEnter => "object_collision_enter",
        }
    }
}

impl FromStr for ScoreKind {
    type Err = ScoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ScoreKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| ScoreError::UnknownKind(value.to_string()))
    }
}

impl TryFrom<u8> for ScoreKind {
    type Error = ScoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        ScoreKind::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| ScoreError::UnknownKind(code.to_string()))
    }
}

/// Score delta for one event. Collision kinds stay at zero; velocity-scaled
/// collision penalties are not applied.
pub fn score_for(kind: ScoreKind) -> i32 {
    match kind {
        ScoreKind::ObjectGraspedSuccess => 50,
        ScoreKind::ObjectGraspedFailure => -10,
        ScoreKind::CleanupSuccess => 50,
        ScoreKind::CleanupFailure => -10,
        ScoreKind::AskedCorrectOrNot => -10,
        ScoreKind::PointItAgain => -10,
        ScoreKind::HsrCollisionEnter => 0,
        ScoreKind::ObjectCollisionEnter => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreStatus {
    pub delta: i32,
    pub score: i32,
    pub total: i64,
}

pub trait ScoreHandler {
    fn on_score_change(&self, status: &ScoreStatus);
}

pub trait TimeIsUpHandler {
    fn on_time_is_up(&self);
}

/// Score and countdown display.
pub trait PanelHandler {
    fn show_score(&self, score: i32);
    fn show_score_and_total(&self, score: i32, total: i64);
    fn show_time_left(&self, seconds: f32);
}

/// Trial score, countdown and simulation time scale.
pub struct ScoreManager {
    time_limit: f32,
    time_left: f32,
    time_up_sent: bool,
    score: i32,
    time_scale: f32,
    score_handlers: Vec<Rc<dyn ScoreHandler>>,
    time_up_handlers: Vec<Rc<dyn TimeIsUpHandler>>,
    panel: Option<Rc<dyn PanelHandler>>,
}

impl ScoreManager {
    /// A zero limit is raised to one second so time-up cannot fire before
    /// the task starts.
    pub fn new(time_limit_seconds: u32) -> Self {
        if time_limit_seconds == 0 {
            log::warn!("Time limit must be positive; using 1 second");
        }
        let time_limit = time_limit_seconds.max(1) as f32;
        Self {
            time_limit,
            time_left: time_limit,
            time_up_sent: false,
            score: 0,
            time_scale: 0.0,
            score_handlers: Vec::new(),
            time_up_handlers: Vec::new(),
            panel: None,
        }
    }

    pub fn add_score_handler(&mut self, handler: Rc<dyn ScoreHandler>) {
        self.score_handlers.push(handler);
    }

    pub fn add_time_up_handler(&mut self, handler: Rc<dyn TimeIsUpHandler>) {
        self.time_up_handlers.push(handler);
    }

    pub fn set_panel(&mut self, panel: Rc<dyn PanelHandler>) {
        self.panel = Some(panel);
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn time_left(&self) -> f32 {
        self.time_left
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn is_time_running(&self) -> bool {
        self.time_scale > 0.0
    }

    /// Prepares a new trial: zero score, full countdown, frozen clock.
    pub fn start(&mut self, ledger: &SessionLedger) {
        if let Some(panel) = &self.panel {
            panel.show_score_and_total(0, ledger.total_score());
        }
        self.score = 0;
        self.reset_time_left();
        self.time_scale = 0.0;
    }

    pub fn add_score(&mut self, kind: ScoreKind, ledger: &SessionLedger) -> ScoreStatus {
        let delta = score_for(kind);
        self.score = (self.score + delta).clamp(MIN_SCORE, MAX_SCORE);

        if let Some(panel) = &self.panel {
            panel.show_score(self.score);
        }
        log::info!(
            "Score add [{delta}] ({}), Challenge {} Score={}",
            kind.as_str(),
            ledger.number_of_trials(),
            self.score
        );

        let status = ScoreStatus {
            delta,
            score: self.score,
            total: ledger.total_score(),
        };
        for handler in &self.score_handlers {
            handler.on_score_change(&status);
        }
        status
    }

    pub fn on_robot_collision_enter(&mut self, ledger: &SessionLedger) -> ScoreStatus {
        self.add_score(ScoreKind::HsrCollisionEnter, ledger)
    }

    pub fn on_object_collision_enter(&mut self, ledger: &SessionLedger) -> ScoreStatus {
        self.add_score(ScoreKind::ObjectCollisionEnter, ledger)
    }

    pub fn task_start(&mut self) {
        if let Some(panel) = &self.panel {
            panel.show_score(self.score);
        }
        self.time_scale = DEFAULT_TIME_SCALE;
    }

    /// Freezes the clock and folds the trial score into the persisted total.
    pub fn task_end(&mut self, ledger: &mut SessionLedger) -> anyhow::Result<()> {
        self.time_scale = 0.0;
        ledger.add_score(self.score);
        if let Some(panel) = &self.panel {
            panel.show_score_and_total(self.score, ledger.total_score());
        }
        log::info!("Total Score={}", ledger.total_score());
        ledger.record_score_in_file()
    }

    pub fn reset_time_left(&mut self) {
        self.time_left = self.time_limit;
        self.time_up_sent = false;
        if let Some(panel) = &self.panel {
            panel.show_time_left(self.time_left);
        }
    }

    /// Counts down by frame time scaled by the simulation time scale, so a
    /// frozen clock does not consume the limit. Returns true on the tick the
    /// countdown reaches zero.
    pub fn tick(&mut self, delta_seconds: f32) -> bool {
        self.time_left = (self.time_left - delta_seconds * self.time_scale).max(0.0);
        if let Some(panel) = &self.panel {
            panel.show_time_left(self.time_left);
        }

        if self.time_left == 0.0 && !self.time_up_sent {
            self.time_up_sent = true;
            for handler in &self.time_up_handlers {
                handler.on_time_is_up();
            }
            return true;
        }
        false
    }
}
