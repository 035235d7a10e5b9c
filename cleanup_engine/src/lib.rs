//! Moderator, score engine and session driver for the Interactive Cleanup
//! task: an avatar points out an object and a destination, the robot has to
//! carry one to the other, and the moderator judges and scores the result.
//!
//! The engine layers (physics, VR input, robot bridge, panels) stay outside
//! the crate; they reach the session through the [`world::World`] scene model
//! and the traits in [`deployment`], [`playback`] and [`score`].

pub mod config;
pub mod deployment;
pub mod environment;
pub mod error;
pub mod input;
pub mod mode;
pub mod moderator;
pub mod playback;
pub mod registry;
pub mod score;
pub mod scripted;
pub mod session;
pub mod strategy;
pub mod world;
pub mod writer;

pub use config::{CleanupConfig, ConfigError, SensorRates, SessionLedger};
pub use error::SessionError;
pub use mode::{ExecutionMode, PlaybackType};
pub use moderator::{ModeratorCollaborators, ModeratorStep, ModeratorTool, SessionFlags};
pub use session::{
    CleanupSession, CollaboratorFactory, ModeratorMessage, ReferenceCollaborators, RobotMessage,
    RunReport, TrialReport,
};
pub use world::{EntityId, World};
