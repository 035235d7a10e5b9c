use cleanup_formats::SnapshotError;
use thiserror::Error;

/// Failures that abort session setup or a trial initialization.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no environment candidates were supplied")]
    NoEnvironments,
    #[error("there is a name conflict among environments. name={0}")]
    DuplicateEnvironment(String),
    #[error("environment not found among the candidates. name={0}")]
    UnknownEnvironment(String),
    #[error("there is a name conflict among {kind}. name={name}")]
    DuplicateName { kind: &'static str, name: String },
    #[error("count of grasping candidates is zero")]
    NoGraspingCandidates,
    #[error("count of destination candidates is zero")]
    NoDestinationCandidates,
    #[error("{graspables} graspables but only {slots} grasping candidate positions")]
    InsufficientSlots { graspables: usize, slots: usize },
    #[error("no robot found in the active environment")]
    MissingRobot,
    #[error("{kind} not found. name={name}")]
    UnknownObject { kind: &'static str, name: String },
    #[error("grasping target has not been selected yet")]
    TargetNotSelected,
    #[error("destination has not been selected yet")]
    DestinationNotSelected,
    #[error("environment info is only saved in data generation mode")]
    NotInDataGeneration,
    #[error("snapshot writer has shut down")]
    WriterDisconnected,
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
