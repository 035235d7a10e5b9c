//! Data formats shared by the cleanup session host.
//!
//! Environment snapshots are the only files that cross between the two
//! execution modes: data generation writes them, competition replays them.

pub mod environment;
pub mod scene;
pub mod script;

pub use environment::{
    EnvironmentInfo, RelocatableObjectInfo, SnapshotError, Vec3, read_snapshot, snapshot_path,
    write_snapshot,
};
pub use scene::{EntityTag, SceneEntity, SceneFile};
pub use script::{ScriptAction, ScriptEntry, ScriptHand, TrialScript};
