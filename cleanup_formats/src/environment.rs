use std::fs;
use std::ops::{Add, Sub};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name pattern for per-trial environment snapshots.
pub const ENVIRONMENT_INFO_PREFIX: &str = "EnvironmentInfo";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const ONE: Vec3 = Vec3 {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Vec3) -> f32 {
        (self - other).length()
    }

    pub fn scale(self, factor: f32) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn normalized(self) -> Option<Vec3> {
        let length = self.length();
        if length <= f32::EPSILON {
            return None;
        }
        Some(self.scale(1.0 / length))
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Where one object instance has to be placed for a trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelocatableObjectInfo {
    pub name: String,
    pub position: Vec3,
    pub euler_angles: Vec3,
}

/// Full layout of one environment for one trial.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    pub environment_name: String,
    #[serde(default)]
    pub grasping_target_name: String,
    #[serde(default)]
    pub destination_name: String,
    #[serde(default)]
    pub graspables_positions: Vec<RelocatableObjectInfo>,
    #[serde(default)]
    pub destinations_positions: Vec<RelocatableObjectInfo>,
}

impl EnvironmentInfo {
    /// Layout that only names the environment; the object placement is
    /// generated later.
    pub fn named(environment_name: impl Into<String>) -> Self {
        Self {
            environment_name: environment_name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("environment info file does not exist. path={0}")]
    Missing(PathBuf),
    #[error("failed to read environment info {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse environment info {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize environment info: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write environment info {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Path of the snapshot for `trial` inside `dir` (two-digit trial number).
pub fn snapshot_path(dir: &Path, trial: u32) -> PathBuf {
    dir.join(format!("{ENVIRONMENT_INFO_PREFIX}{trial:02}.json"))
}

pub fn read_snapshot(path: &Path) -> Result<EnvironmentInfo, SnapshotError> {
    if !path.is_file() {
        return Err(SnapshotError::Missing(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path).map_err(|source| SnapshotError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| SnapshotError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_snapshot(path: &Path, info: &EnvironmentInfo) -> Result<(), SnapshotError> {
    let mut json = serde_json::to_string_pretty(info).map_err(SnapshotError::Serialize)?;
    json.push('\n');
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|source| SnapshotError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }
    fs::write(path, json).map_err(|source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    })
}
