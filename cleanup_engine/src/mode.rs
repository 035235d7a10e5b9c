use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    #[error("illegal execution mode. mode={0}")]
    InvalidExecutionMode(String),
    #[error("illegal playback type. type={0}")]
    InvalidPlaybackType(String),
}

/// Config values arrive either as the legacy integer code or as a name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SwitchValue {
    Int(i64),
    Name(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(try_from = "SwitchValue", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Replays generated data.
    Competition,
    /// A live VR user generates environment and motion data.
    DataGeneration,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Competition => "competition",
            ExecutionMode::DataGeneration => "data_generation",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i64> for ExecutionMode {
    type Error = ModeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ExecutionMode::Competition),
            1 => Ok(ExecutionMode::DataGeneration),
            other => Err(ModeError::InvalidExecutionMode(other.to_string())),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = ModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "competition" | "0" => Ok(ExecutionMode::Competition),
            "data_generation" | "datageneration" | "1" => Ok(ExecutionMode::DataGeneration),
            _ => Err(ModeError::InvalidExecutionMode(value.to_string())),
        }
    }
}

impl TryFrom<SwitchValue> for ExecutionMode {
    type Error = ModeError;

    fn try_from(value: SwitchValue) -> Result<Self, Self::Error> {
        match value {
            SwitchValue::Int(code) => ExecutionMode::try_from(code),
            SwitchValue::Name(name) => name.parse(),
        }
    }
}

/// Global switch for the world playback stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "SwitchValue", rename_all = "snake_case")]
pub enum PlaybackType {
    #[default]
    Off,
    Record,
    Play,
}

impl TryFrom<i64> for PlaybackType {
    type Error = ModeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PlaybackType::Off),
            1 => Ok(PlaybackType::Record),
            2 => Ok(PlaybackType::Play),
            other => Err(ModeError::InvalidPlaybackType(other.to_string())),
        }
    }
}

impl FromStr for PlaybackType {
    type Err = ModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "0" => Ok(PlaybackType::Off),
            "record" | "1" => Ok(PlaybackType::Record),
            "play" | "2" => Ok(PlaybackType::Play),
            _ => Err(ModeError::InvalidPlaybackType(value.to_string())),
        }
    }
}

impl TryFrom<SwitchValue> for PlaybackType {
    type Error = ModeError;

    fn try_from(value: SwitchValue) -> Result<Self, Self::Error> {
        match value {
            SwitchValue::Int(code) => PlaybackType::try_from(code),
            SwitchValue::Name(name) => name.parse(),
        }
    }
}
