use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptHand {
    Left,
    Right,
}

/// Something the scripted avatar, robot or physics layer does on a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    /// Aim the laser of `hand` at the named entity and pull the trigger.
    Point { hand: ScriptHand, target: String },
    PressA,
    PressX,
    /// Raw text from the robot side of the message bridge.
    Robot { message: String },
    /// The robot picks the named object up.
    Grasp { object: String },
    /// The robot releases the named object on top of another entity.
    Place { object: String, on: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub frame: u32,
    #[serde(flatten)]
    pub action: ScriptAction,
}

/// Frame-indexed list of scripted inputs; frames count from the start of
/// each trial.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrialScript {
    pub entries: Vec<ScriptEntry>,
}

impl TrialScript {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read trial script: {}", path.display()))?;
        let mut script: TrialScript = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse trial script json: {}", path.display()))?;
        script.entries.sort_by_key(|entry| entry.frame);
        Ok(script)
    }

    pub fn actions_at(&self, frame: u32) -> impl Iterator<Item = &ScriptAction> {
        self.entries
            .iter()
            .filter(move |entry| entry.frame == frame)
            .map(|entry| &entry.action)
    }

    pub fn last_frame(&self) -> Option<u32> {
        self.entries.iter().map(|entry| entry.frame).max()
    }
}
