use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::environment::Vec3;

/// Role an entity plays in the cleanup task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTag {
    Environment,
    Robot,
    GraspingCandidate,
    DummyGraspingCandidate,
    GraspingCandidatePosition,
    DestinationCandidate,
    #[default]
    Untagged,
}

fn default_active() -> bool {
    true
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

/// One node of the scene tree as described on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneEntity {
    pub name: String,
    #[serde(default)]
    pub tag: EntityTag,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub euler_angles: Vec3,
    #[serde(default = "default_scale")]
    pub local_scale: Vec3,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Entities with a rigidbody start frozen until they settle.
    #[serde(default)]
    pub rigidbody: bool,
    #[serde(default)]
    pub children: Vec<SceneEntity>,
}

impl SceneEntity {
    pub fn new(name: impl Into<String>, tag: EntityTag) -> Self {
        Self {
            name: name.into(),
            tag,
            position: Vec3::ZERO,
            euler_angles: Vec3::ZERO,
            local_scale: Vec3::ONE,
            active: true,
            rigidbody: false,
            children: Vec::new(),
        }
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn scaled(mut self, local_scale: Vec3) -> Self {
        self.local_scale = local_scale;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn with_rigidbody(mut self) -> Self {
        self.rigidbody = true;
        self
    }

    pub fn with_child(mut self, child: SceneEntity) -> Self {
        self.children.push(child);
        self
    }
}

/// Scene description loaded by the host binary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneFile {
    pub entities: Vec<SceneEntity>,
}

impl SceneFile {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read scene file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse scene json: {}", path.display()))
    }

    /// Walks every entity depth-first together with its parent's index in
    /// visit order.
    pub fn walk(&self) -> Vec<(Option<usize>, &SceneEntity)> {
        let mut out = Vec::new();
        for entity in &self.entities {
            push_subtree(entity, None, &mut out);
        }
        out
    }
}

fn push_subtree<'a>(
    entity: &'a SceneEntity,
    parent: Option<usize>,
    out: &mut Vec<(Option<usize>, &'a SceneEntity)>,
) {
    let index = out.len();
    out.push((parent, entity));
    for child in &entity.children {
        push_subtree(child, Some(index), out);
    }
}
