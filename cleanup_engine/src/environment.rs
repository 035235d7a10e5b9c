use std::collections::BTreeSet;

use cleanup_formats::{EnvironmentInfo, RelocatableObjectInfo, Vec3};
use rand::Rng;

use crate::error::SessionError;
use crate::world::{EntityId, World};

/// Fraction of a slot's vertical scale that sits below its pivot; graspables
/// are lowered by this much so they rest on the slot surface.
pub const SLOT_SURFACE_RATIO: f32 = 0.49;

/// Ordered one-to-one pairing between a placement record and the entity it
/// describes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionsMap {
    entries: Vec<(RelocatableObjectInfo, EntityId)>,
}

impl PositionsMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, info: RelocatableObjectInfo, entity: EntityId) {
        self.entries.push((info, entity));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &(RelocatableObjectInfo, EntityId)> {
        self.entries.iter()
    }

    pub fn entity_for(&self, name: &str) -> Option<EntityId> {
        self.entries
            .iter()
            .find(|(info, _)| info.name == name)
            .map(|(_, entity)| *entity)
    }

    pub fn info_for(&self, entity: EntityId) -> Option<&RelocatableObjectInfo> {
        self.entries
            .iter()
            .find(|(_, candidate)| *candidate == entity)
            .map(|(info, _)| info)
    }

    /// Moves every mapped entity to its recorded pose.
    pub fn apply(&self, world: &mut World) {
        for (info, entity) in &self.entries {
            world.set_pose(*entity, info.position, info.euler_angles);
        }
    }

    /// Snapshot records named after the mapped entities.
    pub fn to_records(&self, world: &World) -> Vec<RelocatableObjectInfo> {
        self.entries
            .iter()
            .map(|(info, entity)| RelocatableObjectInfo {
                name: world.label(*entity),
                position: info.position,
                euler_angles: info.euler_angles,
            })
            .collect()
    }
}

/// Fails when two candidate environments share a name.
pub fn ensure_unique_environments(
    world: &World,
    environments: &[EntityId],
) -> Result<(), SessionError> {
    if environments.is_empty() {
        return Err(SessionError::NoEnvironments);
    }
    let mut seen = BTreeSet::new();
    for environment in environments {
        let name = world.label(*environment);
        if !seen.insert(name.clone()) {
            return Err(SessionError::DuplicateEnvironment(name));
        }
    }
    Ok(())
}

/// First candidate that is already active, if any.
pub fn active_environment(world: &World, environments: &[EntityId]) -> Option<EntityId> {
    environments
        .iter()
        .copied()
        .find(|environment| world.is_active_self(*environment))
}

pub fn random_environment<R: Rng + ?Sized>(
    environments: &[EntityId],
    rng: &mut R,
) -> Option<EntityId> {
    if environments.is_empty() {
        return None;
    }
    Some(environments[rng.random_range(0..environments.len())])
}

/// Activates the environment called `name` and deactivates every other one.
pub fn activate_only(
    world: &mut World,
    environments: &[EntityId],
    name: &str,
) -> Result<EntityId, SessionError> {
    let chosen = environments
        .iter()
        .copied()
        .find(|environment| world.name(*environment) == Some(name))
        .ok_or_else(|| SessionError::UnknownEnvironment(name.to_string()))?;
    for environment in environments {
        world.set_active(*environment, *environment == chosen);
    }
    Ok(chosen)
}

/// Rebuilds a map from snapshot records; every record must name a candidate.
pub fn positions_from_records(
    world: &World,
    candidates: &[EntityId],
    records: &[RelocatableObjectInfo],
    kind: &'static str,
) -> Result<PositionsMap, SessionError> {
    let mut map = PositionsMap::new();
    for record in records {
        let entity = candidates
            .iter()
            .copied()
            .find(|id| world.name(*id) == Some(record.name.as_str()))
            .ok_or_else(|| SessionError::UnknownObject {
                kind,
                name: record.name.clone(),
            })?;
        map.insert(record.clone(), entity);
    }
    Ok(map)
}

/// Pairs graspables with slots by index. Callers shuffle both lists first.
pub fn positions_on_slots(
    world: &World,
    graspables: &[EntityId],
    slots: &[EntityId],
) -> PositionsMap {
    let mut map = PositionsMap::new();
    for (graspable, slot) in graspables.iter().zip(slots.iter()) {
        let slot_transform = world.transform(*slot).unwrap_or_default();
        let lowered = slot_transform.position
            - Vec3::new(
                0.0,
                slot_transform.local_scale.y * SLOT_SURFACE_RATIO,
                0.0,
            );
        map.insert(
            RelocatableObjectInfo {
                name: world.label(*graspable),
                position: lowered,
                euler_angles: slot_transform.euler_angles,
            },
            *graspable,
        );
    }
    map
}

/// Maps each entity onto its current pose.
pub fn positions_in_place(world: &World, entities: &[EntityId]) -> PositionsMap {
    let mut map = PositionsMap::new();
    for entity in entities {
        let transform = world.transform(*entity).unwrap_or_default();
        map.insert(
            RelocatableObjectInfo {
                name: world.label(*entity),
                position: transform.position,
                euler_angles: transform.euler_angles,
            },
            *entity,
        );
    }
    map
}

/// Snapshot of the current layout as written for replay.
pub fn layout_snapshot(
    world: &World,
    environment_name: &str,
    grasping_target: EntityId,
    destination: EntityId,
    graspables: &PositionsMap,
    destinations: &PositionsMap,
) -> EnvironmentInfo {
    EnvironmentInfo {
        environment_name: environment_name.to_string(),
        grasping_target_name: world.label(grasping_target),
        destination_name: world.label(destination),
        graspables_positions: graspables.to_records(world),
        destinations_positions: destinations.to_records(world),
    }
}
