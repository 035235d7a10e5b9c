use std::collections::BTreeSet;

use cleanup_formats::EntityTag;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::SessionError;
use crate::world::{EntityId, World};

/// Grasp targets, decoys, placement slots and destinations of the active
/// environment. Discovered once per moderator and fixed afterwards.
#[derive(Debug, Clone)]
pub struct ObjectRegistry {
    robot: EntityId,
    graspables: Vec<EntityId>,
    placement_slots: Vec<EntityId>,
    destination_candidates: Vec<EntityId>,
}

impl ObjectRegistry {
    pub fn discover(world: &World) -> Result<Self, SessionError> {
        let robot = world
            .find_with_tag(EntityTag::Robot)
            .first()
            .copied()
            .ok_or(SessionError::MissingRobot)?;

        let grasping_candidates = world.find_with_tag(EntityTag::GraspingCandidate);
        if grasping_candidates.is_empty() {
            return Err(SessionError::NoGraspingCandidates);
        }

        let mut graspables = grasping_candidates;
        graspables.extend(world.find_with_tag(EntityTag::DummyGraspingCandidate));
        ensure_unique_names(world, &graspables, "graspable objects")?;
        log::info!("Count of Graspables = {}", graspables.len());

        let placement_slots = world.find_with_tag(EntityTag::GraspingCandidatePosition);
        if graspables.len() > placement_slots.len() {
            return Err(SessionError::InsufficientSlots {
                graspables: graspables.len(),
                slots: placement_slots.len(),
            });
        }
        log::info!(
            "Count of GraspingCandidatesPosition = {}",
            placement_slots.len()
        );

        let destination_candidates = world.find_with_tag(EntityTag::DestinationCandidate);
        if destination_candidates.is_empty() {
            return Err(SessionError::NoDestinationCandidates);
        }
        ensure_unique_names(world, &destination_candidates, "destination candidates")?;
        log::info!("Count of Destinations = {}", destination_candidates.len());

        Ok(Self {
            robot,
            graspables,
            placement_slots,
            destination_candidates,
        })
    }

    pub fn robot(&self) -> EntityId {
        self.robot
    }

    pub fn graspables(&self) -> &[EntityId] {
        &self.graspables
    }

    pub fn placement_slots(&self) -> &[EntityId] {
        &self.placement_slots
    }

    pub fn destination_candidates(&self) -> &[EntityId] {
        &self.destination_candidates
    }

    pub fn graspable_named(&self, world: &World, name: &str) -> Option<EntityId> {
        self.graspables
            .iter()
            .copied()
            .find(|id| world.name(*id) == Some(name))
    }

    pub fn destination_named(&self, world: &World, name: &str) -> Option<EntityId> {
        self.destination_candidates
            .iter()
            .copied()
            .find(|id| world.name(*id) == Some(name))
    }

    pub fn is_grasping_candidate(&self, world: &World, target: EntityId) -> bool {
        if self.graspables.contains(&target) {
            log::info!("Grasping target is {}", world.label(target));
            true
        } else {
            log::warn!("It is NOT a graspable object. name={}", world.label(target));
            false
        }
    }

    pub fn is_destination_candidate(&self, world: &World, destination: EntityId) -> bool {
        if self.destination_candidates.contains(&destination) {
            log::info!("Destination is {}", world.label(destination));
            true
        } else {
            log::warn!(
                "It is NOT a destination candidate. name={}",
                world.label(destination)
            );
            false
        }
    }

    pub fn deactivate_placement_slots(&self, world: &mut World) {
        for slot in &self.placement_slots {
            world.set_active(*slot, false);
        }
    }

    /// Independently permutes the graspable list and the slot list so that
    /// zipping them by index yields a random layout.
    pub fn shuffle_placements<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.graspables.shuffle(rng);
        self.placement_slots.shuffle(rng);
    }
}

pub(crate) fn ensure_unique_names(
    world: &World,
    ids: &[EntityId],
    kind: &'static str,
) -> Result<(), SessionError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        let name = world.label(*id);
        if !seen.insert(name.clone()) {
            return Err(SessionError::DuplicateName { kind, name });
        }
    }
    Ok(())
}
