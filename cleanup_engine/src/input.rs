use cleanup_formats::Vec3;
use serde::Serialize;

use crate::registry::ObjectRegistry;
use crate::world::{EntityId, World};

/// Squeeze depth above which a hand's laser pointer is switched on.
pub const LASER_SQUEEZE_THRESHOLD: f32 = 0.95;

/// Largest distance between a candidate and the laser ray that still counts
/// as pointed at.
pub const POINTER_TOLERANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Hand {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn toward(origin: Vec3, target: Vec3) -> Self {
        Self {
            origin,
            direction: target - origin,
        }
    }

    /// Distance from `point` to the ray, or `None` when the point lies behind
    /// the origin.
    pub fn distance_to(&self, point: Vec3) -> Option<f32> {
        let direction = self.direction.normalized()?;
        let offset = point - self.origin;
        let along = offset.dot(direction);
        if along <= 0.0 {
            return None;
        }
        Some((offset - direction.scale(along)).length())
    }
}

/// Controller state for one hand, sampled once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HandInput {
    pub squeeze_axis: f32,
    pub index_pressed: bool,
    pub near_button_pressed: bool,
    pub ray: Option<Ray>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerFrame {
    pub left: HandInput,
    pub right: HandInput,
}

impl ControllerFrame {
    fn hand(&self, hand: Hand) -> &HandInput {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }
}

/// What a laser hit resolved to at the moment of pointing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PointerTarget {
    pub nearest_graspable: Option<EntityId>,
    pub nearest_destination: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarEvent {
    PointByLeft(PointerTarget),
    PointByRight(PointerTarget),
    PressA,
    PressX,
}

#[derive(Debug, Clone, Copy, Default)]
struct HandLatch {
    laser_active: bool,
    index_down: bool,
    near_down: bool,
}

/// Turns raw controller samples into avatar events. Presses fire on the
/// rising edge only.
#[derive(Debug, Clone, Default)]
pub struct AvatarInputRouter {
    left: HandLatch,
    right: HandLatch,
}

impl AvatarInputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_laser_active(&self, hand: Hand) -> bool {
        self.latch(hand).laser_active
    }

    fn latch(&self, hand: Hand) -> &HandLatch {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }

    fn latch_mut(&mut self, hand: Hand) -> &mut HandLatch {
        match hand {
            Hand::Left => &mut self.left,
            Hand::Right => &mut self.right,
        }
    }

    /// Events for this frame, in the order: left point, right point, A, X.
    pub fn route(
        &mut self,
        frame: &ControllerFrame,
        world: &World,
        registry: &ObjectRegistry,
    ) -> Vec<AvatarEvent> {
        let mut events = Vec::new();
        let mut pointed = [None, None];
        let mut near_pressed = [false, false];

        for (slot, hand) in [Hand::Left, Hand::Right].into_iter().enumerate() {
            let input = *frame.hand(hand);
            let latch = self.latch_mut(hand);

            let laser_on = input.squeeze_axis > LASER_SQUEEZE_THRESHOLD;
            if laser_on != latch.laser_active {
                log::debug!(
                    "{hand:?} laser {}",
                    if laser_on { "activated" } else { "deactivated" }
                );
                latch.laser_active = laser_on;
            }

            let index_edge = input.index_pressed && !latch.index_down;
            let near_edge = input.near_button_pressed && !latch.near_down;
            latch.index_down = input.index_pressed;
            latch.near_down = input.near_button_pressed;

            if latch.laser_active && index_edge {
                let target = input
                    .ray
                    .map(|ray| resolve_pointer(world, registry, &ray))
                    .unwrap_or_default();
                log::info!(
                    "selectedTargetName={}",
                    target
                        .nearest_graspable
                        .or(target.nearest_destination)
                        .map(|id| world.label(id))
                        .unwrap_or_default()
                );
                pointed[slot] = Some(target);
            }
            near_pressed[slot] = near_edge;
        }

        if let Some(target) = pointed[0] {
            events.push(AvatarEvent::PointByLeft(target));
        }
        if let Some(target) = pointed[1] {
            events.push(AvatarEvent::PointByRight(target));
        }
        if near_pressed[1] {
            log::info!("Pressed A button");
            events.push(AvatarEvent::PressA);
        }
        if near_pressed[0] {
            log::info!("Pressed X button");
            events.push(AvatarEvent::PressX);
        }
        events
    }
}

/// Nearest graspable and nearest destination candidate along the ray.
pub fn resolve_pointer(world: &World, registry: &ObjectRegistry, ray: &Ray) -> PointerTarget {
    PointerTarget {
        nearest_graspable: nearest_along(world, registry.graspables(), ray),
        nearest_destination: nearest_along(world, registry.destination_candidates(), ray),
    }
}

fn nearest_along(world: &World, candidates: &[EntityId], ray: &Ray) -> Option<EntityId> {
    candidates
        .iter()
        .filter(|id| world.is_active_in_hierarchy(**id))
        .filter_map(|id| {
            let position = world.transform(*id)?.position;
            let distance = ray.distance_to(position)?;
            (distance <= POINTER_TOLERANCE).then_some((*id, distance))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}
