use std::task::Poll;

use cleanup_formats::EntityTag;
use serde::Serialize;

use crate::world::{EntityId, World};

/// Outcome of placing the grasping target at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    #[default]
    Unknown,
    Succeeded,
    Failed,
}

impl DeploymentState {
    pub fn from_outcome(succeeded: bool) -> Self {
        if succeeded {
            DeploymentState::Succeeded
        } else {
            DeploymentState::Failed
        }
    }

    pub fn is_finished(self) -> bool {
        self != DeploymentState::Unknown
    }

    pub fn is_succeeded(self) -> bool {
        self == DeploymentState::Succeeded
    }
}

/// Decides whether the target rests in contact with the destination. Polled
/// once per tick until it returns `Ready`; keeps state between polls, so it
/// must be reset before the next check.
pub trait ContactDetector {
    fn poll_contact(&mut self, world: &World, target: EntityId, destination: EntityId)
        -> Poll<bool>;

    fn reset(&mut self);
}

/// Reports what the robot's gripper currently holds.
pub trait GraspingDetector {
    fn grasped_object(&self, world: &World, robot: EntityId) -> Option<EntityId>;
}

/// In-flight deployment check. The moderator owns it and resumes it from the
/// driver's tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentCheck {
    target: EntityId,
    destination: EntityId,
    robot: EntityId,
}

impl DeploymentCheck {
    pub fn new(target: EntityId, destination: EntityId, robot: EntityId) -> Self {
        Self {
            target,
            destination,
            robot,
        }
    }

    pub fn poll(&self, world: &World, detector: &mut dyn ContactDetector) -> Poll<DeploymentState> {
        if world.root_of(self.target) == world.root_of(self.robot) {
            log::info!("Target deployment failed: HSR has the grasping target.");
            detector.reset();
            return Poll::Ready(DeploymentState::Failed);
        }

        match detector.poll_contact(world, self.target, self.destination) {
            Poll::Ready(in_contact) => {
                detector.reset();
                Poll::Ready(DeploymentState::from_outcome(in_contact))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    /// Abandons the check; the detector forgets any partial progress.
    pub fn cancel(self, detector: &mut dyn ContactDetector) {
        detector.reset();
    }
}

/// Treats any graspable sharing the robot's hierarchy root as held.
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyGraspingDetector;

impl GraspingDetector for HierarchyGraspingDetector {
    fn grasped_object(&self, world: &World, robot: EntityId) -> Option<EntityId> {
        let robot_root = world.root_of(robot);
        [EntityTag::GraspingCandidate, EntityTag::DummyGraspingCandidate]
            .into_iter()
            .flat_map(|tag| world.find_with_tag(tag))
            .find(|candidate| *candidate != robot && world.root_of(*candidate) == robot_root)
    }
}

/// Contact by proximity: after `settle_frames` polls the target counts as
/// resting on the destination when its position lies within
/// `horizontal_tolerance` of the destination pivot and no more than
/// `vertical_tolerance` above it.
#[derive(Debug, Clone)]
pub struct ProximityContactDetector {
    horizontal_tolerance: f32,
    vertical_tolerance: f32,
    settle_frames: u32,
    frames_waited: u32,
}

impl ProximityContactDetector {
    pub fn new(horizontal_tolerance: f32, vertical_tolerance: f32, settle_frames: u32) -> Self {
        Self {
            horizontal_tolerance,
            vertical_tolerance,
            settle_frames,
            frames_waited: 0,
        }
    }

    pub fn frames_waited(&self) -> u32 {
        self.frames_waited
    }

    fn in_contact(&self, world: &World, target: EntityId, destination: EntityId) -> bool {
        let (Some(target_pose), Some(destination_pose)) =
            (world.transform(target), world.transform(destination))
        else {
            return false;
        };
        let offset = target_pose.position - destination_pose.position;
        let horizontal = (offset.x * offset.x + offset.z * offset.z).sqrt();
        horizontal <= self.horizontal_tolerance
            && offset.y >= -f32::EPSILON
            && offset.y <= self.vertical_tolerance
    }
}

impl Default for ProximityContactDetector {
    fn default() -> Self {
        Self::new(0.3, 0.5, 30)
    }
}

impl ContactDetector for ProximityContactDetector {
    fn poll_contact(
        &mut self,
        world: &World,
        target: EntityId,
        destination: EntityId,
    ) -> Poll<bool> {
        self.frames_waited += 1;
        if self.frames_waited < self.settle_frames {
            return Poll::Pending;
        }
        Poll::Ready(self.in_contact(world, target, destination))
    }

    fn reset(&mut self) {
        self.frames_waited = 0;
    }
}

/// Waits for a rigidbody to fall asleep, then frees its constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleWatch {
    body: EntityId,
}

impl SettleWatch {
    pub fn new(body: EntityId) -> Self {
        Self { body }
    }

    pub fn body(&self) -> EntityId {
        self.body
    }

    pub fn poll(&self, world: &mut World) -> Poll<()> {
        match world.rigidbody(self.body) {
            Some(state) if !state.sleeping => Poll::Pending,
            Some(_) => {
                world.release_constraints(self.body);
                Poll::Ready(())
            }
            None => Poll::Ready(()),
        }
    }
}
