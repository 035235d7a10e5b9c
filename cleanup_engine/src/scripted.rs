use cleanup_formats::{ScriptAction, ScriptHand, TrialScript, Vec3};

use crate::input::{ControllerFrame, HandInput, Ray};
use crate::session::CleanupSession;
use crate::world::EntityId;

/// Eye height the scripted avatar points from.
pub const AVATAR_EYE: Vec3 = Vec3::new(0.0, 1.5, 0.0);

/// Clearance between a placed object and the pivot of what it is placed on.
const PLACE_CLEARANCE: f32 = 0.05;

/// Feeds a trial script into a session in place of a VR user, a robot
/// controller and a physics engine. Frames restart at zero every trial.
#[derive(Debug, Clone)]
pub struct ScriptedHost {
    script: TrialScript,
    trial: u32,
    frame: u32,
}

impl ScriptedHost {
    pub fn new(script: TrialScript) -> Self {
        Self {
            script,
            trial: 0,
            frame: 0,
        }
    }

    /// Frame index within the current trial.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Applies this frame's scripted actions, then lets free rigidbodies
    /// come to rest. Call once before every `tick`.
    pub fn step(&mut self, session: &mut CleanupSession) {
        if session.trial() != self.trial {
            self.trial = session.trial();
            self.frame = 0;
        }

        let actions: Vec<ScriptAction> = self.script.actions_at(self.frame).cloned().collect();
        for action in &actions {
            apply_action(session, action);
        }
        settle_free_bodies(session);
        self.frame += 1;
    }
}

fn lookup(session: &CleanupSession, name: &str) -> Option<EntityId> {
    let found = session.world().find_by_name(name);
    if found.is_none() {
        log::warn!("Scripted entity not found. name={name}");
    }
    found
}

fn press(session: &mut CleanupSession, frame: ControllerFrame) {
    session.handle_controller_frame(&ControllerFrame::default());
    session.handle_controller_frame(&frame);
}

pub fn apply_action(session: &mut CleanupSession, action: &ScriptAction) {
    match action {
        ScriptAction::Point { hand, target } => {
            let Some(target) = lookup(session, target) else {
                return;
            };
            let Some(transform) = session.world().transform(target) else {
                return;
            };
            let input = HandInput {
                squeeze_axis: 1.0,
                index_pressed: true,
                near_button_pressed: false,
                ray: Some(Ray::toward(AVATAR_EYE, transform.position)),
            };
            let frame = match hand {
                ScriptHand::Left => ControllerFrame {
                    left: input,
                    ..ControllerFrame::default()
                },
                ScriptHand::Right => ControllerFrame {
                    right: input,
                    ..ControllerFrame::default()
                },
            };
            press(session, frame);
        }
        ScriptAction::PressA => press(
            session,
            ControllerFrame {
                right: near_button(),
                ..ControllerFrame::default()
            },
        ),
        ScriptAction::PressX => press(
            session,
            ControllerFrame {
                left: near_button(),
                ..ControllerFrame::default()
            },
        ),
        ScriptAction::Robot { message } => session.receive_robot_message(message),
        ScriptAction::Grasp { object } => {
            let Some(robot) = session.moderator().map(|moderator| moderator.robot()) else {
                return;
            };
            let Some(object) = lookup(session, object) else {
                return;
            };
            let world = session.world_mut();
            world.set_parent(object, Some(robot));
            world.set_sleeping(object, false);
        }
        ScriptAction::Place { object, on } => {
            let (Some(object), Some(support)) = (lookup(session, object), lookup(session, on))
            else {
                return;
            };
            let world = session.world_mut();
            let Some(support_pose) = world.transform(support) else {
                return;
            };
            let euler_angles = world
                .transform(object)
                .map(|pose| pose.euler_angles)
                .unwrap_or(Vec3::ZERO);
            world.set_parent(object, None);
            world.set_pose(
                object,
                support_pose.position + Vec3::new(0.0, PLACE_CLEARANCE, 0.0),
                euler_angles,
            );
        }
    }
}

fn near_button() -> HandInput {
    HandInput {
        near_button_pressed: true,
        ..HandInput::default()
    }
}

/// Anything with a rigidbody that the robot is not carrying falls asleep.
fn settle_free_bodies(session: &mut CleanupSession) {
    let Some(robot) = session.moderator().map(|moderator| moderator.robot()) else {
        return;
    };
    let bodies: Vec<EntityId> = session
        .moderator()
        .map(|moderator| moderator.graspables().to_vec())
        .unwrap_or_default();
    let world = session.world_mut();
    for body in bodies {
        if world.rigidbody(body).is_some() {
            let held = world.root_of(body) == world.root_of(robot);
            world.set_sleeping(body, !held);
        }
    }
}
