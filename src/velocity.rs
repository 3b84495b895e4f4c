//! Body velocity and momentum.

use bevy::prelude::*;

use crate::backend::BodyPhysicsBackend;
use crate::config::{GRAVITY_PUSH, MOMENTUM_MIN_SPEED};
use crate::fall::start_fall;
use crate::state::BodyPhysics;
use crate::systems::{with_body, BodyFrame};
use crate::volumes::toggle_physics;

/// Velocity change carried over from play area movement.
///
/// The play area velocity is divided by the speed of `body_velocity`, the
/// velocity just given to the body, clamped to at least [`MOMENTUM_MIN_SPEED`].
pub fn momentum(play_area_velocity: Vec3, body_velocity: Vec3) -> Vec3 {
    play_area_velocity / body_velocity.length().max(MOMENTUM_MIN_SPEED)
}

pub(crate) fn apply_velocity<B: BodyPhysicsBackend>(
    world: &mut World,
    frame: &mut BodyFrame,
    velocity: Vec3,
    force_physics_on: bool,
    apply_momentum: bool,
) {
    if frame.config.enable_body_collisions && force_physics_on {
        toggle_physics::<B>(world, &mut frame.body, true);
    }
    if !frame.body.physics_enabled() {
        return;
    }

    let play_area = frame.pose.play_area;
    let body_velocity = velocity + Vec3::new(0.0, GRAVITY_PUSH, 0.0);
    B::set_velocity(world, play_area, body_velocity);
    if apply_momentum {
        let change = momentum(frame.body.play_area_velocity, body_velocity);
        B::apply_velocity_change(world, play_area, change);
    }

    let target = frame.body.floor.current_valid_floor;
    start_fall::<B>(world, frame, target);
}

/// Apply a velocity to the body.
///
/// Only takes effect while physics drives the body. `force_physics_on` turns
/// physics on first when body collisions are enabled; `apply_momentum` adds
/// the play area's own movement. Every applied velocity carries a small
/// downward push and starts a fall towards the current floor.
pub fn apply_body_velocity<B: BodyPhysicsBackend>(
    world: &mut World,
    body: Entity,
    velocity: Vec3,
    force_physics_on: bool,
    apply_momentum: bool,
) {
    with_body(world, body, |world, frame| {
        apply_velocity::<B>(world, frame, velocity, force_physics_on, apply_momentum);
    });
}

/// Zero the body's linear and angular velocity.
pub fn reset_velocities<B: BodyPhysicsBackend>(world: &mut World, body: Entity) {
    with_body(world, body, |world, frame| {
        B::set_velocity(world, frame.pose.play_area, Vec3::ZERO);
        B::set_angular_velocity(world, frame.pose.play_area, Vec3::ZERO);
    });
}

/// Current linear velocity of the body, zero while it is inactive.
pub fn body_velocity<B: BodyPhysicsBackend>(world: &World, body: Entity) -> Vec3 {
    physics_body(world, body)
        .map(|play_area| B::get_velocity(world, play_area))
        .unwrap_or(Vec3::ZERO)
}

/// Current angular velocity of the body, zero while it is inactive.
pub fn body_angular_velocity<B: BodyPhysicsBackend>(world: &World, body: Entity) -> Vec3 {
    physics_body(world, body)
        .map(|play_area| B::get_angular_velocity(world, play_area))
        .unwrap_or(Vec3::ZERO)
}

fn physics_body(world: &World, body: Entity) -> Option<Entity> {
    world
        .get::<BodyPhysics>(body)
        .filter(|b| b.is_active())
        .and_then(|b| b.volumes.play_area)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_body_keeps_full_carry() {
        let carry = Vec3::new(3.2, 0.0, 0.0);
        let body = Vec3::new(0.0, GRAVITY_PUSH, 0.0);
        assert_eq!(momentum(carry, body), carry);
    }

    #[test]
    fn fast_body_scales_carry_down() {
        let carry = Vec3::new(4.0, 0.0, 2.0);
        let m = momentum(carry, Vec3::new(0.0, 0.0, 4.0));
        assert!((m - Vec3::new(1.0, 0.0, 0.5)).length() < 1e-6);
    }

    #[test]
    fn carry_is_not_normalized_by_its_own_speed() {
        let carry = Vec3::new(6.0, 0.0, 8.0);
        let m = momentum(carry, Vec3::new(0.0, 0.5, 0.0));
        assert!((m.length() - 10.0).abs() < 1e-5);
    }

    #[test]
    fn no_momentum_when_still() {
        assert_eq!(momentum(Vec3::ZERO, Vec3::X), Vec3::ZERO);
    }
}
