//! Floor snapping and falling.
//!
//! While grounded, a ray cast down from the headset watches the floor. When
//! the floor under the head changes height, the body either drops onto the new
//! floor under gravity or is teleported onto it. A controller restriction can
//! hold the user on the previous floor while their hands still rest on it.

use bevy::prelude::*;

use crate::backend::BodyPhysicsBackend;
use crate::collision::{CollisionData, RayCast};
use crate::config::{FallRestriction, CONTROLLER_DROP_TOLERANCE, FALL_MIN_TICKS};
use crate::events::{emit, BodyEventKind};
use crate::grab::is_grabbed;
use crate::pose::{controller_position, Hand};
use crate::state::{BodyPhysics, BodyState, FallSession};
use crate::systems::{with_body, BodyFrame};
use crate::teleport::{self, TeleportRequest};
use crate::velocity::apply_velocity;
use crate::volumes::toggle_physics;

/// Slack for comparing the accumulated body clock against a fall deadline.
const CLOCK_TOLERANCE: f32 = 1e-5;

/// Floor under the headset as seen by the previous ticks.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct FloorState {
    /// Floor under the standing position.
    pub current_valid_floor: Option<Entity>,
    /// Height of the floor hit under the head on the previous tick.
    pub last_frame_floor_y: f32,
    /// Play area height minus the height of the floor under the head.
    pub hit_floor_y_delta: f32,
    /// Set after the first floor sample; no drop is considered before it.
    pub initial_floor_drop_armed: bool,
}

/// One-shot request to re-examine a held back fall on the next tick.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct RetoggleLatch {
    pub armed: bool,
    /// Physics setting to restore once the fall goes ahead.
    pub stored_physics: bool,
}

/// Follow the floor under the headset and start a fall when it changes.
pub(crate) fn snap_to_nearest_floor<B: BodyPhysicsBackend>(world: &mut World, frame: &mut BodyFrame) {
    let config = &frame.config;
    if frame.body.prevent_snap_to_floor
        || (!config.enable_body_collisions && !config.enable_teleport)
        || frame.body.is_leaning()
    {
        return;
    }

    let head = frame.pose.head_position();
    let play_area = frame.pose.play_area_position();
    if head.y <= play_area.y {
        return;
    }

    let Some(hit) = B::raycast(world, RayCast::down(head), &frame.filter()) else {
        frame.body.floor.initial_floor_drop_armed = true;
        return;
    };
    frame.body.floor.hit_floor_y_delta = play_area.y - hit.point.y;

    if frame.body.floor.initial_floor_drop_armed && (valid_drop(world, frame, &hit) || frame.body.latch.armed) {
        suspend_physics::<B>(world, &mut frame.body);
        handle_fall::<B>(world, frame, &hit);
    }

    frame.body.floor.initial_floor_drop_armed = true;
    frame.body.floor.last_frame_floor_y = hit.point.y;
}

/// Whether the floor hit under the head is a new floor the user may drop to.
fn valid_drop(world: &World, frame: &BodyFrame, hit: &CollisionData) -> bool {
    teleport::valid_location(world, hit.entity, hit.point)
        && !hit.entity.is_some_and(|e| is_grabbed(world, e))
        && (hit.point.y - frame.body.floor.last_frame_floor_y).abs() > frame.config.floor_height_tolerance
}

/// Drop onto the floor at `hit`, unless the controllers hold the user back.
fn handle_fall<B: BodyPhysicsBackend>(world: &mut World, frame: &mut BodyFrame, hit: &CollisionData) {
    let play_area = frame.pose.play_area_position();
    if hit.point.y < play_area.y && controllers_hold::<B>(world, frame) {
        let latch = &mut frame.body.latch;
        if !latch.armed {
            latch.stored_physics = frame.body.stored_current_physics;
        }
        latch.armed = true;
        debug!("Fall of body {} held by controllers", frame.entity);
        return;
    }

    if frame.body.latch.armed {
        frame.body.stored_current_physics = frame.body.latch.stored_physics;
        frame.body.latch = RetoggleLatch::default();
    }

    let config = &frame.config;
    let has_teleporter = teleport::teleporter_registered(world);
    let delta = frame.body.floor.hit_floor_y_delta;

    if config.enable_body_collisions
        && (!has_teleporter || !config.enable_teleport || delta > config.gravity_fall_y_threshold)
    {
        toggle_physics::<B>(world, &mut frame.body, true);
        apply_velocity::<B>(world, frame, Vec3::ZERO, false, false);
    } else if has_teleporter && config.enable_teleport {
        teleport_fall::<B>(world, frame, hit.entity, hit.point);
    }
}

/// Whether the fall restriction keeps the user on the previous floor.
fn controllers_hold<B: BodyPhysicsBackend>(world: &mut World, frame: &BodyFrame) -> bool {
    let restriction = frame.config.fall_restriction;
    if restriction == FallRestriction::NoRestriction {
        return false;
    }
    let left = controller_over_floor::<B>(world, frame, Hand::Left);
    let right = controller_over_floor::<B>(world, frame, Hand::Right);
    restriction.holds(left, right)
}

/// Whether an active controller is above a floor level with the play area.
fn controller_over_floor<B: BodyPhysicsBackend>(world: &mut World, frame: &BodyFrame, hand: Hand) -> bool {
    let Some(position) = controller_position(world, &frame.rig, &frame.pose, hand) else {
        return false;
    };
    let play_area_y = frame.pose.play_area_position().y;
    B::raycast(world, RayCast::down(position), &frame.filter())
        .is_some_and(|hit| (hit.point.y - play_area_y).abs() < CONTROLLER_DROP_TOLERANCE)
}

/// Store the current physics setting and turn physics off ahead of a fall.
pub(crate) fn suspend_physics<B: BodyPhysicsBackend>(world: &mut World, body: &mut BodyPhysics) {
    body.stored_current_physics = body.physics_enabled();
    body.reset_physics_after_teleport = false;
    toggle_physics::<B>(world, body, false);
}

impl BodyPhysics {
    /// Physics setting to apply right after a teleport fall was requested.
    ///
    /// A sent request waits for `TeleportCompleted` and returns `None`. With no
    /// request sent nothing will complete the fall, so the stored setting is
    /// returned.
    pub(crate) fn physics_after_teleport_request(&mut self, requested: bool) -> Option<bool> {
        self.reset_physics_after_teleport = requested;
        (!requested).then_some(self.stored_current_physics)
    }
}

/// Move the play area onto `point` through the teleport service.
///
/// Callers suspend physics first; it comes back in [`finish_teleport`].
pub(crate) fn teleport_fall<B: BodyPhysicsBackend>(
    world: &mut World,
    frame: &mut BodyFrame,
    target: Option<Entity>,
    point: Vec3,
) {
    start_fall::<B>(world, frame, target);

    let play_area = frame.pose.play_area_position();
    let request = TeleportRequest {
        body: frame.entity,
        target,
        destination: Vec3::new(play_area.x, point.y, play_area.z),
        rotation: None,
        force_destination: true,
        immediate: true,
    };
    let blink = frame.body.floor.hit_floor_y_delta.abs() <= frame.config.blink_y_threshold;
    let requested = teleport::request_move(world, request, blink);
    if !requested {
        debug!("No teleporter for the fall of body {}, restoring physics", frame.entity);
    }
    if let Some(physics) = frame.body.physics_after_teleport_request(requested) {
        toggle_physics::<B>(world, &mut frame.body, physics);
    }
}

/// Enter the falling state.
pub(crate) fn start_fall<B: BodyPhysicsBackend>(world: &mut World, frame: &mut BodyFrame, target: Option<Entity>) {
    let now = frame.body.clock;
    let was_falling = frame.body.is_falling();
    frame.body.state = BodyState::Falling(FallSession {
        started_at: now,
        min_elapsed_deadline: now + FALL_MIN_TICKS * B::get_fixed_timestep(world),
        target_floor: target,
        held: false,
    });

    if !was_falling {
        debug!("Body {} started falling", frame.entity);
        emit(world, frame.entity, BodyEventKind::StartFalling, target);
    }
}

/// End the fall once it has lasted long enough and the play area has settled.
pub(crate) fn check_falling(world: &mut World, frame: &mut BodyFrame) {
    let Some(session) = frame.body.state.fall_session().copied() else {
        return;
    };
    if session.held || frame.body.clock + CLOCK_TOLERANCE < session.min_elapsed_deadline {
        return;
    }

    let config = &frame.config;
    let current = config.round_height(frame.pose.play_area_position().y);
    let previous = config.round_height(frame.body.last_play_area_position.y);
    if current == previous {
        stop_fall(world, frame);
    }
}

/// Return to the ground.
pub(crate) fn stop_fall(world: &mut World, frame: &mut BodyFrame) {
    frame.config.enable_body_collisions = frame.body.session_collisions;

    let Some(session) = frame.body.state.fall_session().copied() else {
        return;
    };
    frame.body.state = BodyState::default();
    debug!("Body {} stopped falling", frame.entity);
    emit(world, frame.entity, BodyEventKind::StopFalling, session.target_floor);
}

/// Put the body on the ground, or lift it off until it is put back.
pub(crate) fn set_on_ground(world: &mut World, frame: &mut BodyFrame, on_ground: bool) {
    if on_ground {
        stop_fall(world, frame);
        return;
    }

    if let BodyState::Falling(session) = &mut frame.body.state {
        session.held = true;
        return;
    }

    let now = frame.body.clock;
    let target = frame.body.floor.current_valid_floor;
    frame.body.state = BodyState::Falling(FallSession {
        started_at: now,
        min_elapsed_deadline: now,
        target_floor: target,
        held: true,
    });
    emit(world, frame.entity, BodyEventKind::StartFalling, target);
}

/// Restore the physics setting stored before a teleport fall.
pub(crate) fn finish_teleport<B: BodyPhysicsBackend>(world: &mut World, frame: &mut BodyFrame) {
    if !frame.body.reset_physics_after_teleport {
        return;
    }
    frame.body.reset_physics_after_teleport = false;
    let stored = frame.body.stored_current_physics;
    toggle_physics::<B>(world, &mut frame.body, stored);
}

/// Set whether the body is on the ground.
///
/// Taking the body off the ground starts a fall that only ends when the body
/// is put back; use this while something else carries the user, such as a
/// climbing grip.
pub fn toggle_on_ground(world: &mut World, body: Entity, on_ground: bool) {
    with_body(world, body, |world, frame| set_on_ground(world, frame, on_ground));
}

/// Stop or resume snapping to the floor.
pub fn toggle_prevent_snap_to_floor(world: &mut World, body: Entity, prevent: bool) {
    with_body(world, body, |_, frame| frame.body.prevent_snap_to_floor = prevent);
}

/// End an active fall.
pub fn reset_falling(world: &mut World, body: Entity) {
    with_body(world, body, stop_fall);
}
