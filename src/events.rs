//! Events emitted and consumed by body physics.
//!
//! Outgoing [`BodyPhysicsEvent`]s are written synchronously during the fixed
//! tick in the order the state changes happen. Incoming
//! [`BodyPhysicsRequest`]s are applied at the start of the next tick.

use bevy::ecs::event::EventCursor;
use bevy::prelude::*;

use crate::volumes::VolumeKind;

/// What happened to a body.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyEventKind {
    StartFalling,
    StopFalling,
    StartMoving,
    StopMoving,
    StartColliding,
    StopColliding,
}

/// Notification about a body state change.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct BodyPhysicsEvent {
    /// Entity carrying the [`BodyPhysics`](crate::state::BodyPhysics) component.
    pub body: Entity,
    /// Kind of change.
    pub kind: BodyEventKind,
    /// Floor being fallen to, or object being collided with.
    pub target: Option<Entity>,
}

/// A command for a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyCommand {
    /// See [`apply_body_velocity`](crate::velocity::apply_body_velocity).
    ApplyVelocity {
        velocity: Vec3,
        force_physics_on: bool,
        apply_momentum: bool,
    },
    /// Set whether the body is on the ground.
    ToggleOnGround(bool),
    /// Stop or resume snapping to the floor.
    TogglePreventSnapToFloor(bool),
    /// Zero linear and angular velocity.
    ResetVelocities,
    /// End an active fall.
    ResetFalling,
    /// Restore every ignored collision and re-apply the configured ignore list.
    ResetIgnoredCollisions,
}

/// Request to run a [`BodyCommand`] on a body.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct BodyPhysicsRequest {
    /// Entity carrying the body physics component.
    pub body: Entity,
    /// Command to run.
    pub command: BodyCommand,
}

impl BodyPhysicsRequest {
    /// Create a request.
    pub fn new(body: Entity, command: BodyCommand) -> Self {
        Self { body, command }
    }
}

/// Contact between a body volume and another collider, reported by the
/// physics backend.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct VolumeContact {
    /// Body the volume belongs to.
    pub body: Entity,
    /// Volume that was touched.
    pub volume: Entity,
    /// Which volume it is.
    pub kind: VolumeKind,
    /// Collider touching the volume.
    pub other: Entity,
    /// `true` on contact start, `false` on contact end.
    pub started: bool,
    /// Whether the volume was acting as a trigger.
    pub trigger: bool,
}

/// Read the events written since `cursor` last read.
pub(crate) fn read_new<E: Event + Clone>(world: &World, cursor: &mut EventCursor<E>) -> Vec<E> {
    world
        .get_resource::<Events<E>>()
        .map(|events| cursor.read(events).cloned().collect())
        .unwrap_or_default()
}

/// Write a body event.
pub(crate) fn emit(world: &mut World, body: Entity, kind: BodyEventKind, target: Option<Entity>) {
    world.send_event(BodyPhysicsEvent { body, kind, target });
}
