//! Physics backend abstraction.
//!
//! This module defines the trait that physics backends must implement to work
//! with the body physics systems. The body-presence logic never talks to a
//! physics engine directly; every ray cast, sweep, flag toggle and velocity
//! write goes through a [`BodyPhysicsBackend`].

use bevy::prelude::*;

use crate::collision::{CollisionData, QueryFilterSpec, RayCast};
use crate::volumes::VolumeKind;

/// Trait for physics backend implementations.
///
/// Implement this trait to integrate a physics engine with the body physics
/// plugin. All functions are static and operate on the ECS [`World`], the same
/// way the systems that call them do.
///
/// For an example implementation, see the `rapier` module's
/// `Rapier3dBackend`.
pub trait BodyPhysicsBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Cast a ray and return the closest hit.
    fn raycast(world: &mut World, ray: RayCast, filter: &QueryFilterSpec) -> Option<CollisionData>;

    /// Sweep an axis-aligned box along `direction` and return the closest hit.
    ///
    /// # Arguments
    /// * `center` - Start position of the box center in world space
    /// * `half_extents` - Half size of the box on each axis
    /// * `direction` - Sweep direction (should be normalized)
    /// * `max_distance` - Maximum sweep distance
    fn box_cast(
        world: &mut World,
        center: Vec3,
        half_extents: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: &QueryFilterSpec,
    ) -> Option<CollisionData>;

    /// Make sure `play_area` carries a dynamic physics body.
    ///
    /// Mass and rotation lock are only applied when the body is created.
    /// Returns `true` if a body was created by this call.
    fn ensure_body(world: &mut World, play_area: Entity, mass: f32) -> bool;

    /// Remove a physics body previously created by [`Self::ensure_body`].
    fn remove_body(world: &mut World, play_area: Entity);

    /// Spawn a capsule collision volume parented to `play_area`.
    fn spawn_volume(world: &mut World, play_area: Entity, kind: VolumeKind, radius: f32) -> Entity;

    /// Resize and reposition a capsule volume.
    ///
    /// `center` is local to the play area; `height` is the full capsule height
    /// including both caps.
    fn set_capsule(world: &mut World, volume: Entity, center: Vec3, height: f32, radius: f32);

    /// Switch the body between kinematic (`true`) and dynamic (`false`).
    fn set_kinematic(world: &mut World, play_area: Entity, kinematic: bool);

    /// Switch a volume between trigger-only (`true`) and solid (`false`).
    fn set_sensor(world: &mut World, volume: Entity, sensor: bool);

    /// Enable or disable contacts between two colliders.
    fn set_collision_ignored(world: &mut World, volume: Entity, other: Entity, ignored: bool);

    /// Whether `entity` carries a collider.
    fn is_collider(world: &World, entity: Entity) -> bool;

    /// Get the current linear velocity of a body.
    fn get_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the linear velocity of a body.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Apply an instantaneous velocity change, ignoring mass.
    fn apply_velocity_change(world: &mut World, entity: Entity, delta: Vec3);

    /// Get the current angular velocity of a body.
    fn get_angular_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the angular velocity of a body.
    fn set_angular_velocity(world: &mut World, entity: Entity, angular_velocity: Vec3);

    /// Get the fixed timestep delta time.
    fn get_fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.timestep().as_secs_f32())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}
