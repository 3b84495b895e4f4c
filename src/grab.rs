//! Grab/interaction collaborator interface.
//!
//! The interaction system marks held objects with [`Grabbed`] and writes
//! [`GrabStarted`]/[`GrabEnded`] when a grab begins or ends.

use bevy::prelude::*;

/// Marker for an object that is currently held by the user.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grabbed;

/// An object was picked up.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrabStarted {
    /// Root entity of the grabbed object.
    pub object: Entity,
}

/// An object was released.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrabEnded {
    /// Root entity of the released object.
    pub object: Entity,
}

/// Whether `entity` or one of its ancestors is grabbed.
pub fn is_grabbed(world: &World, entity: Entity) -> bool {
    let mut current = Some(entity);
    while let Some(e) = current {
        if world.get::<Grabbed>(e).is_some() {
            return true;
        }
        current = world.get::<ChildOf>(e).map(ChildOf::parent);
    }
    false
}
