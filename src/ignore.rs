//! Collision suppression between the body volumes and chosen objects.
//!
//! Ignoring an object covers every collider in its hierarchy. Objects released
//! from a grab are restored one rendered frame later so the body does not snap
//! against something the hand just let go of; grabbing the object again in the
//! meantime cancels the restore.

use bevy::prelude::*;

use crate::backend::BodyPhysicsBackend;
use crate::config::BodyPhysicsConfig;
use crate::state::BodyPhysics;
use crate::systems::with_body;

/// An object whose colliders are ignored by the body volumes.
#[derive(Debug, Clone, PartialEq)]
pub struct IgnoredObject {
    /// Root of the object.
    pub object: Entity,
    /// Colliders in the object's hierarchy at the time it was ignored.
    pub colliders: Vec<Entity>,
}

/// Objects currently ignored by a body, plus restores waiting for the next frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionIgnoreSet {
    entries: Vec<IgnoredObject>,
    pending_restore: Vec<Entity>,
}

impl CollisionIgnoreSet {
    /// Whether `object` is ignored.
    pub fn contains(&self, object: Entity) -> bool {
        self.entries.iter().any(|e| e.object == object)
    }

    /// Ignored object roots.
    pub fn objects(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entries.iter().map(|e| e.object)
    }

    /// Whether a restore of `object` is waiting for the next frame.
    pub fn is_pending(&self, object: Entity) -> bool {
        self.pending_restore.contains(&object)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record an ignored object. Returns `false` if it was already present.
    fn insert(&mut self, object: Entity, colliders: Vec<Entity>) -> bool {
        if self.contains(object) {
            return false;
        }
        self.entries.push(IgnoredObject { object, colliders });
        true
    }

    fn remove(&mut self, object: Entity) -> Option<IgnoredObject> {
        let index = self.entries.iter().position(|e| e.object == object)?;
        Some(self.entries.remove(index))
    }

    /// Queue a restore for the next frame.
    pub(crate) fn defer_restore(&mut self, object: Entity) {
        if self.contains(object) && !self.is_pending(object) {
            self.pending_restore.push(object);
        }
    }

    /// Drop a queued restore. Returns `true` if one was queued.
    pub(crate) fn cancel_restore(&mut self, object: Entity) -> bool {
        let before = self.pending_restore.len();
        self.pending_restore.retain(|&e| e != object);
        before != self.pending_restore.len()
    }

    /// Take every queued restore.
    pub(crate) fn take_pending(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.pending_restore)
    }
}

/// `object` and all of its descendants that carry a collider.
fn hierarchy_colliders<B: BodyPhysicsBackend>(world: &World, object: Entity) -> Vec<Entity> {
    let mut colliders = Vec::new();
    let mut stack = vec![object];
    while let Some(entity) = stack.pop() {
        if B::is_collider(world, entity) {
            colliders.push(entity);
        }
        if let Some(children) = world.get::<Children>(entity) {
            stack.extend_from_slice(children);
        }
    }
    colliders
}

/// Stop the body volumes from colliding with `object`'s colliders.
///
/// Ignoring an already ignored object does nothing.
pub(crate) fn ignore_object<B: BodyPhysicsBackend>(
    world: &mut World,
    body: &mut BodyPhysics,
    object: Entity,
) {
    if body.ignored.contains(object) {
        return;
    }
    let colliders: Vec<Entity> = hierarchy_colliders::<B>(world, object)
        .into_iter()
        .filter(|&c| !body.volumes.contains(c))
        .collect();

    for volume in body.volumes.iter().collect::<Vec<_>>() {
        for &collider in &colliders {
            B::set_collision_ignored(world, volume, collider, true);
        }
    }
    body.ignored.insert(object, colliders);
}

/// Let the body volumes collide with `object` again.
pub(crate) fn restore_object<B: BodyPhysicsBackend>(
    world: &mut World,
    body: &mut BodyPhysics,
    object: Entity,
) {
    body.ignored.cancel_restore(object);
    let Some(entry) = body.ignored.remove(object) else {
        return;
    };
    for volume in body.volumes.iter().collect::<Vec<_>>() {
        for &collider in &entry.colliders {
            B::set_collision_ignored(world, volume, collider, false);
        }
    }
}

/// Restore every ignored object.
pub(crate) fn restore_all<B: BodyPhysicsBackend>(world: &mut World, body: &mut BodyPhysics) {
    let objects: Vec<Entity> = body.ignored.objects().collect();
    for object in objects {
        restore_object::<B>(world, body, object);
    }
    body.ignored.pending_restore.clear();
}

/// Restore everything, then ignore the configured objects again.
pub(crate) fn reset_ignored<B: BodyPhysicsBackend>(
    world: &mut World,
    body: &mut BodyPhysics,
    config: &BodyPhysicsConfig,
) {
    restore_all::<B>(world, body);
    for &object in &config.ignore_collisions_with {
        ignore_object::<B>(world, body, object);
    }
}

/// Stop the body from colliding with `object` and its child colliders.
pub fn ignore_collisions<B: BodyPhysicsBackend>(world: &mut World, body: Entity, object: Entity) {
    with_body(world, body, |world, frame| ignore_object::<B>(world, &mut frame.body, object));
}

/// Let the body collide with `object` again.
pub fn restore_collisions<B: BodyPhysicsBackend>(world: &mut World, body: Entity, object: Entity) {
    with_body(world, body, |world, frame| restore_object::<B>(world, &mut frame.body, object));
}

/// Restore every ignored collision, then ignore the configured objects again.
///
/// Calling this repeatedly leaves the same set of ignored objects.
pub fn reset_ignored_collisions<B: BodyPhysicsBackend>(world: &mut World, body: Entity) {
    with_body(world, body, |world, frame| {
        reset_ignored::<B>(world, &mut frame.body, &frame.config);
    });
}
