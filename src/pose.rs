//! Tracked rig poses.
//!
//! The pose source is injected as entity references: a play area root and
//! the head and controllers tracked inside it. Head and controller
//! `Transform`s are read as play-area-local (tracking space) poses, the play
//! area `Transform` as its world pose.

use bevy::prelude::*;

use crate::error::BodyPhysicsError;

/// Entities that make up the user's tracked rig.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Component)]
pub struct TrackedRig {
    /// Root of the tracked space. Moving it relocates the user.
    pub play_area: Option<Entity>,
    /// Headset, posed relative to the play area.
    pub head: Option<Entity>,
    /// Left controller, posed relative to the play area.
    pub left_controller: Option<Entity>,
    /// Right controller, posed relative to the play area.
    pub right_controller: Option<Entity>,
}

impl TrackedRig {
    /// Rig with a play area and head and no controllers.
    pub fn new(play_area: Entity, head: Entity) -> Self {
        Self {
            play_area: Some(play_area),
            head: Some(head),
            ..default()
        }
    }

    /// Builder: set both controllers.
    pub fn with_controllers(mut self, left: Entity, right: Entity) -> Self {
        self.left_controller = Some(left);
        self.right_controller = Some(right);
        self
    }

    /// Controller entity for a hand.
    pub fn controller(&self, hand: Hand) -> Option<Entity> {
        match hand {
            Hand::Left => self.left_controller,
            Hand::Right => self.right_controller,
        }
    }
}

/// Activity state reported by the device provider for a tracked device.
///
/// Devices without this component are treated as active.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq, Eq)]
#[reflect(Component)]
pub struct TrackedDevice {
    /// Whether the device is currently tracked.
    pub active: bool,
}

impl Default for TrackedDevice {
    fn default() -> Self {
        Self { active: true }
    }
}

/// Controller hand.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

/// Snapshot of the rig poses for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigPose {
    /// Play area entity.
    pub play_area: Entity,
    /// Head entity.
    pub head_entity: Entity,
    /// World pose of the play area.
    pub play_area_transform: Transform,
    /// Head pose in play-area space.
    pub head_local: Transform,
    /// World pose of the head.
    pub head: Transform,
}

impl RigPose {
    /// Resolve the poses of `rig`.
    pub fn read(world: &World, rig: &TrackedRig) -> Result<Self, BodyPhysicsError> {
        let play_area = rig.play_area.ok_or(BodyPhysicsError::MissingPlayArea)?;
        let head_entity = rig.head.ok_or(BodyPhysicsError::MissingHead)?;
        let play_area_transform = transform_of(world, play_area)?;
        let head_local = transform_of(world, head_entity)?;

        Ok(Self {
            play_area,
            head_entity,
            play_area_transform,
            head_local,
            head: play_area_transform.mul_transform(head_local),
        })
    }

    /// World position of the play area.
    #[inline]
    pub fn play_area_position(&self) -> Vec3 {
        self.play_area_transform.translation
    }

    /// World position of the head.
    #[inline]
    pub fn head_position(&self) -> Vec3 {
        self.head.translation
    }

    /// Head position projected onto the ground plane.
    #[inline]
    pub fn head_planar(&self) -> Vec2 {
        self.head.translation.xz()
    }

    /// Convert a play-area-local point to world space.
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.play_area_transform.transform_point(local)
    }

    /// Move the play area to `translation`, keeping the snapshot in sync.
    pub fn set_play_area_position(&mut self, world: &mut World, translation: Vec3) {
        if let Some(mut transform) = world.get_mut::<Transform>(self.play_area) {
            transform.translation = translation;
        }
        self.play_area_transform.translation = translation;
        self.head = self.play_area_transform.mul_transform(self.head_local);
    }
}

/// World position of an active controller, if any.
pub fn controller_position(world: &World, rig: &TrackedRig, pose: &RigPose, hand: Hand) -> Option<Vec3> {
    let controller = rig.controller(hand)?;
    let active = world
        .get::<TrackedDevice>(controller)
        .map(|d| d.active)
        .unwrap_or(true);
    if !active {
        return None;
    }
    let local = world.get::<Transform>(controller)?;
    Some(pose.to_world(local.translation))
}

fn transform_of(world: &World, entity: Entity) -> Result<Transform, BodyPhysicsError> {
    world
        .get_entity(entity)
        .ok()
        .and_then(|e| e.get::<Transform>().copied())
        .ok_or(BodyPhysicsError::MissingTransform { entity })
}
