//! Body and foot collision volumes.
//!
//! The body volume is a capsule that hangs beneath the headset and follows it
//! around the play area. The optional foot volume sits below it and detects
//! steps. Both are parented to the play area, whose dynamic physics body
//! carries them.

use bevy::prelude::*;

use crate::backend::BodyPhysicsBackend;
use crate::config::{BodyPhysicsConfig, PLAY_AREA_HEIGHT_ADJUSTMENT};
use crate::ignore;
use crate::state::BodyPhysics;
use crate::systems::BodyFrame;

/// Which of the body's volumes a collider is.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeKind {
    Body,
    Foot,
}

/// Marks a collider as one of a body's volumes.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq, Eq)]
#[reflect(Component)]
pub struct BodyVolume {
    /// Entity carrying the [`BodyPhysics`] component.
    pub owner: Entity,
    /// Which volume this is.
    pub kind: VolumeKind,
}

/// Capsule placement in play-area space.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct CapsuleGeometry {
    /// Capsule center relative to the play area.
    pub center: Vec3,
    /// Full height including both caps.
    pub height: f32,
    /// Cap radius.
    pub radius: f32,
}

/// Geometry of both volumes for one head pose.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct VolumeGeometry {
    pub body: CapsuleGeometry,
    pub foot: Option<CapsuleGeometry>,
}

impl VolumeGeometry {
    /// Compute the volumes for a head at `head_local` in play-area space.
    ///
    /// The body capsule spans from the top of the step offset to
    /// `headset_y_offset` below the head, and is never shorter than its radius.
    pub fn compute(config: &BodyPhysicsConfig, head_local: Vec3) -> Self {
        let radius = config.body_radius.max(0.0);
        let step_offset = config.step_offset();

        let height = (head_local.y - (config.headset_y_offset + step_offset))
            .max(0.0)
            .max(radius);
        let center_y = (height / 2.0 + step_offset + PLAY_AREA_HEIGHT_ADJUSTMENT)
            .max(radius + PLAY_AREA_HEIGHT_ADJUSTMENT);

        let body = CapsuleGeometry {
            center: Vec3::new(head_local.x, center_y, head_local.z),
            height,
            radius,
        };

        let foot = config.step.enabled().then(|| CapsuleGeometry {
            center: Vec3::new(head_local.x, step_offset / 2.0, head_local.z),
            height: step_offset,
            radius: radius * config.step.step_thickness_multiplier.max(0.0),
        });

        Self { body, foot }
    }
}

/// Volumes and physics body owned by a [`BodyPhysics`].
#[derive(Reflect, Debug, Clone, Default, PartialEq)]
pub struct BodyVolumes {
    /// Play area the physics body lives on.
    pub play_area: Option<Entity>,
    pub body: Option<Entity>,
    pub foot: Option<Entity>,
    /// Whether the volumes were spawned by this crate and must be despawned with it.
    pub body_created: bool,
    pub foot_created: bool,
    /// Whether the physics body on the play area was added by this crate.
    pub physics_body_created: bool,
    /// Geometry last written to the volumes.
    pub geometry: Option<VolumeGeometry>,
}

impl BodyVolumes {
    /// All existing volumes.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.body.iter().chain(self.foot.iter()).copied()
    }

    /// Whether `entity` is one of these volumes.
    pub fn contains(&self, entity: Entity) -> bool {
        self.body == Some(entity) || self.foot == Some(entity)
    }

    /// Current foot volume center in play-area space.
    pub fn foot_center(&self) -> Option<Vec3> {
        self.geometry.and_then(|g| g.foot).map(|f| f.center)
    }
}

/// Create the physics body and any volume not supplied by the config.
pub(crate) fn ensure_volumes<B: BodyPhysicsBackend>(world: &mut World, frame: &mut BodyFrame) {
    let play_area = frame.pose.play_area;
    let owner = frame.entity;
    let config = &frame.config;
    let volumes = &mut frame.body.volumes;

    volumes.play_area = Some(play_area);
    volumes.physics_body_created = B::ensure_body(world, play_area, config.body_mass);

    let body = match config.body_volume {
        Some(volume) => volume,
        None => {
            volumes.body_created = true;
            B::spawn_volume(world, play_area, VolumeKind::Body, config.body_radius)
        }
    };
    volumes.body = Some(body);
    mark_volume(world, body, owner, VolumeKind::Body);

    if config.step.enabled() {
        let radius = config.body_radius * config.step.step_thickness_multiplier;
        let foot = match config.foot_volume {
            Some(volume) => volume,
            None => {
                volumes.foot_created = true;
                B::spawn_volume(world, play_area, VolumeKind::Foot, radius)
            }
        };
        volumes.foot = Some(foot);
        mark_volume(world, foot, owner, VolumeKind::Foot);
    }
}

fn mark_volume(world: &mut World, volume: Entity, owner: Entity, kind: VolumeKind) {
    if let Ok(mut entity) = world.get_entity_mut(volume) {
        entity.insert(BodyVolume { owner, kind });
    }
}

/// Write the geometry for the current head pose to the volumes.
///
/// Nothing is written when the geometry is unchanged since the last tick.
pub(crate) fn update_geometry<B: BodyPhysicsBackend>(world: &mut World, frame: &mut BodyFrame) {
    let geometry = VolumeGeometry::compute(&frame.config, frame.pose.head_local.translation);
    let volumes = &mut frame.body.volumes;
    if volumes.geometry == Some(geometry) {
        return;
    }

    if let Some(body) = volumes.body {
        let g = geometry.body;
        B::set_capsule(world, body, g.center, g.height, g.radius);
    }
    if let (Some(foot), Some(g)) = (volumes.foot, geometry.foot) {
        B::set_capsule(world, foot, g.center, g.height, g.radius);
    }
    volumes.geometry = Some(geometry);
}

/// Switch between physics-driven and tracking-driven movement.
///
/// Enabled: the play area body is dynamic and the volumes are solid.
/// Disabled: the body is kinematic and the volumes only report overlaps.
pub(crate) fn toggle_physics<B: BodyPhysicsBackend>(
    world: &mut World,
    body: &mut BodyPhysics,
    enabled: bool,
) {
    if body.physics_enabled == Some(enabled) {
        return;
    }
    if let Some(play_area) = body.volumes.play_area {
        B::set_kinematic(world, play_area, !enabled);
    }
    for volume in body.volumes.iter().collect::<Vec<_>>() {
        B::set_sensor(world, volume, !enabled);
    }
    body.physics_enabled = Some(enabled);
}

/// Undo everything activation did for a body that is going away.
pub(crate) fn teardown<B: BodyPhysicsBackend>(world: &mut World, mut body: BodyPhysics) {
    ignore::restore_all::<B>(world, &mut body);

    let volumes = &body.volumes;
    for (volume, created) in [
        (volumes.body, volumes.body_created),
        (volumes.foot, volumes.foot_created),
    ] {
        let Some(volume) = volume else {
            continue;
        };
        let Ok(mut entity) = world.get_entity_mut(volume) else {
            continue;
        };
        if created {
            entity.despawn();
        } else {
            entity.remove::<BodyVolume>();
        }
    }

    if volumes.physics_body_created {
        if let Some(play_area) = volumes.play_area {
            B::remove_body(world, play_area);
        }
    }
}

/// Tear down the volumes of a removed body.
pub fn on_body_removed<B: BodyPhysicsBackend>(
    trigger: Trigger<OnRemove, BodyPhysics>,
    q_bodies: Query<&BodyPhysics>,
    mut commands: Commands,
) {
    let Ok(body) = q_bodies.get(trigger.target()) else {
        return;
    };
    if !body.active {
        return;
    }
    let body = body.clone();
    commands.queue(move |world: &mut World| teardown::<B>(world, body));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StepConfig;

    fn config() -> BodyPhysicsConfig {
        BodyPhysicsConfig::default()
    }

    #[test]
    fn body_hangs_below_head() {
        let config = config();
        let geometry = VolumeGeometry::compute(&config, Vec3::new(0.3, 1.8, -0.2));

        // 1.8 - (0.2 + 0.15)
        let height = 1.45;
        assert!((geometry.body.height - height).abs() < 1e-5);
        assert!((geometry.body.center.y - (height / 2.0 + 0.15 + 0.009)).abs() < 1e-5);
        assert_eq!(geometry.body.center.x, 0.3);
        assert_eq!(geometry.body.center.z, -0.2);
    }

    #[test]
    fn crouching_never_shrinks_below_radius() {
        let config = config();
        let geometry = VolumeGeometry::compute(&config, Vec3::new(0.0, 0.1, 0.0));

        assert!(geometry.body.height >= geometry.body.radius);
        assert!(geometry.body.center.y >= geometry.body.radius);
        assert!(geometry.body.center.y >= 0.0);
    }

    #[test]
    fn head_below_play_area_stays_non_negative() {
        let config = config();
        let geometry = VolumeGeometry::compute(&config, Vec3::new(0.0, -2.0, 0.0));

        assert!(geometry.body.height >= 0.0);
        assert!(geometry.body.center.y >= config.body_radius + PLAY_AREA_HEIGHT_ADJUSTMENT - 1e-6);
    }

    #[test]
    fn foot_volume_follows_step_config() {
        let config = config();
        let geometry = VolumeGeometry::compute(&config, Vec3::new(0.1, 1.7, 0.1));
        let foot = geometry.foot.unwrap();

        assert!((foot.radius - 0.1).abs() < 1e-6);
        assert!((foot.height - 0.15).abs() < 1e-6);
        assert!((foot.center.y - 0.075).abs() < 1e-6);
        assert_eq!(foot.center.x, 0.1);
    }

    #[test]
    fn no_foot_without_step_height() {
        let config = config().with_step(StepConfig::disabled());
        let geometry = VolumeGeometry::compute(&config, Vec3::new(0.0, 1.7, 0.0));

        assert!(geometry.foot.is_none());
        assert!((geometry.body.height - 1.5).abs() < 1e-5);
    }

    #[test]
    fn volumes_contains() {
        let body = Entity::from_raw(1);
        let foot = Entity::from_raw(2);
        let volumes = BodyVolumes {
            body: Some(body),
            foot: Some(foot),
            ..default()
        };

        assert!(volumes.contains(body));
        assert!(volumes.contains(foot));
        assert!(!volumes.contains(Entity::from_raw(3)));
        assert_eq!(volumes.iter().count(), 2);
    }
}
