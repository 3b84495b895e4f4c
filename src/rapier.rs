//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.
//!
//! Pairwise collision ignoring is implemented with physics hooks. Use
//! [`BodyContactFilter`] as the hooks type of the Rapier plugin:
//!
//! ```rust,no_run
//! use bevy::prelude::*;
//! use bevy_rapier3d::prelude::*;
//! use vr_body_physics::prelude::*;
//! use vr_body_physics::rapier::BodyContactFilter;
//!
//! App::new()
//!     .add_plugins(DefaultPlugins)
//!     .add_plugins(RapierPhysicsPlugin::<BodyContactFilter>::default())
//!     .add_plugins(BodyPhysicsPlugin::<Rapier3dBackend>::default())
//!     .run();
//! ```

use bevy::ecs::system::{SystemParam, SystemState};
use bevy::prelude::*;
use bevy_rapier3d::geometry::shape_views::CapsuleView;
use bevy_rapier3d::geometry::Group;
use bevy_rapier3d::prelude::*;
use bevy_rapier3d::rapier::geometry::CollisionEventFlags;

use crate::backend::BodyPhysicsBackend;
use crate::collision::{CollisionData, QueryFilterSpec, RayCast};
use crate::events::VolumeContact;
use crate::volumes::{BodyVolume, VolumeKind};
use crate::BodyPhysicsSet;

/// Rapier3D physics backend for body physics.
///
/// The play area carries the rigid body; the body and foot volumes are child
/// colliders attached to it. Queries go through the default Rapier context.
pub struct Rapier3dBackend;

impl BodyPhysicsBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn raycast(world: &mut World, ray: RayCast, filter: &QueryFilterSpec) -> Option<CollisionData> {
        let mut state = SystemState::<ReadRapierContext>::new(world);
        let rapier_context = state.get(world);
        let Ok(context) = rapier_context.single() else {
            return None;
        };
        rapier_raycast(&context, ray, filter)
    }

    fn box_cast(
        world: &mut World,
        center: Vec3,
        half_extents: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: &QueryFilterSpec,
    ) -> Option<CollisionData> {
        let mut state = SystemState::<ReadRapierContext>::new(world);
        let rapier_context = state.get(world);
        let Ok(context) = rapier_context.single() else {
            return None;
        };
        rapier_box_cast(&context, center, half_extents, direction, max_distance, filter)
    }

    fn ensure_body(world: &mut World, play_area: Entity, mass: f32) -> bool {
        let Ok(mut entity) = world.get_entity_mut(play_area) else {
            return false;
        };
        if entity.contains::<RigidBody>() {
            return false;
        }
        entity.insert((
            RigidBody::Dynamic,
            Velocity::zero(),
            AdditionalMassProperties::Mass(mass),
            LockedAxes::ROTATION_LOCKED,
        ));
        true
    }

    fn remove_body(world: &mut World, play_area: Entity) {
        if let Ok(mut entity) = world.get_entity_mut(play_area) {
            entity.remove::<(RigidBody, Velocity, AdditionalMassProperties, LockedAxes)>();
        }
    }

    fn spawn_volume(world: &mut World, play_area: Entity, kind: VolumeKind, radius: f32) -> Entity {
        let name = match kind {
            VolumeKind::Body => "Body Volume",
            VolumeKind::Foot => "Foot Volume",
        };
        world
            .spawn((
                Name::new(name),
                Transform::default(),
                Collider::capsule_y(0.0, radius),
                ColliderMassProperties::Density(0.0),
                ActiveEvents::COLLISION_EVENTS,
                ActiveHooks::FILTER_CONTACT_PAIRS | ActiveHooks::FILTER_INTERSECTION_PAIR,
                ActiveCollisionTypes::default() | ActiveCollisionTypes::KINEMATIC_STATIC,
                ChildOf(play_area),
            ))
            .id()
    }

    fn set_capsule(world: &mut World, volume: Entity, center: Vec3, height: f32, radius: f32) {
        let Ok(mut entity) = world.get_entity_mut(volume) else {
            return;
        };
        let half_height = (height / 2.0 - radius).max(0.0);

        if !entity.contains::<Transform>() {
            entity.insert(Transform::from_translation(center));
        } else if let Some(mut transform) = entity.get_mut::<Transform>() {
            transform.translation = center;
        }

        let unchanged = entity
            .get::<Collider>()
            .and_then(|c| c.as_capsule().map(|capsule| capsule_dimensions(&capsule)))
            .is_some_and(|(h, r)| (h - half_height).abs() < 1e-6 && (r - radius).abs() < 1e-6);
        if !unchanged {
            entity.insert(Collider::capsule_y(half_height, radius));
        }
    }

    fn set_kinematic(world: &mut World, play_area: Entity, kinematic: bool) {
        if let Some(mut body) = world.get_mut::<RigidBody>(play_area) {
            *body = if kinematic {
                RigidBody::KinematicPositionBased
            } else {
                RigidBody::Dynamic
            };
        }
    }

    fn set_sensor(world: &mut World, volume: Entity, sensor: bool) {
        let Ok(mut entity) = world.get_entity_mut(volume) else {
            return;
        };
        if sensor {
            entity.insert(Sensor);
        } else {
            entity.remove::<Sensor>();
        }
    }

    fn set_collision_ignored(world: &mut World, volume: Entity, other: Entity, ignored: bool) {
        let Ok(mut entity) = world.get_entity_mut(volume) else {
            return;
        };
        if entity.contains::<IgnoredContacts>() {
            if let Some(mut contacts) = entity.get_mut::<IgnoredContacts>() {
                contacts.set(other, ignored);
            }
        } else if ignored {
            entity.insert((
                IgnoredContacts(vec![other]),
                ActiveHooks::FILTER_CONTACT_PAIRS | ActiveHooks::FILTER_INTERSECTION_PAIR,
            ));
        }
    }

    fn is_collider(world: &World, entity: Entity) -> bool {
        world.get::<Collider>(entity).is_some()
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel = velocity;
        }
    }

    fn apply_velocity_change(world: &mut World, entity: Entity, delta: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel += delta;
        }
    }

    fn get_angular_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.angvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_angular_velocity(world: &mut World, entity: Entity, angular_velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.angvel = angular_velocity;
        }
    }
}

/// Plugin that sets up Rapier3D-specific systems for body physics.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<IgnoredContacts>();
        app.init_resource::<PendingVolumeContacts>();

        // Collision events are read every frame so none age out between
        // fixed ticks, then handed over in the Sensors phase
        app.add_systems(Last, buffer_volume_contacts);
        app.add_systems(
            FixedUpdate,
            flush_volume_contacts.in_set(BodyPhysicsSet::Sensors),
        );
    }
}

/// Colliders a volume must not touch.
#[derive(Component, Reflect, Debug, Clone, Default, PartialEq, Eq)]
#[reflect(Component)]
pub struct IgnoredContacts(pub Vec<Entity>);

impl IgnoredContacts {
    /// Whether contacts with `other` are ignored.
    pub fn contains(&self, other: Entity) -> bool {
        self.0.contains(&other)
    }

    /// Add or remove `other`.
    pub fn set(&mut self, other: Entity, ignored: bool) {
        if ignored {
            if !self.contains(other) {
                self.0.push(other);
            }
        } else {
            self.0.retain(|&e| e != other);
        }
    }
}

/// Physics hooks dropping contacts between body volumes and ignored colliders.
#[derive(SystemParam)]
pub struct BodyContactFilter<'w, 's> {
    ignored: Query<'w, 's, &'static IgnoredContacts>,
}

impl BodyContactFilter<'_, '_> {
    fn ignores(&self, a: Entity, b: Entity) -> bool {
        let ignores = |volume: Entity, other: Entity| {
            self.ignored
                .get(volume)
                .is_ok_and(|contacts| contacts.contains(other))
        };
        ignores(a, b) || ignores(b, a)
    }
}

impl BevyPhysicsHooks for BodyContactFilter<'_, '_> {
    fn filter_contact_pair(&self, context: PairFilterContextView) -> Option<SolverFlags> {
        if self.ignores(context.collider1(), context.collider2()) {
            None
        } else {
            Some(SolverFlags::COMPUTE_IMPULSES)
        }
    }

    fn filter_intersection_pair(&self, context: PairFilterContextView) -> bool {
        !self.ignores(context.collider1(), context.collider2())
    }
}

/// Volume contacts seen since the last fixed tick.
#[derive(Resource, Debug, Default)]
pub struct PendingVolumeContacts(Vec<VolumeContact>);

impl PendingVolumeContacts {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Buffer Rapier collision events that involve a body volume.
fn buffer_volume_contacts(
    mut collision_events: EventReader<CollisionEvent>,
    q_volumes: Query<&BodyVolume>,
    mut pending: ResMut<PendingVolumeContacts>,
) {
    for event in collision_events.read() {
        let (a, b, flags, started) = match *event {
            CollisionEvent::Started(a, b, flags) => (a, b, flags, true),
            CollisionEvent::Stopped(a, b, flags) => (a, b, flags, false),
        };
        let trigger = flags.contains(CollisionEventFlags::SENSOR);

        for (volume, other) in [(a, b), (b, a)] {
            if let Ok(marker) = q_volumes.get(volume) {
                pending.0.push(VolumeContact {
                    body: marker.owner,
                    volume,
                    kind: marker.kind,
                    other,
                    started,
                    trigger,
                });
            }
        }
    }
}

/// Report buffered volume contacts to the body systems.
fn flush_volume_contacts(
    mut pending: ResMut<PendingVolumeContacts>,
    mut contacts: EventWriter<VolumeContact>,
) {
    if !pending.0.is_empty() {
        contacts.write_batch(pending.0.drain(..));
    }
}

/// Half segment length and radius of a capsule.
fn capsule_dimensions(capsule: &CapsuleView) -> (f32, f32) {
    let segment = capsule.segment();
    let half_height = (segment.a().y - segment.b().y).abs() / 2.0;
    (half_height, capsule.radius())
}

/// Build a Rapier query filter from the body filter.
fn rapier_filter(filter: &QueryFilterSpec) -> QueryFilter<'static> {
    let mut rapier_filter = QueryFilter::default().exclude_sensors();
    if let Some(body) = filter.exclude_body {
        rapier_filter = rapier_filter.exclude_rigid_body(body);
    }
    if let Some((memberships, filters)) = filter.groups {
        rapier_filter = rapier_filter.groups(CollisionGroups::new(
            Group::from_bits_truncate(memberships),
            Group::from_bits_truncate(filters),
        ));
    }
    rapier_filter
}

/// Perform a raycast using RapierContext.
fn rapier_raycast(context: &RapierContext, ray: RayCast, filter: &QueryFilterSpec) -> Option<CollisionData> {
    context
        .cast_ray_and_get_normal(
            ray.origin,
            ray.direction,
            ray.max_distance,
            true, // solid = true for solid hits
            rapier_filter(filter),
        )
        .map(|(hit_entity, hit)| CollisionData::new(hit.time_of_impact, hit.normal, hit.point, Some(hit_entity)))
}

/// Sweep a box using RapierContext.
///
/// The hit point lies under the box center on the bottom face of the box at
/// the time of impact.
fn rapier_box_cast(
    context: &RapierContext,
    center: Vec3,
    half_extents: Vec3,
    direction: Vec3,
    max_distance: f32,
    filter: &QueryFilterSpec,
) -> Option<CollisionData> {
    let direction = direction.normalize_or_zero();
    let shape = Collider::cuboid(half_extents.x, half_extents.y, half_extents.z);

    context
        .cast_shape(
            center,
            Quat::IDENTITY,
            direction,
            &shape,
            ShapeCastOptions {
                max_time_of_impact: max_distance,
                stop_at_penetration: false,
                ..default()
            },
            rapier_filter(filter),
        )
        .map(|(hit_entity, hit)| {
            let normal = hit.details.map(|d| d.normal1).unwrap_or(-direction);
            let hit_point = center + direction * hit.time_of_impact - Vec3::Y * half_extents.y;
            CollisionData::new(hit.time_of_impact, normal, hit_point, Some(hit_entity))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::ecs::system::RunSystemOnce;

    fn create_test_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(TransformPlugin);
        app.add_plugins(RapierPhysicsPlugin::<BodyContactFilter>::default());
        app.insert_resource(Time::<Fixed>::from_hz(60.0));
        app.finish();
        app.cleanup();
        app
    }

    #[test]
    fn rapier_backend_velocity() {
        let mut app = create_test_app();

        let entity = app
            .world_mut()
            .spawn((
                Transform::default(),
                RigidBody::Dynamic,
                Velocity::linear(Vec3::new(5.0, 3.0, 0.0)),
            ))
            .id();

        app.update();

        let vel = Rapier3dBackend::get_velocity(app.world(), entity);
        assert!((vel.x - 5.0).abs() < 0.5);

        Rapier3dBackend::set_velocity(app.world_mut(), entity, Vec3::new(1.0, 0.0, 0.0));
        Rapier3dBackend::apply_velocity_change(app.world_mut(), entity, Vec3::new(0.0, 0.0, 2.0));

        let vel = Rapier3dBackend::get_velocity(app.world(), entity);
        assert!((vel.x - 1.0).abs() < 0.01);
        assert!(vel.y.abs() < 0.01);
        assert!((vel.z - 2.0).abs() < 0.01);
    }

    #[test]
    fn ensure_body_only_creates_once() {
        let mut app = create_test_app();
        let play_area = app.world_mut().spawn(Transform::default()).id();

        assert!(Rapier3dBackend::ensure_body(app.world_mut(), play_area, 80.0));
        assert!(!Rapier3dBackend::ensure_body(app.world_mut(), play_area, 80.0));
        assert_eq!(app.world().get::<RigidBody>(play_area), Some(&RigidBody::Dynamic));

        Rapier3dBackend::set_kinematic(app.world_mut(), play_area, true);
        assert_eq!(
            app.world().get::<RigidBody>(play_area),
            Some(&RigidBody::KinematicPositionBased)
        );

        Rapier3dBackend::remove_body(app.world_mut(), play_area);
        assert!(app.world().get::<RigidBody>(play_area).is_none());
    }

    #[test]
    fn volume_capsule_and_sensor() {
        let mut app = create_test_app();
        let play_area = app.world_mut().spawn(Transform::default()).id();
        let volume = Rapier3dBackend::spawn_volume(app.world_mut(), play_area, VolumeKind::Body, 0.2);

        Rapier3dBackend::set_capsule(app.world_mut(), volume, Vec3::new(0.1, 0.8, 0.0), 1.4, 0.2);
        let transform = app.world().get::<Transform>(volume).unwrap();
        assert_eq!(transform.translation, Vec3::new(0.1, 0.8, 0.0));

        let collider = app.world().get::<Collider>(volume).unwrap();
        let (half_height, radius) = capsule_dimensions(&collider.as_capsule().unwrap());
        assert!((half_height - 0.5).abs() < 1e-5);
        assert!((radius - 0.2).abs() < 1e-5);

        Rapier3dBackend::set_sensor(app.world_mut(), volume, true);
        assert!(app.world().get::<Sensor>(volume).is_some());
        Rapier3dBackend::set_sensor(app.world_mut(), volume, false);
        assert!(app.world().get::<Sensor>(volume).is_none());
        assert!(Rapier3dBackend::is_collider(app.world(), volume));
    }

    #[test]
    fn ignored_contacts_are_idempotent() {
        let mut app = create_test_app();
        let volume = app.world_mut().spawn_empty().id();
        let other = app.world_mut().spawn_empty().id();

        Rapier3dBackend::set_collision_ignored(app.world_mut(), volume, other, true);
        Rapier3dBackend::set_collision_ignored(app.world_mut(), volume, other, true);
        assert_eq!(
            app.world().get::<IgnoredContacts>(volume),
            Some(&IgnoredContacts(vec![other]))
        );

        Rapier3dBackend::set_collision_ignored(app.world_mut(), volume, other, false);
        assert!(app.world().get::<IgnoredContacts>(volume).unwrap().0.is_empty());
    }

    fn contact_app() -> App {
        let mut app = App::new();
        app.add_event::<CollisionEvent>();
        app.add_event::<VolumeContact>();
        app.init_resource::<PendingVolumeContacts>();
        app
    }

    #[test]
    fn volume_contacts_survive_skipped_fixed_ticks() {
        let mut app = contact_app();
        let owner = app.world_mut().spawn_empty().id();
        let foot = app
            .world_mut()
            .spawn(BodyVolume {
                owner,
                kind: VolumeKind::Foot,
            })
            .id();
        let step = app.world_mut().spawn_empty().id();

        app.world_mut().send_event(CollisionEvent::Started(
            step,
            foot,
            CollisionEventFlags::SENSOR,
        ));
        app.world_mut().run_system_once(buffer_volume_contacts).unwrap();

        // Several rendered frames without a fixed tick
        for _ in 0..3 {
            app.world_mut().resource_mut::<Events<CollisionEvent>>().update();
        }
        assert!(app.world().resource::<Events<CollisionEvent>>().is_empty());
        assert_eq!(app.world().resource::<PendingVolumeContacts>().len(), 1);

        app.world_mut().run_system_once(flush_volume_contacts).unwrap();
        assert!(app.world().resource::<PendingVolumeContacts>().is_empty());

        let events = app.world().resource::<Events<VolumeContact>>();
        let contacts: Vec<VolumeContact> = events.iter_current_update_events().copied().collect();
        assert_eq!(
            contacts,
            vec![VolumeContact {
                body: owner,
                volume: foot,
                kind: VolumeKind::Foot,
                other: step,
                started: true,
                trigger: true,
            }]
        );
    }

    #[test]
    fn contacts_without_body_volume_are_dropped() {
        let mut app = contact_app();
        let a = app.world_mut().spawn_empty().id();
        let b = app.world_mut().spawn_empty().id();

        app.world_mut().send_event(CollisionEvent::Stopped(
            a,
            b,
            CollisionEventFlags::empty(),
        ));
        app.world_mut().run_system_once(buffer_volume_contacts).unwrap();

        assert!(app.world().resource::<PendingVolumeContacts>().is_empty());
    }

    #[test]
    fn raycast_hits_ground() {
        let mut app = create_test_app();
        let ground = app
            .world_mut()
            .spawn((Transform::from_xyz(0.0, -0.5, 0.0), Collider::cuboid(10.0, 0.5, 10.0)))
            .id();

        app.update();
        app.update();

        let hit = Rapier3dBackend::raycast(
            app.world_mut(),
            RayCast::down(Vec3::new(0.0, 2.0, 0.0)),
            &QueryFilterSpec::default(),
        )
        .unwrap();

        assert_eq!(hit.entity, Some(ground));
        assert!(hit.point.y.abs() < 0.01);
        assert!((hit.distance - 2.0).abs() < 0.01);
    }
}
