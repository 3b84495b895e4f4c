//! Shared test harness: an in-memory physics backend and rig helpers.
//!
//! Floors are axis-aligned boxes, so ray casts and step sweeps are exact and
//! every scenario is deterministic.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use vr_body_physics::backend::{BodyPhysicsBackend, NoOpBackendPlugin};
use vr_body_physics::collision::{CollisionData, QueryFilterSpec, RayCast};
use vr_body_physics::prelude::*;

/// Solid box centered on the entity's translation.
#[derive(Component, Debug, Clone, Copy)]
pub struct MockFloor {
    pub half_extents: Vec3,
}

/// Physics body created by the mock backend.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct MockBody {
    pub kinematic: bool,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f32,
}

/// Capsule volume created by the mock backend.
#[derive(Component, Debug, Clone, Copy)]
pub struct MockVolume {
    pub kind: VolumeKind,
    pub center: Vec3,
    pub height: f32,
    pub radius: f32,
    pub sensor: bool,
}

/// Collider pairs set to ignore each other.
#[derive(Resource, Debug, Default)]
pub struct MockContacts {
    pub ignored: Vec<(Entity, Entity)>,
}

pub struct MockBackend;

fn floor_boxes(world: &mut World) -> Vec<(Entity, Vec3, Vec3)> {
    world
        .query::<(Entity, &Transform, &MockFloor)>()
        .iter(world)
        .map(|(e, t, f)| (e, t.translation, f.half_extents))
        .collect()
}

/// Slab test of a ray against a box. Returns distance and normal.
fn ray_box(ray: &RayCast, center: Vec3, half: Vec3) -> Option<(f32, Vec3)> {
    let min = center - half;
    let max = center + half;
    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    for axis in 0..3 {
        let origin = ray.origin[axis];
        let dir = ray.direction[axis];
        if dir.abs() < 1e-9 {
            if origin < min[axis] || origin > max[axis] {
                return None;
            }
            continue;
        }
        let t1 = (min[axis] - origin) / dir;
        let t2 = (max[axis] - origin) / dir;
        let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
        if near > t_enter {
            t_enter = near;
            normal = Vec3::ZERO;
            normal[axis] = -dir.signum();
        }
        t_exit = t_exit.min(far);
    }

    (t_enter >= 0.0 && t_enter <= t_exit && t_enter <= ray.max_distance).then_some((t_enter, normal))
}

impl BodyPhysicsBackend for MockBackend {
    fn plugin() -> impl Plugin {
        NoOpBackendPlugin
    }

    fn raycast(world: &mut World, ray: RayCast, _filter: &QueryFilterSpec) -> Option<CollisionData> {
        floor_boxes(world)
            .into_iter()
            .filter_map(|(entity, center, half)| {
                ray_box(&ray, center, half).map(|(distance, normal)| {
                    CollisionData::new(distance, normal, ray.point_at(distance), Some(entity))
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn box_cast(
        world: &mut World,
        center: Vec3,
        half_extents: Vec3,
        _direction: Vec3,
        max_distance: f32,
        _filter: &QueryFilterSpec,
    ) -> Option<CollisionData> {
        let bottom = center.y - half_extents.y;
        floor_boxes(world)
            .into_iter()
            .filter(|(_, c, h)| {
                (center.x - c.x).abs() <= half_extents.x + h.x && (center.z - c.z).abs() <= half_extents.z + h.z
            })
            .filter_map(|(entity, c, h)| {
                let top = c.y + h.y;
                let distance = bottom - top;
                (distance >= 0.0 && distance <= max_distance).then(|| {
                    CollisionData::new(distance, Vec3::Y, Vec3::new(center.x, top, center.z), Some(entity))
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn ensure_body(world: &mut World, play_area: Entity, mass: f32) -> bool {
        if world.get::<MockBody>(play_area).is_some() {
            return false;
        }
        world.entity_mut(play_area).insert(MockBody { mass, ..default() });
        true
    }

    fn remove_body(world: &mut World, play_area: Entity) {
        world.entity_mut(play_area).remove::<MockBody>();
    }

    fn spawn_volume(world: &mut World, play_area: Entity, kind: VolumeKind, radius: f32) -> Entity {
        world
            .spawn((
                MockVolume {
                    kind,
                    center: Vec3::ZERO,
                    height: 0.0,
                    radius,
                    sensor: false,
                },
                ChildOf(play_area),
            ))
            .id()
    }

    fn set_capsule(world: &mut World, volume: Entity, center: Vec3, height: f32, radius: f32) {
        if let Some(mut v) = world.get_mut::<MockVolume>(volume) {
            v.center = center;
            v.height = height;
            v.radius = radius;
        }
    }

    fn set_kinematic(world: &mut World, play_area: Entity, kinematic: bool) {
        if let Some(mut body) = world.get_mut::<MockBody>(play_area) {
            body.kinematic = kinematic;
        }
    }

    fn set_sensor(world: &mut World, volume: Entity, sensor: bool) {
        if let Some(mut v) = world.get_mut::<MockVolume>(volume) {
            v.sensor = sensor;
        }
    }

    fn set_collision_ignored(world: &mut World, volume: Entity, other: Entity, ignored: bool) {
        let mut contacts = world.resource_mut::<MockContacts>();
        let pair = (volume, other);
        if ignored {
            if !contacts.ignored.contains(&pair) {
                contacts.ignored.push(pair);
            }
        } else {
            contacts.ignored.retain(|p| *p != pair);
        }
    }

    fn is_collider(world: &World, entity: Entity) -> bool {
        world.get::<MockFloor>(entity).is_some() || world.get::<MockVolume>(entity).is_some()
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world.get::<MockBody>(entity).map(|b| b.velocity).unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut body) = world.get_mut::<MockBody>(entity) {
            body.velocity = velocity;
        }
    }

    fn apply_velocity_change(world: &mut World, entity: Entity, delta: Vec3) {
        if let Some(mut body) = world.get_mut::<MockBody>(entity) {
            body.velocity += delta;
        }
    }

    fn get_angular_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<MockBody>(entity)
            .map(|b| b.angular_velocity)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_angular_velocity(world: &mut World, entity: Entity, angular_velocity: Vec3) {
        if let Some(mut body) = world.get_mut::<MockBody>(entity) {
            body.angular_velocity = angular_velocity;
        }
    }
}

/// Teleport service that records every request together with the fade in effect.
#[derive(Clone, Default)]
pub struct MockTeleporter {
    pub fade: f32,
    pub requests: Arc<Mutex<Vec<(TeleportRequest, f32)>>>,
}

impl MockTeleporter {
    pub fn new(fade: f32) -> Self {
        Self {
            fade,
            requests: default(),
        }
    }

    pub fn requests(&self) -> Vec<(TeleportRequest, f32)> {
        self.requests.lock().unwrap().clone()
    }
}

impl TeleportService for MockTeleporter {
    fn valid_location(&self, _target: Option<Entity>, _point: Vec3) -> bool {
        true
    }

    fn fade_duration(&self) -> f32 {
        self.fade
    }

    fn set_fade_duration(&mut self, seconds: f32) {
        self.fade = seconds;
    }

    fn request_move(&mut self, request: TeleportRequest) {
        self.requests.lock().unwrap().push((request, self.fade));
    }
}

/// Create a minimal test app with the mock backend and body physics.
pub fn create_test_app() -> App {
    let mut app = App::new();

    app.add_plugins(MinimalPlugins);
    app.add_plugins(TransformPlugin);
    app.add_plugins(BodyPhysicsPlugin::<MockBackend>::default());
    app.init_resource::<MockContacts>();

    app.finish();
    app.cleanup();
    app
}

/// Register a recording teleport service.
pub fn install_teleporter(app: &mut App) -> MockTeleporter {
    let teleporter = MockTeleporter::new(0.5);
    app.insert_resource(Teleporter::new(teleporter.clone()));
    teleporter
}

/// Run one fixed physics tick.
pub fn tick(app: &mut App) {
    app.world_mut().run_schedule(FixedUpdate);
}

/// Run N fixed physics ticks.
pub fn run_ticks(app: &mut App, ticks: usize) {
    for _ in 0..ticks {
        tick(app);
    }
}

/// Run one rendered frame.
pub fn frame(app: &mut App) {
    app.world_mut().run_schedule(Update);
}

/// Spawn a floor whose top surface is at `top`, centered on `center` in x/z.
pub fn spawn_floor(app: &mut App, center: Vec2, half_size: Vec2, top: f32) -> Entity {
    app.world_mut()
        .spawn((
            Transform::from_xyz(center.x, top - 0.5, center.y),
            MockFloor {
                half_extents: Vec3::new(half_size.x, 0.5, half_size.y),
            },
        ))
        .id()
}

/// Move a floor so its top surface is at `top`.
pub fn set_floor_top(app: &mut App, floor: Entity, top: f32) {
    let half = app.world().get::<MockFloor>(floor).unwrap().half_extents;
    app.world_mut().get_mut::<Transform>(floor).unwrap().translation.y = top - half.y;
}

/// Entities of a spawned rig.
#[derive(Debug, Clone, Copy)]
pub struct Rig {
    pub body: Entity,
    pub play_area: Entity,
    pub head: Entity,
    pub left: Entity,
    pub right: Entity,
}

/// Spawn a play area at the origin with a head and two controllers.
pub fn spawn_rig(app: &mut App, head_local: Vec3, config: BodyPhysicsConfig) -> Rig {
    let world = app.world_mut();
    let play_area = world.spawn(Transform::default()).id();
    let head = world.spawn(Transform::from_translation(head_local)).id();
    let left = world
        .spawn(Transform::from_translation(head_local + Vec3::new(-0.3, -0.6, 0.0)))
        .id();
    let right = world
        .spawn(Transform::from_translation(head_local + Vec3::new(0.3, -0.6, 0.0)))
        .id();
    let body = world
        .spawn((
            BodyPhysics::new(),
            config,
            TrackedRig::new(play_area, head).with_controllers(left, right),
        ))
        .id();

    Rig {
        body,
        play_area,
        head,
        left,
        right,
    }
}

/// Set a tracked device pose relative to the play area.
pub fn set_local(app: &mut App, entity: Entity, local: Vec3) {
    app.world_mut().get_mut::<Transform>(entity).unwrap().translation = local;
}

pub fn body(app: &App, rig: &Rig) -> BodyPhysics {
    app.world().get::<BodyPhysics>(rig.body).unwrap().clone()
}

pub fn mock_body(app: &App, rig: &Rig) -> MockBody {
    *app.world().get::<MockBody>(rig.play_area).unwrap()
}

/// Every body event written so far.
pub fn body_events(app: &App) -> Vec<BodyPhysicsEvent> {
    let events = app.world().resource::<Events<BodyPhysicsEvent>>();
    let mut cursor = events.get_cursor();
    cursor.read(events).copied().collect()
}

pub fn count_events(app: &App, kind: BodyEventKind) -> usize {
    body_events(app).iter().filter(|e| e.kind == kind).count()
}
