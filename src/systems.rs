//! Core body physics systems.
//!
//! These systems drive every body through the fixed tick phases. They are
//! generic over the physics backend to allow different physics engines to be
//! used. Each system works on a [`BodyFrame`]: a copy of a body's state,
//! configuration and rig poses that is written back once the body has been
//! processed.

use bevy::ecs::event::EventCursor;
use bevy::prelude::*;

use crate::backend::BodyPhysicsBackend;
use crate::collision::QueryFilterSpec;
use crate::config::BodyPhysicsConfig;
use crate::events::{emit, read_new, BodyCommand, BodyEventKind, BodyPhysicsRequest, VolumeContact};
use crate::fall::{check_falling, finish_teleport, reset_falling, snap_to_nearest_floor, toggle_on_ground, toggle_prevent_snap_to_floor};
use crate::grab::{is_grabbed, GrabEnded, GrabStarted};
use crate::ignore::{ignore_object, reset_ignored, reset_ignored_collisions, restore_object};
use crate::pose::{RigPose, TrackedRig};
use crate::standing::{track_standing, StandingTracker};
use crate::state::BodyPhysics;
use crate::step::check_step_up;
use crate::teleport::TeleportCompleted;
use crate::velocity::{apply_body_velocity, reset_velocities};
use crate::volumes::{ensure_volumes, toggle_physics, update_geometry, VolumeKind};

/// A body checked out of the world for one processing step.
pub(crate) struct BodyFrame {
    pub entity: Entity,
    pub body: BodyPhysics,
    pub config: BodyPhysicsConfig,
    pub rig: TrackedRig,
    pub pose: RigPose,
}

impl BodyFrame {
    /// Copy a body out of the world and resolve its rig.
    ///
    /// A rig that cannot be resolved is logged once per distinct error and
    /// leaves the body untouched.
    pub(crate) fn checkout(world: &mut World, entity: Entity) -> Option<Self> {
        let body = world.get::<BodyPhysics>(entity)?.clone();
        let config = world
            .get::<BodyPhysicsConfig>(entity)
            .cloned()
            .unwrap_or_default();
        let rig = world.get::<TrackedRig>(entity).copied().unwrap_or_default();

        match RigPose::read(world, &rig) {
            Ok(pose) => {
                let mut frame = Self {
                    entity,
                    body,
                    config,
                    rig,
                    pose,
                };
                if frame.body.reported_error.take().is_some() {
                    info!("Body physics on {entity} resolved its rig");
                }
                Some(frame)
            }
            Err(err) => {
                if body.reported_error != Some(err) {
                    warn!("Body physics on {entity} is inactive: {err}");
                    if let Some(mut body) = world.get_mut::<BodyPhysics>(entity) {
                        body.reported_error = Some(err);
                    }
                }
                None
            }
        }
    }

    /// Write the body state and any configuration change back to the world.
    pub(crate) fn commit(self, world: &mut World) {
        if let Some(mut body) = world.get_mut::<BodyPhysics>(self.entity) {
            *body = self.body;
        }
        if let Some(mut config) = world.get_mut::<BodyPhysicsConfig>(self.entity) {
            config.set_if_neq(self.config);
        }
    }

    /// Filter for every query made on behalf of this body.
    pub(crate) fn filter(&self) -> QueryFilterSpec {
        QueryFilterSpec::excluding(self.pose.play_area).with_groups(self.config.raycast_groups)
    }
}

/// Run `f` on an active body and write the result back.
///
/// Returns `None` if the entity has no active body or its rig cannot be resolved.
pub(crate) fn with_body<R>(
    world: &mut World,
    entity: Entity,
    f: impl FnOnce(&mut World, &mut BodyFrame) -> R,
) -> Option<R> {
    if !world.get::<BodyPhysics>(entity)?.is_active() {
        return None;
    }
    let mut frame = BodyFrame::checkout(world, entity)?;
    let result = f(world, &mut frame);
    frame.commit(world);
    Some(result)
}

fn bodies(world: &mut World, active: bool) -> Vec<Entity> {
    world
        .query::<(Entity, &BodyPhysics)>()
        .iter(world)
        .filter(|(_, body)| body.is_active() == active)
        .map(|(entity, _)| entity)
        .collect()
}

fn for_each_active_body(world: &mut World, mut f: impl FnMut(&mut World, &mut BodyFrame)) {
    for entity in bodies(world, true) {
        with_body(world, entity, &mut f);
    }
}

/// Activate bodies whose rig has resolved.
///
/// Creates the physics body and missing volumes, starts the standing position
/// at the head and applies the configured collision setting.
pub fn activate_bodies<B: BodyPhysicsBackend>(world: &mut World) {
    for entity in bodies(world, false) {
        let Some(mut frame) = BodyFrame::checkout(world, entity) else {
            continue;
        };
        activate::<B>(world, &mut frame);
        frame.commit(world);
    }
}

fn activate<B: BodyPhysicsBackend>(world: &mut World, frame: &mut BodyFrame) {
    ensure_volumes::<B>(world, frame);

    frame.body.standing = StandingTracker::new(frame.pose.head_planar());
    frame.body.last_play_area_position = frame.pose.play_area_position();

    let enabled = frame.config.enable_body_collisions;
    frame.body.session_collisions = enabled;
    frame.body.applied_collision_setting = Some(enabled);
    toggle_physics::<B>(world, &mut frame.body, enabled);

    reset_ignored::<B>(world, &mut frame.body, &frame.config);
    update_geometry::<B>(world, frame);
    frame.body.active = true;

    info!(
        "Body physics active on {} (play area {})",
        frame.entity, frame.pose.play_area
    );
}

/// Handle contacts reported for the body volumes.
///
/// Body volume contacts maintain the colliding object. Physical foot contacts
/// trigger step-up detection.
pub fn process_contacts<B: BodyPhysicsBackend>(
    world: &mut World,
    mut cursor: Local<EventCursor<VolumeContact>>,
) {
    for contact in read_new(world, &mut *cursor) {
        with_body(world, contact.body, |world, frame| {
            if !frame.body.volumes.contains(contact.volume) || frame.body.volumes.contains(contact.other) {
                return;
            }
            match contact.kind {
                VolumeKind::Body => track_colliding(world, frame, contact.other, contact.started),
                VolumeKind::Foot => {
                    if contact.started && !contact.trigger {
                        check_step_up::<B>(world, frame);
                    }
                }
            }
        });
    }
}

fn track_colliding(world: &mut World, frame: &mut BodyFrame, other: Entity, started: bool) {
    let body = &mut frame.body;
    if started {
        if !body.contacts.contains(&other) {
            body.contacts.push(other);
        }
        if body.colliding_with.is_none() {
            body.colliding_with = Some(other);
            emit(world, frame.entity, BodyEventKind::StartColliding, Some(other));
        }
    } else {
        body.contacts.retain(|&e| e != other);
        if body.colliding_with == Some(other) {
            body.colliding_with = None;
            emit(world, frame.entity, BodyEventKind::StopColliding, Some(other));
        }
    }
}

/// Apply teleport completions and queued body requests.
pub fn process_requests<B: BodyPhysicsBackend>(
    world: &mut World,
    mut requests: Local<EventCursor<BodyPhysicsRequest>>,
    mut completed: Local<EventCursor<TeleportCompleted>>,
) {
    for done in read_new(world, &mut *completed) {
        with_body(world, done.body, finish_teleport::<B>);
    }
    for request in read_new(world, &mut *requests) {
        run_command::<B>(world, request);
    }
}

/// Run a body command immediately.
pub fn run_command<B: BodyPhysicsBackend>(world: &mut World, request: BodyPhysicsRequest) {
    let body = request.body;
    match request.command {
        BodyCommand::ApplyVelocity {
            velocity,
            force_physics_on,
            apply_momentum,
        } => apply_body_velocity::<B>(world, body, velocity, force_physics_on, apply_momentum),
        BodyCommand::ToggleOnGround(on_ground) => toggle_on_ground(world, body, on_ground),
        BodyCommand::TogglePreventSnapToFloor(prevent) => toggle_prevent_snap_to_floor(world, body, prevent),
        BodyCommand::ResetVelocities => reset_velocities::<B>(world, body),
        BodyCommand::ResetFalling => reset_falling(world, body),
        BodyCommand::ResetIgnoredCollisions => reset_ignored_collisions::<B>(world, body),
    }
}

/// Re-apply the collision setting when it changed at runtime.
pub fn check_collision_setting<B: BodyPhysicsBackend>(world: &mut World) {
    for_each_active_body(world, |world, frame| {
        let enabled = frame.config.enable_body_collisions;
        if frame.body.applied_collision_setting != Some(enabled) {
            toggle_physics::<B>(world, &mut frame.body, enabled);
            frame.body.applied_collision_setting = Some(enabled);
        }
        if frame.body.on_ground() {
            frame.body.session_collisions = enabled;
        }
    });
}

/// Track the standing position and snap to the floor, or finish a fall.
pub fn manage_falling<B: BodyPhysicsBackend>(world: &mut World) {
    for_each_active_body(world, |world, frame| {
        if frame.body.is_falling() {
            check_falling(world, frame);
        } else {
            track_standing::<B>(world, frame);
            snap_to_nearest_floor::<B>(world, frame);
        }
    });
}

/// Measure play area velocity and advance the body clock.
pub fn track_play_area_velocity<B: BodyPhysicsBackend>(world: &mut World) {
    let dt = B::get_fixed_timestep(world);
    for_each_active_body(world, |_, frame| {
        let position = frame.pose.play_area_position();
        frame.body.play_area_velocity = (position - frame.body.last_play_area_position) / dt;
        frame.body.last_play_area_position = position;
        frame.body.clock += dt;
    });
}

/// Fit the body volumes to the current head pose.
pub fn update_volume_geometry<B: BodyPhysicsBackend>(world: &mut World) {
    for_each_active_body(world, update_geometry::<B>);
}

/// Ignore grabbed objects and restore released ones a frame later.
///
/// Runs once per rendered frame. A release queues a restore; the restore
/// happens on the next run unless the object was grabbed again.
pub fn track_grabbed_objects<B: BodyPhysicsBackend>(
    world: &mut World,
    mut started: Local<EventCursor<GrabStarted>>,
    mut ended: Local<EventCursor<GrabEnded>>,
) {
    let started = read_new(world, &mut *started);
    let ended = read_new(world, &mut *ended);

    for_each_active_body(world, |world, frame| {
        for grab in &started {
            frame.body.ignored.cancel_restore(grab.object);
            if frame.config.ignore_grabbed_collisions {
                ignore_object::<B>(world, &mut frame.body, grab.object);
            }
        }

        for object in frame.body.ignored.take_pending() {
            if !is_grabbed(world, object) {
                restore_object::<B>(world, &mut frame.body, object);
            }
        }

        for release in &ended {
            if !frame.config.ignore_collisions_with.contains(&release.object) {
                frame.body.ignored.defer_restore(release.object);
            }
        }
    });
}
