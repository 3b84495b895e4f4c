//! Step-up detection.
//!
//! When the foot volume physically bumps into something, a thin box is swept
//! down from just above the foot. A surface found higher than the step drop
//! threshold is stepped onto.

use bevy::prelude::*;

use crate::backend::BodyPhysicsBackend;
use crate::config::{STEP_CAST_HALF_THICKNESS, STEP_CAST_HEIGHT_FACTOR};
use crate::fall::{suspend_physics, teleport_fall};
use crate::systems::BodyFrame;
use crate::teleport;
use crate::volumes::VolumeGeometry;

/// Where the step sweep starts and how far it travels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepCast {
    pub start: Vec3,
    pub half_extents: Vec3,
    pub distance: f32,
}

impl StepCast {
    /// Sweep for a foot centered at `foot_center` (world space) on a play area
    /// at height `play_area_y`.
    pub fn new(foot_center: Vec3, step_offset: f32, body_radius: f32, play_area_y: f32) -> Self {
        let start = foot_center + Vec3::Y * (step_offset * 2.0 * STEP_CAST_HEIGHT_FACTOR);
        Self {
            start,
            half_extents: Vec3::new(body_radius, STEP_CAST_HALF_THICKNESS, body_radius),
            distance: start.y - play_area_y,
        }
    }
}

/// Look for a step in front of the foot and climb onto it.
pub(crate) fn check_step_up<B: BodyPhysicsBackend>(world: &mut World, frame: &mut BodyFrame) {
    let config = &frame.config;
    if !config.step.enabled() || frame.body.volumes.foot.is_none() || frame.body.is_falling() {
        return;
    }

    let foot_local = frame
        .body
        .volumes
        .foot_center()
        .or_else(|| VolumeGeometry::compute(config, frame.pose.head_local.translation).foot.map(|f| f.center));
    let Some(foot_local) = foot_local else {
        return;
    };

    let play_area = frame.pose.play_area_position();
    let cast = StepCast::new(
        frame.pose.to_world(foot_local),
        config.step_offset(),
        config.body_radius,
        play_area.y,
    );
    if cast.distance <= 0.0 {
        return;
    }

    let Some(hit) = B::box_cast(
        world,
        cast.start,
        cast.half_extents,
        Vec3::NEG_Y,
        cast.distance,
        &frame.filter(),
    ) else {
        return;
    };

    let step_height = hit.point.y - play_area.y;
    if step_height <= config.step.step_drop_threshold {
        return;
    }
    debug!("Body {} stepping up {:.3}", frame.entity, step_height);

    if teleport::teleporter_registered(world) && frame.config.enable_teleport {
        frame.body.floor.hit_floor_y_delta = play_area.y - hit.point.y;
        suspend_physics::<B>(world, &mut frame.body);
        teleport_fall::<B>(world, frame, hit.entity, hit.point);
        frame.body.floor.last_frame_floor_y = hit.point.y;
    } else {
        let head = frame.pose.head_position();
        let destination = Vec3::new(
            hit.point.x - (head.x - play_area.x),
            hit.point.y,
            hit.point.z - (head.z - play_area.z),
        );
        frame.pose.set_play_area_position(world, destination);
    }
}
