//! Standing position, head movement and lean detection.
//!
//! The standing position is where the user is considered to be based. It
//! follows the play area when the play area moves, and only jumps to the head
//! once a full history of head samples agrees on where the user stands.

use bevy::prelude::*;

use crate::backend::BodyPhysicsBackend;
use crate::collision::RayCast;
use crate::config::{LEAN_FORWARD_LENGTH_ADDITION, LEAN_PLAY_AREA_THRESHOLD};
use crate::events::{emit, BodyEventKind};
use crate::state::BodyState;
use crate::systems::BodyFrame;
use crate::volumes::toggle_physics;

/// Standing position on the ground plane and the head samples gating its reset.
#[derive(Reflect, Debug, Clone, Default, PartialEq)]
pub struct StandingTracker {
    /// Ground plane position, `(x, z)` in world space.
    pub position: Vec2,
    history: Vec<Vec2>,
}

impl StandingTracker {
    /// Start tracking at `position`.
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            history: Vec::new(),
        }
    }

    /// Move the standing position along with the play area.
    pub fn carry(&mut self, delta: Vec2) {
        self.position += delta;
    }

    /// Planar distance from the standing position to `head`.
    pub fn distance_to(&self, head: Vec2) -> f32 {
        self.position.distance(head)
    }

    /// Number of samples collected since the history was last cleared.
    pub fn samples(&self) -> usize {
        self.history.len()
    }

    /// Record a head sample.
    ///
    /// Once `capacity` samples are collected, the standing position resets to
    /// `sample` if every pair of samples lies within `threshold` of each other
    /// and `allow_reset` is set. The history is cleared either way. Returns
    /// whether the position was reset.
    pub fn record(&mut self, sample: Vec2, capacity: usize, threshold: f32, allow_reset: bool) -> bool {
        self.history.push(sample);
        if self.history.len() < capacity.max(1) {
            return false;
        }

        let stable = self.history.iter().enumerate().all(|(i, a)| {
            self.history[i + 1..]
                .iter()
                .all(|b| a.distance(*b) <= threshold)
        });
        let reset = stable && allow_reset;
        if reset {
            self.position = sample;
        }
        self.history.clear();
        reset
    }
}

/// Result of probing for a lean over an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct LeanProbe {
    leaning: bool,
    moving: bool,
}

/// Update the standing position, movement and lean state of a grounded body.
pub(crate) fn track_standing<B: BodyPhysicsBackend>(world: &mut World, frame: &mut BodyFrame) {
    let BodyState::Grounded {
        moving: was_moving, ..
    } = frame.body.state
    else {
        return;
    };

    let play_area_delta = frame.pose.play_area_position() - frame.body.last_play_area_position;
    let play_area_moved = play_area_delta.length();
    frame.body.standing.carry(play_area_delta.xz());

    let head = frame.pose.head_planar();
    let mut moving = frame.body.standing.distance_to(head) > frame.config.movement_threshold;
    if play_area_moved > frame.config.play_area_movement_threshold {
        moving = false;
    }

    let probe = probe_lean::<B>(world, frame, play_area_moved);
    let moving = moving || probe.moving;
    frame.body.state = BodyState::Grounded {
        moving,
        leaning: probe.leaning,
    };

    let allow_reset = !probe.leaning && frame.body.contacts.is_empty();
    let capacity = frame.config.standing_history_samples;
    let threshold = frame.config.movement_threshold;
    frame.body.standing.record(head, capacity, threshold, allow_reset);

    if moving != was_moving {
        if frame.config.enable_body_collisions {
            toggle_physics::<B>(world, &mut frame.body, !moving);
        }
        let kind = if moving {
            BodyEventKind::StartMoving
        } else {
            BodyEventKind::StopMoving
        };
        emit(world, frame.entity, kind, None);
    }
}

/// Compare the floor under the standing position with the floor just in front
/// of the head.
///
/// Also records the floor under the standing position as the current valid floor.
fn probe_lean<B: BodyPhysicsBackend>(world: &mut World, frame: &mut BodyFrame, play_area_moved: f32) -> LeanProbe {
    let filter = frame.filter();
    let head = frame.pose.head_position();
    let standing = frame.body.standing.position;

    let standing_hit = B::raycast(world, RayCast::down(Vec3::new(standing.x, head.y, standing.y)), &filter);
    frame.body.floor.current_valid_floor = standing_hit.and_then(|hit| hit.entity);
    let Some(standing_hit) = standing_hit else {
        return LeanProbe::default();
    };

    // Forward ray stays horizontal: headset pitch and roll are dropped.
    let (yaw, _, _) = frame.pose.head.rotation.to_euler(EulerRot::YXZ);
    let forward = Quat::from_rotation_y(yaw) * Vec3::NEG_Z;
    let length = frame.config.body_radius + LEAN_FORWARD_LENGTH_ADDITION;
    let forward_ray = RayCast::new(head, forward, length);
    if B::raycast(world, forward_ray, &filter).is_some() {
        return LeanProbe::default();
    }

    let Some(forward_hit) = B::raycast(world, RayCast::down(forward_ray.point_at(length)), &filter) else {
        return LeanProbe::default();
    };

    let diff = forward_hit.distance - standing_hit.distance;
    if diff > frame.config.lean_y_threshold {
        LeanProbe {
            leaning: true,
            moving: false,
        }
    } else {
        LeanProbe {
            leaning: false,
            moving: diff > 0.0 && play_area_moved <= LEAN_PLAY_AREA_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_follows_play_area() {
        let mut tracker = StandingTracker::new(Vec2::new(1.0, 1.0));
        tracker.carry(Vec2::new(0.5, -1.0));
        assert_eq!(tracker.position, Vec2::new(1.5, 0.0));
    }

    #[test]
    fn resets_after_stable_history() {
        let mut tracker = StandingTracker::new(Vec2::ZERO);
        let head = Vec2::new(0.4, 0.0);

        for _ in 0..4 {
            assert!(!tracker.record(head, 5, 0.0015, true));
            assert_eq!(tracker.position, Vec2::ZERO);
        }
        assert!(tracker.record(head, 5, 0.0015, true));
        assert_eq!(tracker.position, head);
        assert_eq!(tracker.samples(), 0);
    }

    #[test]
    fn unstable_history_never_resets() {
        let mut tracker = StandingTracker::new(Vec2::ZERO);

        for i in 0..20 {
            let head = Vec2::new(i as f32 * 0.01, 0.0);
            assert!(!tracker.record(head, 5, 0.0015, true));
        }
        assert_eq!(tracker.position, Vec2::ZERO);
    }

    #[test]
    fn blocked_reset_still_clears_history() {
        let mut tracker = StandingTracker::new(Vec2::ZERO);
        let head = Vec2::new(0.4, 0.0);

        for _ in 0..5 {
            tracker.record(head, 5, 0.0015, false);
        }
        assert_eq!(tracker.position, Vec2::ZERO);
        assert_eq!(tracker.samples(), 0);
    }

    #[test]
    fn samples_compare_pairwise() {
        let mut tracker = StandingTracker::new(Vec2::ZERO);
        // Each neighbour is within the threshold, the ends are not.
        let samples = [0.0, 0.001, 0.002, 0.003];
        for x in samples {
            tracker.record(Vec2::new(x, 0.0), 4, 0.0015, true);
        }
        assert_eq!(tracker.position, Vec2::ZERO);
    }
}
