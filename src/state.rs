//! Body state.
//!
//! [`BodyPhysics`] is the central hub for the runtime state of one tracked
//! user. The mutually exclusive grounded/falling condition lives in a single
//! [`BodyState`] value, so a body can never be both at once.

use bevy::prelude::*;

use crate::config::BodyPhysicsConfig;
use crate::error::BodyPhysicsError;
use crate::fall::{FloorState, RetoggleLatch};
use crate::ignore::CollisionIgnoreSet;
use crate::standing::StandingTracker;
use crate::volumes::BodyVolumes;

/// An in-progress fall.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct FallSession {
    /// Body clock time the fall started at.
    pub started_at: f32,
    /// The fall cannot end before this time.
    pub min_elapsed_deadline: f32,
    /// Floor the body is falling towards.
    pub target_floor: Option<Entity>,
    /// Set when the body was taken off the ground on request; such a session
    /// only ends on request.
    pub held: bool,
}

/// Whether the body stands on a floor or is falling.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub enum BodyState {
    /// Standing on a floor.
    Grounded {
        /// Head has moved away from the standing position.
        moving: bool,
        /// Head is leaning over an edge.
        leaning: bool,
    },
    /// Falling towards a floor.
    Falling(FallSession),
}

impl Default for BodyState {
    fn default() -> Self {
        BodyState::Grounded {
            moving: false,
            leaning: false,
        }
    }
}

impl BodyState {
    /// Whether the body is on the ground.
    #[inline]
    pub fn on_ground(&self) -> bool {
        matches!(self, BodyState::Grounded { .. })
    }

    /// Whether the body is falling.
    #[inline]
    pub fn is_falling(&self) -> bool {
        matches!(self, BodyState::Falling(_))
    }

    /// Whether the head is moving while grounded.
    #[inline]
    pub fn is_moving(&self) -> bool {
        matches!(self, BodyState::Grounded { moving: true, .. })
    }

    /// Whether the head is leaning over an edge while grounded.
    #[inline]
    pub fn is_leaning(&self) -> bool {
        matches!(self, BodyState::Grounded { leaning: true, .. })
    }

    /// The active fall session, if any.
    pub fn fall_session(&self) -> Option<&FallSession> {
        match self {
            BodyState::Falling(session) => Some(session),
            BodyState::Grounded { .. } => None,
        }
    }
}

/// Runtime state of body physics for one tracked rig.
///
/// Spawn it together with a [`BodyPhysicsConfig`](crate::config::BodyPhysicsConfig)
/// and a [`TrackedRig`](crate::pose::TrackedRig). The body activates on the
/// first tick its rig resolves.
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
#[require(BodyPhysicsConfig)]
pub struct BodyPhysics {
    pub(crate) state: BodyState,
    pub(crate) active: bool,

    // === Owned volumes and physics body ===
    pub(crate) volumes: BodyVolumes,
    /// Last value applied by `toggle_physics`; `None` before the first toggle.
    pub(crate) physics_enabled: Option<bool>,
    /// Collision setting last seen on the config.
    pub(crate) applied_collision_setting: Option<bool>,
    /// Collision setting restored when a fall ends.
    pub(crate) session_collisions: bool,

    // === Standing position and floor ===
    pub(crate) standing: StandingTracker,
    pub(crate) floor: FloorState,
    pub(crate) latch: RetoggleLatch,
    pub(crate) stored_current_physics: bool,
    pub(crate) reset_physics_after_teleport: bool,
    pub(crate) prevent_snap_to_floor: bool,

    // === Play area motion ===
    pub(crate) last_play_area_position: Vec3,
    pub(crate) play_area_velocity: Vec3,
    /// Seconds of fixed ticks since activation.
    pub(crate) clock: f32,

    // === Collisions ===
    #[reflect(ignore)]
    pub(crate) ignored: CollisionIgnoreSet,
    pub(crate) contacts: Vec<Entity>,
    pub(crate) colliding_with: Option<Entity>,

    #[reflect(ignore)]
    pub(crate) reported_error: Option<BodyPhysicsError>,
}

impl BodyPhysics {
    /// Create an inactive body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> BodyState {
        self.state
    }

    /// Whether the body has resolved its rig and created its volumes.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the body is falling.
    pub fn is_falling(&self) -> bool {
        self.state.is_falling()
    }

    /// Whether the user's head is moving away from the standing position.
    pub fn is_moving(&self) -> bool {
        self.state.is_moving()
    }

    /// Whether the user is leaning over an edge.
    pub fn is_leaning(&self) -> bool {
        self.state.is_leaning()
    }

    /// Whether the body is on the ground.
    pub fn on_ground(&self) -> bool {
        self.state.on_ground()
    }

    /// Whether the physics body is dynamic and the volumes solid.
    pub fn physics_enabled(&self) -> bool {
        self.physics_enabled.unwrap_or(false)
    }

    /// Whether a fall was held back by the controller restriction and will be
    /// re-examined on the next tick.
    pub fn is_fall_restricted(&self) -> bool {
        self.latch.armed
    }

    /// Whether floor snapping is currently suppressed on request.
    pub fn snap_to_floor_prevented(&self) -> bool {
        self.prevent_snap_to_floor
    }

    /// Where the user is considered to be standing, on the ground plane.
    pub fn standing_position(&self) -> Vec2 {
        self.standing.position
    }

    /// Floor object under the standing position.
    pub fn current_floor(&self) -> Option<Entity> {
        self.floor.current_valid_floor
    }

    /// Object the body is currently colliding with.
    pub fn colliding_with(&self) -> Option<Entity> {
        self.colliding_with
    }

    /// Whether any foreign collider touches a body volume.
    pub fn is_colliding(&self) -> bool {
        !self.contacts.is_empty()
    }

    /// Play area velocity measured over the last tick.
    pub fn play_area_velocity(&self) -> Vec3 {
        self.play_area_velocity
    }

    /// Body volume entity.
    pub fn body_volume(&self) -> Option<Entity> {
        self.volumes.body
    }

    /// Foot volume entity.
    pub fn foot_volume(&self) -> Option<Entity> {
        self.volumes.foot
    }

    /// Entities whose colliders are currently ignored by the body volumes.
    pub fn ignored_objects(&self) -> impl Iterator<Item = Entity> + '_ {
        self.ignored.objects()
    }
}

/// Marker component indicating the body is on the ground.
///
/// Kept in sync with [`BodyPhysics`] at the end of every tick. Mutually
/// exclusive with [`Falling`].
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct OnGround;

/// Marker component indicating the body is falling.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Falling;

/// Sync the [`OnGround`]/[`Falling`] markers with the body state.
pub fn sync_state_markers(
    mut commands: Commands,
    q_bodies: Query<(Entity, &BodyPhysics, Has<OnGround>, Has<Falling>)>,
) {
    for (entity, body, has_ground, has_falling) in &q_bodies {
        if body.on_ground() && !has_ground {
            commands.entity(entity).insert(OnGround).remove::<Falling>();
        } else if body.is_falling() && !has_falling {
            commands.entity(entity).insert(Falling).remove::<OnGround>();
        }
    }
}
