//! Body physics configuration components.
//!
//! This module defines the tunables for the body volumes, the standing
//! position tracker, floor snapping, fall restriction and step-up.

use bevy::prelude::*;

/// Vertical padding added to the body volume center so it never rests exactly
/// on the play area floor.
pub const PLAY_AREA_HEIGHT_ADJUSTMENT: f32 = 0.009;

/// Distance beyond the body radius probed by the forward lean ray.
pub const LEAN_FORWARD_LENGTH_ADDITION: f32 = 0.05;

/// Play area movement above which a lean probe can no longer mark the user as walking.
pub const LEAN_PLAY_AREA_THRESHOLD: f32 = 0.002;

/// Constant downward velocity added to every applied body velocity.
pub const GRAVITY_PUSH: f32 = -0.001;

/// Vertical tolerance for a controller to count as still over the previous floor.
pub const CONTROLLER_DROP_TOLERANCE: f32 = 0.05;

/// Number of fixed ticks a fall lasts at minimum.
pub const FALL_MIN_TICKS: f32 = 3.0;

/// Share of the doubled step offset the step-up sweep starts above the foot.
pub const STEP_CAST_HEIGHT_FACTOR: f32 = 0.55;

/// Half thickness of the step-up sweep box.
pub const STEP_CAST_HALF_THICKNESS: f32 = 0.0001;

/// Lower bound on the body speed that carried momentum is divided by.
pub const MOMENTUM_MIN_SPEED: f32 = 1.0;

/// Which controllers can hold the user over the previous floor.
///
/// A controller "holds" when it is active and the floor beneath it is within
/// [`CONTROLLER_DROP_TOLERANCE`] of the current play area height.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallRestriction {
    /// Always drop to the floor under the headset.
    #[default]
    NoRestriction,
    /// Hold while the left controller is over the previous floor.
    LeftController,
    /// Hold while the right controller is over the previous floor.
    RightController,
    /// Drop as soon as either controller leaves the previous floor.
    EitherController,
    /// Drop only once both controllers have left the previous floor.
    BothControllers,
}

impl FallRestriction {
    /// Whether the policy holds the user given which controllers are over the
    /// previous floor.
    pub fn holds(self, left_over: bool, right_over: bool) -> bool {
        match self {
            FallRestriction::NoRestriction => false,
            FallRestriction::LeftController => left_over,
            FallRestriction::RightController => right_over,
            FallRestriction::EitherController => left_over && right_over,
            FallRestriction::BothControllers => left_over || right_over,
        }
    }
}

/// Configuration for step-up detection and the foot volume.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct StepConfig {
    /// Height of the foot volume and the offset of the body volume above the
    /// floor. Zero disables the foot volume and step-up detection.
    pub step_up_y_offset: f32,

    /// Foot volume radius as a multiple of the body radius.
    pub step_thickness_multiplier: f32,

    /// Minimum height above the play area a surface must have to be stepped onto.
    pub step_drop_threshold: f32,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            step_up_y_offset: 0.15,
            step_thickness_multiplier: 0.5,
            step_drop_threshold: 0.08,
        }
    }
}

impl StepConfig {
    /// Create a config with step-up disabled.
    pub fn disabled() -> Self {
        Self {
            step_up_y_offset: 0.0,
            ..default()
        }
    }

    /// Whether a foot volume should exist.
    #[inline]
    pub fn enabled(&self) -> bool {
        self.step_up_y_offset > 0.0
    }
}

/// Configuration parameters for body physics.
///
/// Distances are in meters, matching the tracked space of the headset.
#[derive(Component, Reflect, Debug, Clone, PartialEq)]
#[reflect(Component)]
pub struct BodyPhysicsConfig {
    // === Collisions ===
    /// Whether the body volumes collide with the world.
    ///
    /// Changing this at runtime is picked up on the next tick.
    pub enable_body_collisions: bool,

    /// Whether grabbed objects stop colliding with the body.
    pub ignore_grabbed_collisions: bool,

    /// Entities whose colliders never collide with the body.
    pub ignore_collisions_with: Vec<Entity>,

    /// Externally supplied body volume. Spawned automatically when `None`.
    pub body_volume: Option<Entity>,

    /// Externally supplied foot volume. Spawned automatically when `None`.
    pub foot_volume: Option<Entity>,

    /// Collision groups `(memberships, filters)` applied to every query.
    pub raycast_groups: Option<(u32, u32)>,

    // === Body ===
    /// Distance between the top of the body volume and the headset.
    pub headset_y_offset: f32,

    /// Radius of the body volume.
    pub body_radius: f32,

    /// Mass given to the physics body when it is created.
    pub body_mass: f32,

    // === Standing position ===
    /// Planar head offset from the standing position that counts as movement.
    pub movement_threshold: f32,

    /// Play area movement per tick that suppresses head movement detection.
    pub play_area_movement_threshold: f32,

    /// Number of head samples that must agree before the standing position resets.
    pub standing_history_samples: usize,

    /// Floor drop ahead of the head that counts as leaning over an edge.
    pub lean_y_threshold: f32,

    // === Step-up ===
    /// Step-up and foot volume settings.
    pub step: StepConfig,

    // === Falling ===
    /// Whether falls may be performed by teleporting the play area.
    pub enable_teleport: bool,

    /// Controller policy that can hold the user over the previous floor.
    pub fall_restriction: FallRestriction,

    /// Drops larger than this always use gravity when collisions are enabled.
    pub gravity_fall_y_threshold: f32,

    /// Teleport falls up to this height happen without a fade.
    pub blink_y_threshold: f32,

    /// Floor height change between ticks that counts as a new floor.
    pub floor_height_tolerance: f32,

    /// Decimal places used when comparing play area heights to end a fall.
    pub fall_check_precision: u32,
}

impl Default for BodyPhysicsConfig {
    fn default() -> Self {
        Self {
            enable_body_collisions: true,
            ignore_grabbed_collisions: true,
            ignore_collisions_with: Vec::new(),
            body_volume: None,
            foot_volume: None,
            raycast_groups: None,

            headset_y_offset: 0.2,
            body_radius: 0.2,
            body_mass: 100.0,

            movement_threshold: 0.0015,
            play_area_movement_threshold: 0.0015,
            standing_history_samples: 5,
            lean_y_threshold: 0.5,

            step: StepConfig::default(),

            enable_teleport: true,
            fall_restriction: FallRestriction::NoRestriction,
            gravity_fall_y_threshold: 1.0,
            blink_y_threshold: 0.15,
            floor_height_tolerance: 0.001,
            fall_check_precision: 5,
        }
    }
}

impl BodyPhysicsConfig {
    /// Builder: enable or disable body collisions.
    pub fn with_body_collisions(mut self, enabled: bool) -> Self {
        self.enable_body_collisions = enabled;
        self
    }

    /// Builder: enable or disable teleport falls.
    pub fn with_teleport(mut self, enabled: bool) -> Self {
        self.enable_teleport = enabled;
        self
    }

    /// Builder: set the fall restriction policy.
    pub fn with_fall_restriction(mut self, restriction: FallRestriction) -> Self {
        self.fall_restriction = restriction;
        self
    }

    /// Builder: set the step-up configuration.
    pub fn with_step(mut self, step: StepConfig) -> Self {
        self.step = step;
        self
    }

    /// Builder: ignore collisions with an entity and its child colliders.
    pub fn ignoring(mut self, entity: Entity) -> Self {
        if !self.ignore_collisions_with.contains(&entity) {
            self.ignore_collisions_with.push(entity);
        }
        self
    }

    /// Builder: use an existing body volume.
    pub fn with_body_volume(mut self, volume: Entity) -> Self {
        self.body_volume = Some(volume);
        self
    }

    /// Builder: set the number of standing history samples.
    pub fn with_history_samples(mut self, samples: usize) -> Self {
        self.standing_history_samples = samples.max(1);
        self
    }

    /// Builder: set the collision groups used by every query.
    pub fn with_raycast_groups(mut self, memberships: u32, filters: u32) -> Self {
        self.raycast_groups = Some((memberships, filters));
        self
    }

    /// Offset of the body volume above the floor.
    #[inline]
    pub fn step_offset(&self) -> f32 {
        self.step.step_up_y_offset.max(0.0)
    }

    /// Round a height to [`Self::fall_check_precision`] decimals.
    pub fn round_height(&self, y: f32) -> f32 {
        let scale = 10f32.powi(self.fall_check_precision.min(9) as i32);
        (y * scale).round() / scale
    }
}
