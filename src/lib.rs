//! # `vr_body_physics`
//!
//! Body presence physics for room-scale VR with physics backend abstraction.
//!
//! The tracked play area is smaller than the virtual world. This crate gives
//! the user a physical body inside that world and decides every fixed tick
//! whether they stand still, walk, lean over an edge or fall:
//! - A capsule body volume hangs beneath the headset and follows it around
//! - A foot volume detects steps and lifts the user onto them
//! - A standing position with hysteresis tells walking apart from leaning
//! - Floor snapping drops the user onto lower floors by gravity or teleport
//! - Controllers resting on a ledge can hold the user back from falling
//! - Grabbed and configured objects stop colliding with the body
//! - Abstracts the physics backend for easy swapping (Rapier3D included)
//!
//! ## Architecture
//!
//! Everything runs in `FixedUpdate`, in the phases of [`BodyPhysicsSet`]:
//! 1. Bodies activate once their rig resolves
//! 2. Contacts and requests are applied
//! 3. The collision setting is re-applied if it changed
//! 4. Standing tracking and floor snapping run, or an active fall is checked
//! 5. Play area velocity is measured
//! 6. The volumes are fitted to the head pose
//!
//! Collaborators are injected: the [`TrackedRig`](pose::TrackedRig) component
//! names the pose entities, a [`Teleporter`](teleport::Teleporter) resource
//! provides teleport falls, and the [`Grabbed`](grab::Grabbed) marker with
//! grab events reports held objects.
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use vr_body_physics::prelude::*;
//!
//! let mut world = World::new();
//! let play_area = world.spawn(Transform::default()).id();
//! let head = world.spawn(Transform::from_xyz(0.0, 1.7, 0.0)).id();
//!
//! world.spawn((
//!     BodyPhysics::new(),
//!     BodyPhysicsConfig::default().with_fall_restriction(FallRestriction::BothControllers),
//!     TrackedRig::new(play_area, head),
//! ));
//! ```

use bevy::prelude::*;

pub mod backend;
pub mod collision;
pub mod config;
pub mod error;
pub mod events;
pub mod fall;
pub mod grab;
pub mod ignore;
pub mod pose;
pub mod standing;
pub mod state;
pub mod step;
pub mod systems;
pub mod teleport;
pub mod velocity;
pub mod volumes;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::backend::BodyPhysicsBackend;
    pub use crate::config::{BodyPhysicsConfig, FallRestriction, StepConfig};
    pub use crate::error::BodyPhysicsError;
    pub use crate::events::{BodyCommand, BodyEventKind, BodyPhysicsEvent, BodyPhysicsRequest};
    pub use crate::grab::{GrabEnded, GrabStarted, Grabbed};
    pub use crate::pose::{Hand, TrackedDevice, TrackedRig};
    pub use crate::state::{BodyPhysics, BodyState, Falling, OnGround};
    pub use crate::teleport::{TeleportCompleted, TeleportRequest, TeleportService, Teleporter};
    pub use crate::volumes::{BodyVolume, VolumeKind};
    pub use crate::{BodyPhysicsPlugin, BodyPhysicsSet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::Rapier3dBackend;
}

/// System sets for body physics, in execution order.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyPhysicsSet {
    /// Resolve rigs and create volumes.
    Activation,
    /// Backend-specific translation of engine events.
    Sensors,
    /// Colliding objects and step-up.
    Contacts,
    /// Body requests and teleport completions.
    Requests,
    /// Re-apply a changed collision setting.
    CollisionSettings,
    /// Standing position, floor snapping and falls.
    FallManagement,
    /// Play area velocity and the body clock.
    Velocity,
    /// Volume size and placement.
    Geometry,
    /// State markers.
    Sync,
}

/// Main plugin for body physics.
///
/// This plugin is generic over a physics backend `B` which provides the actual
/// physics operations (ray casts, body flags, velocities).
///
/// # Examples
///
/// With the Rapier3D backend:
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use vr_body_physics::prelude::*;
/// use vr_body_physics::rapier::BodyContactFilter;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .add_plugins(RapierPhysicsPlugin::<BodyContactFilter>::default())
///     .add_plugins(BodyPhysicsPlugin::<Rapier3dBackend>::default())
///     .run();
/// ```
pub struct BodyPhysicsPlugin<B: backend::BodyPhysicsBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::BodyPhysicsBackend> Default for BodyPhysicsPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::BodyPhysicsBackend> Plugin for BodyPhysicsPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<config::BodyPhysicsConfig>();
        app.register_type::<config::StepConfig>();
        app.register_type::<config::FallRestriction>();
        app.register_type::<pose::TrackedRig>();
        app.register_type::<pose::TrackedDevice>();
        app.register_type::<state::BodyPhysics>();
        app.register_type::<state::OnGround>();
        app.register_type::<state::Falling>();
        app.register_type::<volumes::BodyVolume>();
        app.register_type::<grab::Grabbed>();

        app.add_event::<events::BodyPhysicsEvent>();
        app.add_event::<events::BodyPhysicsRequest>();
        app.add_event::<events::VolumeContact>();
        app.add_event::<teleport::TeleportCompleted>();
        app.add_event::<grab::GrabStarted>();
        app.add_event::<grab::GrabEnded>();

        // Add the physics backend plugin
        app.add_plugins(B::plugin());

        app.configure_sets(
            FixedUpdate,
            (
                BodyPhysicsSet::Activation,
                BodyPhysicsSet::Sensors,
                BodyPhysicsSet::Contacts,
                BodyPhysicsSet::Requests,
                BodyPhysicsSet::CollisionSettings,
                BodyPhysicsSet::FallManagement,
                BodyPhysicsSet::Velocity,
                BodyPhysicsSet::Geometry,
                BodyPhysicsSet::Sync,
            )
                .chain(),
        );

        app.add_systems(
            FixedUpdate,
            (
                systems::activate_bodies::<B>.in_set(BodyPhysicsSet::Activation),
                systems::process_contacts::<B>.in_set(BodyPhysicsSet::Contacts),
                systems::process_requests::<B>.in_set(BodyPhysicsSet::Requests),
                systems::check_collision_setting::<B>.in_set(BodyPhysicsSet::CollisionSettings),
                systems::manage_falling::<B>.in_set(BodyPhysicsSet::FallManagement),
                systems::track_play_area_velocity::<B>.in_set(BodyPhysicsSet::Velocity),
                systems::update_volume_geometry::<B>.in_set(BodyPhysicsSet::Geometry),
                state::sync_state_markers.in_set(BodyPhysicsSet::Sync),
            ),
        );

        // Grab releases are deferred by rendered frames, not fixed ticks
        app.add_systems(Update, systems::track_grabbed_objects::<B>);

        app.add_observer(volumes::on_body_removed::<B>);
    }
}
