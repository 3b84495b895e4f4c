//! Configuration errors.
//!
//! None of these are fatal: a body whose rig cannot be resolved stays inert
//! and is retried every tick until the missing entity shows up.

use bevy::prelude::*;
use thiserror::Error;

/// Errors raised while resolving the tracked rig of a body.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyPhysicsError {
    /// The rig does not name a play area entity.
    #[error("tracked rig has no play area")]
    MissingPlayArea,

    /// The rig does not name a head entity.
    #[error("tracked rig has no head")]
    MissingHead,

    /// A rig entity was despawned or never received a transform.
    #[error("rig entity {entity} has no Transform")]
    MissingTransform {
        /// Entity that was expected to carry a transform
        entity: Entity,
    },
}
