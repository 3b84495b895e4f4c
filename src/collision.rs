//! Physics query results.
//!
//! These structures hold the results of the ray casts and box sweeps used for
//! floor detection, lean probing and step-up detection.

use bevy::prelude::*;

/// Information about a raycast/shapecast hit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollisionData {
    /// Distance travelled along the cast direction before the hit.
    pub distance: f32,
    /// Normal of the surface at hit point.
    pub normal: Vec3,
    /// World position of the hit point.
    pub point: Vec3,
    /// Entity that was hit (if any).
    pub entity: Option<Entity>,
}

impl CollisionData {
    /// Create a collision result.
    pub fn new(distance: f32, normal: Vec3, point: Vec3, entity: Option<Entity>) -> Self {
        Self {
            distance,
            normal,
            point,
            entity,
        }
    }
}

/// A straight ray cast request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCast {
    /// Origin point of the ray.
    pub origin: Vec3,
    /// Direction of the ray (normalized on construction).
    pub direction: Vec3,
    /// Maximum distance to cast.
    pub max_distance: f32,
}

impl RayCast {
    /// Create a new ray cast.
    pub fn new(origin: Vec3, direction: Vec3, max_distance: f32) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            max_distance,
        }
    }

    /// Unbounded ray pointing straight down from `origin`.
    pub fn down(origin: Vec3) -> Self {
        Self::new(origin, Vec3::NEG_Y, f32::MAX)
    }

    /// Point at `distance` along the ray.
    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

/// The one filter applied to every query this crate makes.
///
/// Excludes the colliders of the user's own physics body and optionally
/// restricts hits to a collision group pair `(memberships, filters)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryFilterSpec {
    /// Rigid body whose colliders must never be reported.
    pub exclude_body: Option<Entity>,
    /// Collision groups used for filtering.
    pub groups: Option<(u32, u32)>,
}

impl QueryFilterSpec {
    /// Filter excluding the given rigid body.
    pub fn excluding(body: Entity) -> Self {
        Self {
            exclude_body: Some(body),
            groups: None,
        }
    }

    /// Restrict hits to the given groups.
    pub fn with_groups(mut self, groups: Option<(u32, u32)>) -> Self {
        self.groups = groups;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_data_new() {
        let cast = CollisionData::new(5.0, Vec3::Y, Vec3::new(10.0, 0.0, 2.0), None);

        assert_eq!(cast.distance, 5.0);
        assert_eq!(cast.normal, Vec3::Y);
        assert_eq!(cast.point, Vec3::new(10.0, 0.0, 2.0));
    }

    #[test]
    fn collision_data_with_entity() {
        let entity = Entity::from_raw(42);
        let cast = CollisionData::new(3.0, Vec3::X, Vec3::ZERO, Some(entity));

        assert_eq!(cast.entity, Some(entity));
    }

    #[test]
    fn ray_cast_normalizes_direction() {
        let ray = RayCast::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -4.0), 2.0);
        assert_eq!(ray.direction, Vec3::NEG_Z);
        assert_eq!(ray.point_at(2.0), Vec3::new(0.0, 0.0, -2.0));
    }

    #[test]
    fn filter_excluding_body() {
        let body = Entity::from_raw(7);
        let filter = QueryFilterSpec::excluding(body).with_groups(Some((1, 2)));
        assert_eq!(filter.exclude_body, Some(body));
        assert_eq!(filter.groups, Some((1, 2)));
    }
}
