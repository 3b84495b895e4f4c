//! Teleport collaborator interface.
//!
//! The teleport service owns play area relocation and screen fades. Register
//! one by inserting a [`Teleporter`] resource; without it, falls are handled
//! by gravity and step-ups by moving the play area directly.

use bevy::prelude::*;

/// A relocation requested by body physics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeleportRequest {
    /// Body the request was made for.
    pub body: Entity,
    /// Floor object being moved onto.
    pub target: Option<Entity>,
    /// New play area position.
    pub destination: Vec3,
    /// New play area rotation, `None` to keep the current one.
    pub rotation: Option<Quat>,
    /// Whether the service must use `destination` unchanged.
    pub force_destination: bool,
    /// Whether the move happens this frame.
    pub immediate: bool,
}

/// Teleport service used for teleport falls and step-ups.
pub trait TeleportService: Send + Sync + 'static {
    /// Whether `point` on `target` is somewhere the user may be moved to.
    fn valid_location(&self, target: Option<Entity>, point: Vec3) -> bool;

    /// Current fade transition duration in seconds.
    fn fade_duration(&self) -> f32;

    /// Override the fade transition duration.
    fn set_fade_duration(&mut self, seconds: f32);

    /// Relocate the play area.
    ///
    /// The service writes [`TeleportCompleted`] once the move has finished.
    fn request_move(&mut self, request: TeleportRequest);
}

/// The registered teleport service.
#[derive(Resource)]
pub struct Teleporter(Box<dyn TeleportService>);

impl Teleporter {
    /// Wrap a teleport service.
    pub fn new(service: impl TeleportService) -> Self {
        Self(Box::new(service))
    }

    /// Access the service.
    pub fn service(&self) -> &dyn TeleportService {
        self.0.as_ref()
    }

    /// Access the service mutably.
    pub fn service_mut(&mut self) -> &mut dyn TeleportService {
        self.0.as_mut()
    }
}

/// Written by the teleport service when a requested move has finished.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeleportCompleted {
    /// Body the original request was made for.
    pub body: Entity,
}

/// Whether a teleport service is registered.
pub fn teleporter_registered(world: &World) -> bool {
    world.contains_resource::<Teleporter>()
}

/// Ask the teleport service whether `point` is a valid destination.
///
/// Passes when no service is registered.
pub fn valid_location(world: &World, target: Option<Entity>, point: Vec3) -> bool {
    world
        .get_resource::<Teleporter>()
        .is_none_or(|t| t.service().valid_location(target, point))
}

/// Send a move request, optionally with the fade suppressed for this request only.
///
/// Returns `false` when no service is registered.
pub fn request_move(world: &mut World, request: TeleportRequest, suppress_fade: bool) -> bool {
    let Some(mut teleporter) = world.get_resource_mut::<Teleporter>() else {
        return false;
    };
    let service = teleporter.service_mut();
    let original_fade = service.fade_duration();
    if suppress_fade {
        service.set_fade_duration(0.0);
    }
    service.request_move(request);
    service.set_fade_duration(original_fade);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        fades: Vec<f32>,
    }

    struct FakeService {
        fade: f32,
        log: Arc<Mutex<Log>>,
    }

    impl TeleportService for FakeService {
        fn valid_location(&self, _target: Option<Entity>, point: Vec3) -> bool {
            point.y > -10.0
        }

        fn fade_duration(&self) -> f32 {
            self.fade
        }

        fn set_fade_duration(&mut self, seconds: f32) {
            self.fade = seconds;
        }

        fn request_move(&mut self, _request: TeleportRequest) {
            self.log.lock().unwrap().fades.push(self.fade);
        }
    }

    fn request() -> TeleportRequest {
        TeleportRequest {
            body: Entity::from_raw(1),
            target: None,
            destination: Vec3::ZERO,
            rotation: None,
            force_destination: true,
            immediate: true,
        }
    }

    #[test]
    fn fade_is_suppressed_and_restored() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut world = World::new();
        world.insert_resource(Teleporter::new(FakeService {
            fade: 0.5,
            log: log.clone(),
        }));

        assert!(request_move(&mut world, request(), true));
        assert!(request_move(&mut world, request(), false));

        assert_eq!(log.lock().unwrap().fades, vec![0.0, 0.5]);
        assert_eq!(world.resource::<Teleporter>().service().fade_duration(), 0.5);
    }

    #[test]
    fn missing_service_accepts_every_location() {
        let mut world = World::new();
        assert!(valid_location(&world, None, Vec3::splat(-100.0)));
        assert!(!request_move(&mut world, request(), false));
    }
}
