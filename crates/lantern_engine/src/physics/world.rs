//! Physics world
//!
//! [`PhysicsWorld`] owns the backend and one [`PhysicsObject`] per simulated
//! scene object. Each frame it pushes scene-driven transforms into the
//! backend, steps it at a fixed rate, writes simulated transforms back into
//! the scene and diffs overlapping pairs into begin / continue / end events.

use std::collections::{BTreeSet, HashMap};

use crate::core::config::PhysicsConfig;
use crate::foundation::collections::{ComponentId, ObjectId, SecondaryMap};
use crate::foundation::logging::{debug, error, warn};
use crate::foundation::math::{Quat, Vec3};
use crate::foundation::time::FixedStep;
use crate::physics::backend::{PhysicsBackend, PhysicsHandle, PhysicsResult};
use crate::physics::collision::{ActivationState, CollisionFlag, CollisionGroup, CollisionMask};
use crate::physics::physics_object::PhysicsObject;
use crate::physics::rapier_backend::RapierBackend;
use crate::scene::Scene;

/// Change in an overlapping pair since the previous simulation tick
///
/// Pairs are ordered so the smaller object id comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapEvent {
    /// Objects started overlapping
    Begin(ObjectId, ObjectId),
    /// Objects still overlap
    Continue(ObjectId, ObjectId),
    /// Objects stopped overlapping
    End(ObjectId, ObjectId),
}

type ObjectPair = (ObjectId, ObjectId);

fn ordered(a: ObjectId, b: ObjectId) -> ObjectPair {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Simulation state for the scene
pub struct PhysicsWorld {
    backend: Box<dyn PhysicsBackend>,
    objects: SecondaryMap<ObjectId, PhysicsObject>,
    handle_to_object: HashMap<PhysicsHandle, ObjectId>,
    fixed_step: FixedStep,
    overlaps: BTreeSet<ObjectPair>,
    events: Vec<OverlapEvent>,
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("objects", &self.objects.len())
            .field("overlaps", &self.overlaps.len())
            .finish_non_exhaustive()
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(&PhysicsConfig::default())
    }
}

impl PhysicsWorld {
    /// World simulated by rapier
    pub fn new(config: &PhysicsConfig) -> Self {
        Self::with_backend(config, Box::new(RapierBackend::new(Vec3::from(config.gravity))))
    }

    /// World simulated by a custom backend
    pub fn with_backend(config: &PhysicsConfig, mut backend: Box<dyn PhysicsBackend>) -> Self {
        backend.set_gravity(Vec3::from(config.gravity));
        Self {
            backend,
            objects: SecondaryMap::new(),
            handle_to_object: HashMap::new(),
            fixed_step: FixedStep::new(config.fixed_time_step, config.max_sub_steps),
            overlaps: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    /// Simulation backend
    pub fn backend(&self) -> &dyn PhysicsBackend {
        self.backend.as_ref()
    }

    /// Change world gravity
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.backend.set_gravity(gravity);
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a physics object; it is created in the backend when its
    /// scene object initializes
    ///
    /// A physics object already registered for the same scene object is destroyed.
    pub fn add_physics_object(&mut self, physics_object: PhysicsObject) {
        let object = physics_object.object();
        if let Some(mut previous) = self.objects.insert(object, physics_object) {
            self.release(&mut previous);
        }
    }

    /// Create backend objects for the given scene objects
    ///
    /// Failures are logged and leave the object uninitialized. Returns how
    /// many objects were created.
    pub fn init_objects(&mut self, scene: &Scene, objects: &[ObjectId]) -> usize {
        let mut created = 0;
        for &object in objects {
            match self.init_object(scene, object) {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => error!("Failed to create physics body for {:?}: {}", object, e),
            }
        }
        created
    }

    /// Create the backend object for one scene object
    ///
    /// `Ok(false)` when the object has no physics object or already has a body.
    pub fn init_object(&mut self, scene: &Scene, object: ObjectId) -> PhysicsResult<bool> {
        let Some(physics_object) = self.objects.get_mut(object) else { return Ok(false) };
        if physics_object.is_initialized() {
            return Ok(false);
        }
        let handle = physics_object.init(self.backend.as_mut(), scene)?;
        self.handle_to_object.insert(handle, object);
        Ok(true)
    }

    /// Destroy the physics object of a scene object
    pub fn destroy_object(&mut self, object: ObjectId) -> bool {
        let Some(mut physics_object) = self.objects.remove(object) else { return false };
        self.release(&mut physics_object);
        self.overlaps.retain(|(a, b)| *a != object && *b != object);
        debug!("Destroyed physics object of {:?}", object);
        true
    }

    /// Destroy physics objects whose collision component is gone
    pub fn destroy_objects_using_component(&mut self, component: ComponentId) {
        let affected: Vec<ObjectId> = self
            .objects
            .iter()
            .filter(|(_, o)| o.collision_component() == component)
            .map(|(id, _)| id)
            .collect();
        for object in affected {
            self.destroy_object(object);
        }
    }

    fn release(&mut self, physics_object: &mut PhysicsObject) {
        if let Some(handle) = physics_object.handle() {
            self.handle_to_object.remove(&handle);
        }
        physics_object.destroy_inner(self.backend.as_mut());
    }

    /// Physics object of a scene object
    pub fn physics_object(&self, object: ObjectId) -> Option<&PhysicsObject> {
        self.objects.get(object)
    }

    /// Number of registered physics objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // ------------------------------------------------------------------
    // Per-object settings
    // ------------------------------------------------------------------

    /// Set the collision group of an object
    pub fn set_collision_group(&mut self, object: ObjectId, group: CollisionGroup) {
        if let Some(physics_object) = self.objects.get_mut(object) {
            physics_object.set_collision_group(self.backend.as_mut(), group);
        }
    }

    /// Set the collision mask of an object
    pub fn set_collision_mask(&mut self, object: ObjectId, mask: CollisionMask) {
        if let Some(physics_object) = self.objects.get_mut(object) {
            physics_object.set_collision_mask(self.backend.as_mut(), mask);
        }
    }

    /// Set the body behaviour flags of an object
    pub fn set_collision_flag(&mut self, object: ObjectId, flag: CollisionFlag) {
        if let Some(physics_object) = self.objects.get_mut(object) {
            physics_object.set_collision_flag(self.backend.as_mut(), flag);
        }
    }

    /// Set the sleep and simulation state of an object
    pub fn set_activation_state(&mut self, object: ObjectId, state: ActivationState) {
        if let Some(physics_object) = self.objects.get_mut(object) {
            physics_object.set_activation_state(self.backend.as_mut(), state);
        }
    }

    /// Set the continuous collision detection threshold of an object
    pub fn set_ccd_motion_threshold(&mut self, object: ObjectId, threshold: f32) {
        if let Some(physics_object) = self.objects.get_mut(object) {
            physics_object.set_ccd_motion_threshold(self.backend.as_mut(), threshold);
        }
    }

    /// Set the swept sphere radius of an object
    pub fn set_ccd_swept_sphere_radius(&mut self, object: ObjectId, radius: f32) {
        if let Some(physics_object) = self.objects.get_mut(object) {
            physics_object.set_ccd_swept_sphere_radius(self.backend.as_mut(), radius);
        }
    }

    /// Include or exclude an object from simulation without destroying it
    pub fn set_is_active(&mut self, object: ObjectId, active: bool) {
        if let Some(physics_object) = self.objects.get_mut(object) {
            physics_object.set_is_active(self.backend.as_mut(), active);
        }
    }

    /// Enable or disable transform write-back for an object
    pub fn set_physics_tick_enabled(&mut self, object: ObjectId, enabled: bool) {
        if let Some(physics_object) = self.objects.get_mut(object) {
            physics_object.set_physics_tick_enabled(enabled);
        }
    }

    /// Set the user tag of an object
    pub fn set_tag(&mut self, object: ObjectId, tag: impl Into<String>) {
        if let Some(physics_object) = self.objects.get_mut(object) {
            physics_object.set_tag(tag);
        }
    }

    // ------------------------------------------------------------------
    // Rigid bodies
    // ------------------------------------------------------------------

    /// Apply a force to a rigid body for the next step
    ///
    /// Returns `false` without effect for overlapping volumes, uninitialized
    /// objects and unknown ids.
    pub fn apply_force(&mut self, object: ObjectId, force: Vec3) -> bool {
        let Some(body) = self.objects.get(object).and_then(PhysicsObject::as_rigid_body) else {
            return false;
        };
        if body.handle().is_none() {
            return false;
        }
        body.apply_force(self.backend.as_mut(), force);
        true
    }

    /// Apply an instantaneous impulse to a rigid body
    pub fn apply_impulse(&mut self, object: ObjectId, impulse: Vec3) -> bool {
        let Some(body) = self.objects.get(object).and_then(PhysicsObject::as_rigid_body) else {
            return false;
        };
        if body.handle().is_none() {
            return false;
        }
        body.apply_impulse(self.backend.as_mut(), impulse);
        true
    }

    /// Overwrite the linear velocity of a rigid body
    pub fn set_linear_velocity(&mut self, object: ObjectId, velocity: Vec3) {
        if let Some(body) = self.objects.get(object).and_then(PhysicsObject::as_rigid_body) {
            body.set_linear_velocity(self.backend.as_mut(), velocity);
        }
    }

    /// Linear velocity of a rigid body
    pub fn linear_velocity(&self, object: ObjectId) -> Option<Vec3> {
        self.objects.get(object)?.as_rigid_body()?.linear_velocity(self.backend.as_ref())
    }

    // ------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------

    /// Advance the simulation by a frame delta
    ///
    /// Returns the number of fixed steps taken. Overlap events are only
    /// refreshed when at least one step ran.
    pub fn physics_tick(&mut self, delta_time: f32, scene: &mut Scene) -> u32 {
        let steps = self.fixed_step.advance(delta_time);
        if steps == 0 {
            return 0;
        }

        self.push_scene_transforms(scene);
        for _ in 0..steps {
            self.backend.step(self.fixed_step.step());
        }
        self.pull_simulated_transforms(scene);
        self.refresh_overlaps();

        steps
    }

    fn push_scene_transforms(&mut self, scene: &Scene) {
        for (_, physics_object) in self.objects.iter() {
            if !physics_object.follows_scene() {
                continue;
            }
            let (Some(handle), Some(component)) = (physics_object.handle(), scene.component(physics_object.collision_component())) else {
                continue;
            };
            self.backend.set_transform(handle, component.world_position(), component.world_rotation());
        }
    }

    fn pull_simulated_transforms(&mut self, scene: &mut Scene) {
        let mut updates: Vec<(ObjectId, Vec3, Quat)> = Vec::new();

        for (object, physics_object) in self.objects.iter() {
            if physics_object.as_rigid_body().is_none()
                || !physics_object.is_physics_tick_enabled()
                || !physics_object.is_active()
                || physics_object.follows_scene()
                || physics_object.collision_flag().contains(CollisionFlag::STATIC_OBJECT)
            {
                continue;
            }
            let Some((body_position, body_rotation)) = physics_object.handle().and_then(|h| self.backend.transform(h)) else {
                continue;
            };
            let (Some(component), Some(object_position), Some(object_rotation)) = (
                scene.component(physics_object.collision_component()),
                scene.object_world_position(object),
                scene.object_world_rotation(object),
            ) else {
                warn!("Physics object {:?} lost its scene object", object);
                continue;
            };

            // The collision component may sit below the root; carry its offset
            let rotation_delta = body_rotation * component.world_rotation().inverse();
            let offset = object_position - component.world_position();
            let position = body_position + rotation_delta * offset;
            updates.push((object, position, rotation_delta * object_rotation));
        }

        for (object, position, rotation) in updates {
            scene.set_object_world_position(object, position);
            scene.set_object_world_rotation(object, rotation);
        }
    }

    fn refresh_overlaps(&mut self) {
        let current: BTreeSet<ObjectPair> = self
            .backend
            .overlapping_pairs()
            .into_iter()
            .filter_map(|(a, b)| Some(ordered(*self.handle_to_object.get(&a)?, *self.handle_to_object.get(&b)?)))
            .collect();

        self.events.clear();
        for &(a, b) in current.iter() {
            if self.overlaps.contains(&(a, b)) {
                self.events.push(OverlapEvent::Continue(a, b));
            } else {
                self.events.push(OverlapEvent::Begin(a, b));
            }
        }
        for &(a, b) in self.overlaps.difference(&current) {
            self.events.push(OverlapEvent::End(a, b));
        }
        self.overlaps = current;
    }

    /// Events produced by the last simulation tick
    pub fn overlap_events(&self) -> &[OverlapEvent] {
        &self.events
    }

    /// Objects currently overlapping the given one
    pub fn overlapping_objects(&self, object: ObjectId) -> Vec<ObjectId> {
        self.overlaps
            .iter()
            .filter_map(|&(a, b)| match (a == object, b == object) {
                (true, _) => Some(b),
                (_, true) => Some(a),
                _ => None,
            })
            .collect()
    }

    /// Destroy every backend object
    pub fn shutdown(&mut self) {
        let objects: Vec<ObjectId> = self.objects.keys().collect();
        for object in objects {
            self.destroy_object(object);
        }
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collision::CollisionShape;
    use crate::scene::ComponentKind;
    use approx::assert_relative_eq;

    fn spawn(scene: &mut Scene, name: &str, shape: CollisionShape, position: Vec3) -> (ObjectId, ComponentId) {
        let object = scene.create_object(name);
        let collision = scene.add_component(object, "collision", ComponentKind::Collision(shape)).unwrap();
        scene.set_object_world_position(object, position);
        (object, collision)
    }

    fn world_with(scene: &mut Scene, physics_objects: Vec<PhysicsObject>) -> PhysicsWorld {
        let mut world = PhysicsWorld::default();
        let ids: Vec<ObjectId> = physics_objects.iter().map(PhysicsObject::object).collect();
        for physics_object in physics_objects {
            world.add_physics_object(physics_object);
        }
        assert_eq!(world.init_objects(scene, &ids), ids.len());
        world
    }

    #[test]
    fn test_rigid_body_writes_back_to_scene() {
        let mut scene = Scene::new();
        let (ball, collision) = spawn(&mut scene, "ball", CollisionShape::Sphere { radius: 0.5 }, Vec3::new(0.0, 0.0, 10.0));
        let mut world = world_with(&mut scene, vec![PhysicsObject::rigid_body(ball, collision, 1.0)]);

        for _ in 0..30 {
            world.physics_tick(1.0 / 60.0, &mut scene);
        }

        let position = scene.object_world_position(ball).unwrap();
        assert!(position.z < 9.5, "z = {}", position.z);
        assert_relative_eq!(position.x, 0.0, epsilon = 1e-4);
        assert!(world.linear_velocity(ball).unwrap().z < 0.0);
    }

    #[test]
    fn test_disabled_physics_tick_keeps_scene() {
        let mut scene = Scene::new();
        let (ball, collision) = spawn(&mut scene, "ball", CollisionShape::Sphere { radius: 0.5 }, Vec3::new(0.0, 0.0, 10.0));
        let mut world = world_with(&mut scene, vec![PhysicsObject::rigid_body(ball, collision, 1.0)]);
        world.set_physics_tick_enabled(ball, false);

        for _ in 0..30 {
            world.physics_tick(1.0 / 60.0, &mut scene);
        }
        assert_relative_eq!(scene.object_world_position(ball).unwrap().z, 10.0);
    }

    #[test]
    fn test_overlap_events_follow_scene_movement() {
        let mut scene = Scene::new();
        let (trigger, trigger_shape) = spawn(&mut scene, "trigger", CollisionShape::cuboid(Vec3::new(2.0, 2.0, 2.0)), Vec3::zeros());
        let (visitor, visitor_shape) = spawn(&mut scene, "visitor", CollisionShape::Sphere { radius: 0.5 }, Vec3::new(20.0, 0.0, 0.0));
        let mut world = world_with(
            &mut scene,
            vec![PhysicsObject::overlapping(trigger, trigger_shape), PhysicsObject::overlapping(visitor, visitor_shape)],
        );
        let pair = ordered(trigger, visitor);

        world.physics_tick(1.0 / 60.0, &mut scene);
        assert!(world.overlap_events().is_empty());

        scene.set_object_world_position(visitor, Vec3::new(0.5, 0.0, 0.0));
        world.physics_tick(1.0 / 60.0, &mut scene);
        world.physics_tick(1.0 / 60.0, &mut scene);
        assert!(world.overlap_events().contains(&OverlapEvent::Begin(pair.0, pair.1)) || world.overlap_events().contains(&OverlapEvent::Continue(pair.0, pair.1)));
        assert_eq!(world.overlapping_objects(trigger), vec![visitor]);

        scene.set_object_world_position(visitor, Vec3::new(20.0, 0.0, 0.0));
        world.physics_tick(1.0 / 60.0, &mut scene);
        world.physics_tick(1.0 / 60.0, &mut scene);
        assert!(world.overlapping_objects(trigger).is_empty());
    }

    #[test]
    fn test_apply_force_ignores_overlapping_volumes() {
        let mut scene = Scene::new();
        let (volume, volume_shape) = spawn(&mut scene, "volume", CollisionShape::Sphere { radius: 1.0 }, Vec3::zeros());
        let (body, body_shape) = spawn(&mut scene, "body", CollisionShape::Sphere { radius: 1.0 }, Vec3::new(10.0, 0.0, 0.0));
        let mut world = world_with(
            &mut scene,
            vec![PhysicsObject::overlapping(volume, volume_shape), PhysicsObject::rigid_body(body, body_shape, 1.0)],
        );

        assert!(!world.apply_force(volume, Vec3::new(0.0, 0.0, 100.0)));
        assert!(world.apply_force(body, Vec3::new(100.0, 0.0, 0.0)));
    }

    #[test]
    fn test_destroy_object_frees_backend() {
        let mut scene = Scene::new();
        let (ball, collision) = spawn(&mut scene, "ball", CollisionShape::Sphere { radius: 0.5 }, Vec3::zeros());
        let mut world = world_with(&mut scene, vec![PhysicsObject::rigid_body(ball, collision, 1.0)]);
        assert_eq!(world.backend().object_count(), 1);

        world.destroy_objects_using_component(collision);
        assert_eq!(world.backend().object_count(), 0);
        assert_eq!(world.object_count(), 0);
        assert!(!world.destroy_object(ball));
    }
}
