//! [`PhysicsBackend`] implemented with rapier3d
//!
//! Rigid bodies become dynamic rapier bodies whose mass is carried by the
//! body rather than collider density. Overlapping objects become kinematic
//! bodies with sensor colliders, so they follow the scene and only report
//! intersections. Rapier links its own nalgebra version, so every value
//! crossing this module is converted component-wise.

use std::collections::HashMap;

use nalgebra::Quaternion;
use rapier3d::na;
use rapier3d::prelude::{
    ActiveCollisionTypes, CCDSolver, ColliderBuilder, ColliderHandle, ColliderSet, DefaultBroadPhase, Group,
    ImpulseJointSet, IntegrationParameters, InteractionGroups, IslandManager, MultibodyJointSet, NarrowPhase,
    PhysicsPipeline, QueryPipeline, RigidBodyActivation, RigidBodyBuilder, RigidBodyHandle, RigidBodySet,
    RigidBodyType,
};

use crate::foundation::math::{Quat, Vec3};
use crate::physics::backend::{BodyKind, CollisionObjectDesc, PhysicsBackend, PhysicsError, PhysicsHandle, PhysicsResult};
use crate::physics::collision::{ActivationState, CollisionFlag, CollisionGroup, CollisionMask, CollisionShape};

fn to_rapier_vector(v: Vec3) -> na::Vector3<f32> {
    na::Vector3::new(v.x, v.y, v.z)
}

fn to_rapier_isometry(position: Vec3, rotation: Quat) -> na::Isometry3<f32> {
    let rotation = na::UnitQuaternion::from_quaternion(na::Quaternion::new(rotation.w, rotation.i, rotation.j, rotation.k));
    na::Isometry3::from_parts(na::Translation3::new(position.x, position.y, position.z), rotation)
}

fn from_rapier_vector(v: &na::Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn from_rapier_rotation(q: &na::UnitQuaternion<f32>) -> Quat {
    Quat::from_quaternion(Quaternion::new(q.w, q.i, q.j, q.k))
}

fn interaction_groups(group: CollisionGroup, mask: CollisionMask) -> InteractionGroups {
    InteractionGroups::new(Group::from_bits_truncate(group.bits()), Group::from_bits_truncate(mask.bits()))
}

fn collider_builder(shape: &CollisionShape) -> PhysicsResult<ColliderBuilder> {
    match shape {
        CollisionShape::Box { half_extents } => {
            if half_extents.iter().any(|e| *e <= 0.0) {
                return Err(PhysicsError::InvalidShape(format!("box half extents {half_extents:?}")));
            }
            Ok(ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z))
        }
        CollisionShape::Sphere { radius } => {
            if *radius <= 0.0 {
                return Err(PhysicsError::InvalidShape(format!("sphere radius {radius}")));
            }
            Ok(ColliderBuilder::ball(*radius))
        }
        CollisionShape::Capsule { half_height, radius } => {
            if *radius <= 0.0 || *half_height < 0.0 {
                return Err(PhysicsError::InvalidShape(format!("capsule {half_height}/{radius}")));
            }
            Ok(ColliderBuilder::capsule_z(*half_height, *radius))
        }
        CollisionShape::ConvexMesh { points } => {
            let points: Vec<na::Point3<f32>> = points.iter().map(|p| na::Point3::new(p.x, p.y, p.z)).collect();
            ColliderBuilder::convex_hull(&points)
                .ok_or_else(|| PhysicsError::InvalidShape(format!("degenerate convex hull of {} points", points.len())))
        }
    }
}

#[derive(Debug)]
struct BackendObject {
    body: RigidBodyHandle,
    collider: ColliderHandle,
    kind: BodyKind,
    flag: CollisionFlag,
    activation: ActivationState,
    active: bool,
    ccd_motion_threshold: f32,
    ccd_swept_sphere_radius: f32,
}

impl BackendObject {
    fn body_type(&self) -> RigidBodyType {
        if self.flag.contains(CollisionFlag::STATIC_OBJECT) {
            RigidBodyType::Fixed
        } else if self.flag.contains(CollisionFlag::KINEMATIC_OBJECT) {
            RigidBodyType::KinematicPositionBased
        } else {
            match self.kind {
                BodyKind::RigidBody { .. } => RigidBodyType::Dynamic,
                BodyKind::Overlapping => RigidBodyType::KinematicPositionBased,
            }
        }
    }

    fn is_sensor(&self) -> bool {
        self.kind == BodyKind::Overlapping || self.flag.contains(CollisionFlag::NO_CONTACT_RESPONSE)
    }

    fn is_enabled(&self) -> bool {
        self.active && self.activation != ActivationState::DisableSimulation
    }
}

/// Rapier simulation world
pub struct RapierBackend {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    gravity: na::Vector3<f32>,

    objects: HashMap<PhysicsHandle, BackendObject>,
    collider_to_handle: HashMap<ColliderHandle, PhysicsHandle>,
    next_handle: u64,
}

impl std::fmt::Debug for RapierBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RapierBackend")
            .field("objects", &self.objects.len())
            .field("gravity", &self.gravity)
            .finish_non_exhaustive()
    }
}

impl Default for RapierBackend {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, -9.81))
    }
}

impl RapierBackend {
    /// Empty world with the given gravity
    pub fn new(gravity: Vec3) -> Self {
        Self {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            gravity: to_rapier_vector(gravity),
            objects: HashMap::new(),
            collider_to_handle: HashMap::new(),
            next_handle: 1,
        }
    }

    fn apply_body_state(&mut self, handle: PhysicsHandle) {
        let Some(object) = self.objects.get(&handle) else { return };
        if let Some(body) = self.bodies.get_mut(object.body) {
            body.set_body_type(object.body_type(), true);
            body.lock_rotations(object.flag.contains(CollisionFlag::CHARACTER_OBJECT), true);
            body.set_enabled(object.is_enabled());
        }
        if let Some(collider) = self.colliders.get_mut(object.collider) {
            collider.set_sensor(object.is_sensor());
        }
    }
}

impl PhysicsBackend for RapierBackend {
    fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = to_rapier_vector(gravity);
    }

    fn create_collision_object(&mut self, desc: &CollisionObjectDesc) -> PhysicsResult<PhysicsHandle> {
        let mut collider = collider_builder(&desc.shape)?
            .sensor(desc.kind == BodyKind::Overlapping)
            .collision_groups(interaction_groups(desc.group, desc.mask))
            .active_collision_types(ActiveCollisionTypes::all());

        let body_type = match desc.kind {
            BodyKind::RigidBody { .. } => RigidBodyType::Dynamic,
            BodyKind::Overlapping => RigidBodyType::KinematicPositionBased,
        };
        let mut body = RigidBodyBuilder::new(body_type).position(to_rapier_isometry(desc.position, desc.rotation));
        if let BodyKind::RigidBody { mass } = desc.kind {
            if mass > 0.0 {
                body = body.additional_mass(mass);
                collider = collider.density(0.0);
            }
        }

        let body = self.bodies.insert(body.build());
        let collider = self.colliders.insert_with_parent(collider.build(), body, &mut self.bodies);

        let handle = PhysicsHandle(self.next_handle);
        self.next_handle += 1;
        self.objects.insert(
            handle,
            BackendObject {
                body,
                collider,
                kind: desc.kind,
                flag: CollisionFlag::empty(),
                activation: ActivationState::Active,
                active: true,
                ccd_motion_threshold: 0.0,
                ccd_swept_sphere_radius: 0.0,
            },
        );
        self.collider_to_handle.insert(collider, handle);
        log::trace!("Collision object {:?} created ({:?})", handle, desc.kind);
        Ok(handle)
    }

    fn destroy_collision_object(&mut self, handle: PhysicsHandle) {
        let Some(object) = self.objects.remove(&handle) else { return };
        self.collider_to_handle.remove(&object.collider);
        self.bodies.remove(
            object.body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        log::trace!("Collision object {:?} destroyed", handle);
    }

    fn set_active(&mut self, handle: PhysicsHandle, active: bool) {
        let Some(object) = self.objects.get_mut(&handle) else { return };
        object.active = active;
        self.apply_body_state(handle);
    }

    fn is_active(&self, handle: PhysicsHandle) -> bool {
        self.objects.get(&handle).is_some_and(BackendObject::is_enabled)
    }

    fn set_collision_flag(&mut self, handle: PhysicsHandle, flag: CollisionFlag) {
        let Some(object) = self.objects.get_mut(&handle) else { return };
        object.flag = flag;
        self.apply_body_state(handle);
    }

    fn collision_flag(&self, handle: PhysicsHandle) -> Option<CollisionFlag> {
        self.objects.get(&handle).map(|o| o.flag)
    }

    fn set_activation_state(&mut self, handle: PhysicsHandle, state: ActivationState) {
        let Some(object) = self.objects.get_mut(&handle) else { return };
        object.activation = state;
        let body_handle = object.body;
        self.apply_body_state(handle);

        let Some(body) = self.bodies.get_mut(body_handle) else { return };
        match state {
            ActivationState::Active | ActivationState::WantsDeactivation => {
                *body.activation_mut() = RigidBodyActivation::active();
                body.wake_up(true);
            }
            ActivationState::IslandSleeping => body.sleep(),
            ActivationState::DisableDeactivation => {
                *body.activation_mut() = RigidBodyActivation::cannot_sleep();
                body.wake_up(true);
            }
            ActivationState::DisableSimulation => {}
        }
    }

    fn activation_state(&self, handle: PhysicsHandle) -> Option<ActivationState> {
        self.objects.get(&handle).map(|o| o.activation)
    }

    fn set_collision_filter(&mut self, handle: PhysicsHandle, group: CollisionGroup, mask: CollisionMask) {
        let Some(object) = self.objects.get(&handle) else { return };
        if let Some(collider) = self.colliders.get_mut(object.collider) {
            collider.set_collision_groups(interaction_groups(group, mask));
        }
    }

    fn set_ccd_motion_threshold(&mut self, handle: PhysicsHandle, threshold: f32) {
        let Some(object) = self.objects.get_mut(&handle) else { return };
        object.ccd_motion_threshold = threshold;
        if let Some(body) = self.bodies.get_mut(object.body) {
            body.enable_ccd(threshold > 0.0);
        }
    }

    fn set_ccd_swept_sphere_radius(&mut self, handle: PhysicsHandle, radius: f32) {
        if let Some(object) = self.objects.get_mut(&handle) {
            object.ccd_swept_sphere_radius = radius;
        }
    }

    fn ccd_parameters(&self, handle: PhysicsHandle) -> Option<(f32, f32)> {
        self.objects
            .get(&handle)
            .map(|o| (o.ccd_motion_threshold, o.ccd_swept_sphere_radius))
    }

    fn set_transform(&mut self, handle: PhysicsHandle, position: Vec3, rotation: Quat) {
        let Some(object) = self.objects.get(&handle) else { return };
        if let Some(body) = self.bodies.get_mut(object.body) {
            body.set_position(to_rapier_isometry(position, rotation), true);
        }
    }

    fn transform(&self, handle: PhysicsHandle) -> Option<(Vec3, Quat)> {
        let body = self.bodies.get(self.objects.get(&handle)?.body)?;
        let position = body.position();
        Some((from_rapier_vector(&position.translation.vector), from_rapier_rotation(&position.rotation)))
    }

    fn set_linear_velocity(&mut self, handle: PhysicsHandle, velocity: Vec3) {
        let Some(object) = self.objects.get(&handle) else { return };
        if let Some(body) = self.bodies.get_mut(object.body) {
            body.set_linvel(to_rapier_vector(velocity), true);
        }
    }

    fn linear_velocity(&self, handle: PhysicsHandle) -> Option<Vec3> {
        let body = self.bodies.get(self.objects.get(&handle)?.body)?;
        Some(from_rapier_vector(body.linvel()))
    }

    fn apply_force(&mut self, handle: PhysicsHandle, force: Vec3) {
        let Some(object) = self.objects.get(&handle) else { return };
        if let Some(body) = self.bodies.get_mut(object.body) {
            body.add_force(to_rapier_vector(force), true);
        }
    }

    fn apply_impulse(&mut self, handle: PhysicsHandle, impulse: Vec3) {
        let Some(object) = self.objects.get(&handle) else { return };
        if let Some(body) = self.bodies.get_mut(object.body) {
            body.apply_impulse(to_rapier_vector(impulse), true);
        }
    }

    fn step(&mut self, delta_time: f32) {
        self.integration_parameters.dt = delta_time;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        // Forces apply for a single step
        for (_, body) in self.bodies.iter_mut() {
            body.reset_forces(false);
        }
    }

    fn overlapping_pairs(&self) -> Vec<(PhysicsHandle, PhysicsHandle)> {
        self.narrow_phase
            .intersection_pairs()
            .filter(|(_, _, intersecting)| *intersecting)
            .filter_map(|(a, b, _)| Some((*self.collider_to_handle.get(&a)?, *self.collider_to_handle.get(&b)?)))
            .collect()
    }

    fn object_count(&self) -> usize {
        self.objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn desc(shape: CollisionShape, kind: BodyKind, position: Vec3) -> CollisionObjectDesc {
        CollisionObjectDesc {
            shape,
            kind,
            position,
            rotation: Quat::identity(),
            group: CollisionGroup::WORLD_DYNAMIC_BLOCK,
            mask: CollisionMask::BLOCK_AND_OVERLAP_ALL,
        }
    }

    fn step_for(backend: &mut RapierBackend, seconds: f32) {
        let steps = (seconds * 60.0).round() as usize;
        for _ in 0..steps {
            backend.step(1.0 / 60.0);
        }
    }

    #[test]
    fn test_rigid_body_falls_along_negative_z() {
        let mut backend = RapierBackend::default();
        let ball = backend
            .create_collision_object(&desc(CollisionShape::Sphere { radius: 0.5 }, BodyKind::RigidBody { mass: 2.0 }, Vec3::new(0.0, 0.0, 10.0)))
            .unwrap();

        step_for(&mut backend, 0.5);

        let (position, _) = backend.transform(ball).unwrap();
        assert!(position.z < 10.0 - 0.5, "z = {}", position.z);
        assert_relative_eq!(position.x, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_inactive_bodies_are_not_simulated() {
        let mut backend = RapierBackend::default();
        let ball = backend
            .create_collision_object(&desc(CollisionShape::Sphere { radius: 0.5 }, BodyKind::RigidBody { mass: 1.0 }, Vec3::new(0.0, 0.0, 10.0)))
            .unwrap();

        backend.set_active(ball, false);
        step_for(&mut backend, 0.5);
        assert!(!backend.is_active(ball));
        assert_relative_eq!(backend.transform(ball).unwrap().0.z, 10.0, epsilon = 1e-5);

        backend.set_active(ball, true);
        step_for(&mut backend, 0.5);
        assert!(backend.transform(ball).unwrap().0.z < 10.0);
    }

    #[test]
    fn test_static_flag_pins_body() {
        let mut backend = RapierBackend::default();
        let block = backend
            .create_collision_object(&desc(CollisionShape::cuboid(Vec3::new(1.0, 1.0, 1.0)), BodyKind::RigidBody { mass: 1.0 }, Vec3::new(0.0, 0.0, 3.0)))
            .unwrap();

        backend.set_collision_flag(block, CollisionFlag::STATIC_OBJECT);
        step_for(&mut backend, 0.5);

        assert_eq!(backend.collision_flag(block), Some(CollisionFlag::STATIC_OBJECT));
        assert_relative_eq!(backend.transform(block).unwrap().0.z, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_sensor_overlap_is_reported() {
        let mut backend = RapierBackend::default();
        let trigger = backend
            .create_collision_object(&desc(CollisionShape::cuboid(Vec3::new(2.0, 2.0, 2.0)), BodyKind::Overlapping, Vec3::zeros()))
            .unwrap();
        let visitor = backend
            .create_collision_object(&desc(CollisionShape::Sphere { radius: 0.5 }, BodyKind::Overlapping, Vec3::new(0.5, 0.0, 0.0)))
            .unwrap();

        step_for(&mut backend, 2.0 / 60.0);
        let pairs = backend.overlapping_pairs();
        assert_eq!(pairs.len(), 1);
        let (a, b) = pairs[0];
        assert!((a == trigger && b == visitor) || (a == visitor && b == trigger));

        backend.set_transform(visitor, Vec3::new(10.0, 0.0, 0.0), Quat::identity());
        step_for(&mut backend, 2.0 / 60.0);
        assert!(backend.overlapping_pairs().is_empty());
    }

    #[test]
    fn test_invalid_shapes_and_destroy() {
        let mut backend = RapierBackend::default();
        assert!(matches!(
            backend.create_collision_object(&desc(CollisionShape::Sphere { radius: 0.0 }, BodyKind::Overlapping, Vec3::zeros())),
            Err(PhysicsError::InvalidShape(_))
        ));
        assert_eq!(backend.object_count(), 0);

        let handle = backend
            .create_collision_object(&desc(CollisionShape::Sphere { radius: 1.0 }, BodyKind::Overlapping, Vec3::zeros()))
            .unwrap();
        backend.destroy_collision_object(handle);
        backend.destroy_collision_object(handle);
        assert_eq!(backend.object_count(), 0);
        assert!(backend.transform(handle).is_none());
    }
}
