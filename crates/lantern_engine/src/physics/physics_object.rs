//! Scene objects that take part in the physics simulation
//!
//! A [`PhysicsObject`] pairs a scene object with a collision component and,
//! once initialized, a backend collision object. Settings changed before
//! init are buffered and applied when the backend object is created.

use crate::foundation::collections::{ComponentId, ObjectId};
use crate::foundation::math::Vec3;
use crate::physics::backend::{BodyKind, CollisionObjectDesc, PhysicsBackend, PhysicsError, PhysicsHandle, PhysicsResult};
use crate::physics::collision::{ActivationState, CollisionFlag, CollisionGroup, CollisionMask};
use crate::scene::{ComponentKind, Scene};

/// Settings applied to the backend object when it is created
///
/// `None` leaves the backend default in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicsObjectInitializationData {
    /// Speed above which continuous collision detection runs
    pub ccd_motion_threshold: Option<f32>,
    /// Swept sphere radius for continuous collision detection
    pub ccd_swept_sphere_radius: Option<f32>,
    /// Simulation flags
    pub collision_flag: Option<CollisionFlag>,
    /// Initial sleep / simulation state
    pub activation_state: Option<ActivationState>,
}

/// Physics state of one scene object
#[derive(Debug, Clone)]
pub struct PhysicsObject {
    object: ObjectId,
    collision_component: ComponentId,
    kind: BodyKind,
    handle: Option<PhysicsHandle>,

    group: CollisionGroup,
    mask: CollisionMask,
    tag: String,
    physics_tick_enabled: bool,
    is_active: bool,

    settings: PhysicsObjectInitializationData,
}

impl PhysicsObject {
    /// Physics object simulated as a body of the given kind
    pub fn new(object: ObjectId, collision_component: ComponentId, kind: BodyKind) -> Self {
        Self {
            object,
            collision_component,
            kind,
            handle: None,
            group: CollisionGroup::WORLD_DYNAMIC_BLOCK,
            mask: CollisionMask::BLOCK_AND_OVERLAP_ALL,
            tag: "None".to_string(),
            physics_tick_enabled: true,
            is_active: true,
            settings: PhysicsObjectInitializationData::default(),
        }
    }

    /// Dynamic rigid body with the given mass
    pub fn rigid_body(object: ObjectId, collision_component: ComponentId, mass: f32) -> Self {
        Self::new(object, collision_component, BodyKind::RigidBody { mass })
    }

    /// Volume that follows the scene and reports overlaps
    pub fn overlapping(object: ObjectId, collision_component: ComponentId) -> Self {
        let mut physics_object = Self::new(object, collision_component, BodyKind::Overlapping);
        physics_object.group = CollisionGroup::WORLD_DYNAMIC_OVERLAP;
        physics_object
    }

    /// Create the backend object from the collision component's current
    /// world transform
    ///
    /// Calling it again on an initialized object does nothing.
    pub fn init(&mut self, backend: &mut dyn PhysicsBackend, scene: &Scene) -> PhysicsResult<PhysicsHandle> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }

        let component = scene
            .component(self.collision_component)
            .ok_or_else(|| PhysicsError::Backend(format!("collision component {:?} does not exist", self.collision_component)))?;
        let ComponentKind::Collision(shape) = component.kind() else {
            return Err(PhysicsError::InvalidShape(format!("component '{}' carries no collision shape", component.name())));
        };

        let handle = backend.create_collision_object(&CollisionObjectDesc {
            shape: shape.scaled(component.world_scaling()),
            kind: self.kind,
            position: component.world_position(),
            rotation: component.world_rotation(),
            group: self.group,
            mask: self.mask,
        })?;

        if let Some(flag) = self.settings.collision_flag {
            backend.set_collision_flag(handle, flag);
        }
        if let Some(state) = self.settings.activation_state {
            backend.set_activation_state(handle, state);
        }
        if let Some(threshold) = self.settings.ccd_motion_threshold {
            backend.set_ccd_motion_threshold(handle, threshold);
        }
        if let Some(radius) = self.settings.ccd_swept_sphere_radius {
            backend.set_ccd_swept_sphere_radius(handle, radius);
        }
        if !self.is_active {
            backend.set_active(handle, false);
        }

        self.handle = Some(handle);
        Ok(handle)
    }

    /// Free the backend object; the physics object can be initialized again
    pub fn destroy_inner(&mut self, backend: &mut dyn PhysicsBackend) {
        if let Some(handle) = self.handle.take() {
            backend.destroy_collision_object(handle);
        }
    }

    /// Owning scene object
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Component whose shape and transform the body uses
    pub fn collision_component(&self) -> ComponentId {
        self.collision_component
    }

    /// Simulation role
    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    /// Backend handle, present once initialized
    pub fn handle(&self) -> Option<PhysicsHandle> {
        self.handle
    }

    /// Whether the backend object exists
    pub fn is_initialized(&self) -> bool {
        self.handle.is_some()
    }

    /// Rigid-body view, `None` for overlapping volumes
    pub fn as_rigid_body(&self) -> Option<RigidBody<'_>> {
        match self.kind {
            BodyKind::RigidBody { mass } => Some(RigidBody { physics_object: self, mass }),
            BodyKind::Overlapping => None,
        }
    }

    /// Whether the object's transform is driven by the scene rather than the simulation
    pub fn follows_scene(&self) -> bool {
        self.kind == BodyKind::Overlapping || self.collision_flag().contains(CollisionFlag::KINEMATIC_OBJECT)
    }

    /// Group this object belongs to
    pub fn collision_group(&self) -> CollisionGroup {
        self.group
    }

    /// Groups this object collides or overlaps with
    pub fn collision_mask(&self) -> CollisionMask {
        self.mask
    }

    /// Change the category; applied immediately when live
    pub fn set_collision_group(&mut self, backend: &mut dyn PhysicsBackend, group: CollisionGroup) {
        self.group = group;
        if let Some(handle) = self.handle {
            backend.set_collision_filter(handle, self.group, self.mask);
        }
    }

    /// Change the interaction mask; applied immediately when live
    pub fn set_collision_mask(&mut self, backend: &mut dyn PhysicsBackend, mask: CollisionMask) {
        self.mask = mask;
        if let Some(handle) = self.handle {
            backend.set_collision_filter(handle, self.group, self.mask);
        }
    }

    /// Body behaviour flags
    pub fn collision_flag(&self) -> CollisionFlag {
        self.settings.collision_flag.unwrap_or_default()
    }

    /// Set the body behaviour flags
    pub fn set_collision_flag(&mut self, backend: &mut dyn PhysicsBackend, flag: CollisionFlag) {
        self.settings.collision_flag = Some(flag);
        if let Some(handle) = self.handle {
            backend.set_collision_flag(handle, flag);
        }
    }

    /// Sleep and simulation state
    pub fn activation_state(&self) -> ActivationState {
        self.settings.activation_state.unwrap_or_default()
    }

    /// Set the sleep and simulation state
    pub fn set_activation_state(&mut self, backend: &mut dyn PhysicsBackend, state: ActivationState) {
        self.settings.activation_state = Some(state);
        if let Some(handle) = self.handle {
            backend.set_activation_state(handle, state);
        }
    }

    /// Speed above which continuous collision detection kicks in
    pub fn ccd_motion_threshold(&self) -> f32 {
        self.settings.ccd_motion_threshold.unwrap_or(0.0)
    }

    /// Set the continuous collision detection threshold
    pub fn set_ccd_motion_threshold(&mut self, backend: &mut dyn PhysicsBackend, threshold: f32) {
        self.settings.ccd_motion_threshold = Some(threshold);
        if let Some(handle) = self.handle {
            backend.set_ccd_motion_threshold(handle, threshold);
        }
    }

    /// Radius of the sphere swept for continuous collision detection
    pub fn ccd_swept_sphere_radius(&self) -> f32 {
        self.settings.ccd_swept_sphere_radius.unwrap_or(0.0)
    }

    /// Set the swept sphere radius
    pub fn set_ccd_swept_sphere_radius(&mut self, backend: &mut dyn PhysicsBackend, radius: f32) {
        self.settings.ccd_swept_sphere_radius = Some(radius);
        if let Some(handle) = self.handle {
            backend.set_ccd_swept_sphere_radius(handle, radius);
        }
    }

    /// Buffered settings
    pub fn initialization_data(&self) -> &PhysicsObjectInitializationData {
        &self.settings
    }

    /// Whether the body takes part in the simulation
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Include or exclude the object from simulation without destroying it
    pub fn set_is_active(&mut self, backend: &mut dyn PhysicsBackend, active: bool) {
        self.is_active = active;
        if let Some(handle) = self.handle {
            backend.set_active(handle, active);
        }
    }

    /// User tag
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Set the user tag
    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = tag.into();
    }

    /// Whether simulated transforms are written back to the scene
    pub fn is_physics_tick_enabled(&self) -> bool {
        self.physics_tick_enabled
    }

    /// Enable or disable writing simulated transforms back to the scene
    pub fn set_physics_tick_enabled(&mut self, enabled: bool) {
        self.physics_tick_enabled = enabled;
    }
}

/// Borrowed view of a physics object simulated as a rigid body
#[derive(Debug, Clone, Copy)]
pub struct RigidBody<'a> {
    physics_object: &'a PhysicsObject,
    mass: f32,
}

impl RigidBody<'_> {
    /// Mass in kilograms
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Backend handle, present once initialized
    pub fn handle(&self) -> Option<PhysicsHandle> {
        self.physics_object.handle
    }

    /// Apply a force for the next simulation step; ignored before init
    pub fn apply_force(&self, backend: &mut dyn PhysicsBackend, force: Vec3) {
        if let Some(handle) = self.handle() {
            backend.apply_force(handle, force);
        }
    }

    /// Apply an instantaneous impulse; ignored before init
    pub fn apply_impulse(&self, backend: &mut dyn PhysicsBackend, impulse: Vec3) {
        if let Some(handle) = self.handle() {
            backend.apply_impulse(handle, impulse);
        }
    }

    /// Current linear velocity, `None` before init
    pub fn linear_velocity(&self, backend: &dyn PhysicsBackend) -> Option<Vec3> {
        backend.linear_velocity(self.handle()?)
    }

    /// Overwrite the linear velocity
    pub fn set_linear_velocity(&self, backend: &mut dyn PhysicsBackend, velocity: Vec3) {
        if let Some(handle) = self.handle() {
            backend.set_linear_velocity(handle, velocity);
        }
    }
}
