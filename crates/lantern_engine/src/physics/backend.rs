//! Physics backend seam
//!
//! The engine never performs collision detection itself. Every simulation
//! request goes through [`PhysicsBackend`], which hands out opaque
//! [`PhysicsHandle`]s for the collision objects it owns.

use thiserror::Error;

use crate::foundation::math::{Quat, Vec3};
use crate::physics::collision::{ActivationState, CollisionFlag, CollisionGroup, CollisionMask, CollisionShape};

/// Opaque handle of a backend collision object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicsHandle(pub(crate) u64);

/// How a collision object takes part in the simulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyKind {
    /// Simulated body with the given mass in kilograms
    RigidBody {
        /// Mass in kilograms
        mass: f32,
    },
    /// Volume that follows the scene and only reports overlaps
    Overlapping,
}

/// Everything needed to create a collision object
#[derive(Debug, Clone)]
pub struct CollisionObjectDesc {
    /// Shape in world scale
    pub shape: CollisionShape,
    /// Simulation role
    pub kind: BodyKind,
    /// World position
    pub position: Vec3,
    /// World rotation
    pub rotation: Quat,
    /// Category
    pub group: CollisionGroup,
    /// Categories interacted with
    pub mask: CollisionMask,
}

/// Errors reported by a physics backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// Backend-specific failure
    #[error("Physics backend error: {0}")]
    Backend(String),

    /// Shape cannot be built (degenerate hull, non-positive size)
    #[error("Invalid collision shape: {0}")]
    InvalidShape(String),

    /// Handle does not refer to a live collision object
    #[error("Unknown physics handle {0:?}")]
    UnknownHandle(PhysicsHandle),
}

/// Result type for physics operations
pub type PhysicsResult<T> = Result<T, PhysicsError>;

/// Collision world implementation
///
/// Operations on stale handles are ignored; queries on them return `None`.
pub trait PhysicsBackend {
    /// Set world gravity
    fn set_gravity(&mut self, gravity: Vec3);

    /// Create a collision object
    fn create_collision_object(&mut self, desc: &CollisionObjectDesc) -> PhysicsResult<PhysicsHandle>;

    /// Remove a collision object from the world and free it
    fn destroy_collision_object(&mut self, handle: PhysicsHandle);

    /// Include or exclude an object from simulation without destroying it
    fn set_active(&mut self, handle: PhysicsHandle, active: bool);

    /// Whether an object is simulated
    fn is_active(&self, handle: PhysicsHandle) -> bool;

    /// Replace an object's simulation flags
    fn set_collision_flag(&mut self, handle: PhysicsHandle, flag: CollisionFlag);

    /// Current simulation flags
    fn collision_flag(&self, handle: PhysicsHandle) -> Option<CollisionFlag>;

    /// Change sleep / simulation state
    fn set_activation_state(&mut self, handle: PhysicsHandle, state: ActivationState);

    /// Current sleep / simulation state
    fn activation_state(&self, handle: PhysicsHandle) -> Option<ActivationState>;

    /// Replace group and mask
    fn set_collision_filter(&mut self, handle: PhysicsHandle, group: CollisionGroup, mask: CollisionMask);

    /// Speed above which continuous collision detection kicks in; 0 disables it
    fn set_ccd_motion_threshold(&mut self, handle: PhysicsHandle, threshold: f32);

    /// Radius of the sphere swept for continuous collision detection
    fn set_ccd_swept_sphere_radius(&mut self, handle: PhysicsHandle, radius: f32);

    /// Motion threshold and swept-sphere radius
    fn ccd_parameters(&self, handle: PhysicsHandle) -> Option<(f32, f32)>;

    /// Teleport an object
    fn set_transform(&mut self, handle: PhysicsHandle, position: Vec3, rotation: Quat);

    /// Simulated world transform
    fn transform(&self, handle: PhysicsHandle) -> Option<(Vec3, Quat)>;

    /// Set linear velocity
    fn set_linear_velocity(&mut self, handle: PhysicsHandle, velocity: Vec3);

    /// Linear velocity
    fn linear_velocity(&self, handle: PhysicsHandle) -> Option<Vec3>;

    /// Apply a force at the centre of mass for the next step
    fn apply_force(&mut self, handle: PhysicsHandle, force: Vec3);

    /// Apply an instantaneous impulse at the centre of mass
    fn apply_impulse(&mut self, handle: PhysicsHandle, impulse: Vec3);

    /// Advance the simulation
    fn step(&mut self, delta_time: f32);

    /// Pairs of objects currently overlapping, each pair reported once
    fn overlapping_pairs(&self) -> Vec<(PhysicsHandle, PhysicsHandle)>;

    /// Number of live collision objects
    fn object_count(&self) -> usize;
}
