//! Physics integration
//!
//! Collision detection and dynamics are delegated to a [`PhysicsBackend`];
//! [`RapierBackend`] is the default. [`PhysicsWorld`] ties backend objects to
//! scene objects.

pub mod backend;
pub mod collision;
pub mod physics_object;
pub mod rapier_backend;
pub mod world;

pub use backend::{BodyKind, CollisionObjectDesc, PhysicsBackend, PhysicsError, PhysicsHandle, PhysicsResult};
pub use collision::{should_collide, ActivationState, CollisionFlag, CollisionGroup, CollisionMask, CollisionShape};
pub use physics_object::{PhysicsObject, PhysicsObjectInitializationData, RigidBody};
pub use rapier_backend::RapierBackend;
pub use world::{OverlapEvent, PhysicsWorld};
