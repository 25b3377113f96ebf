//! Scene graph
//!
//! Components form a transform hierarchy stored in an arena; objects own a
//! root component plus sub-components.

pub mod bounds;
pub mod component;
pub mod object;
pub mod scene_graph;

pub use bounds::{Frustum, Plane, AABB};
pub use component::{Component, ComponentBehavior, ComponentKind, LifecycleState, LocalTransform};
pub use object::ObjectBase;
pub use scene_graph::{DestroyedNodes, PendingBatch, Scene, SceneError, SceneResult};
