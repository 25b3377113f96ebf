//! Scene-graph component node
//!
//! A component carries a local (relative) transform and caches both its
//! relative matrix and its component-to-world matrix. The arena that owns the
//! nodes ([`Scene`](super::Scene)) keeps the cache coherent: every mutator
//! recomputes the node and its whole subtree before returning.

use std::fmt;

use crate::foundation::collections::{CameraId, ComponentId, MeshInstanceId, ObjectId};
use crate::foundation::math::{utils, Mat4, Mat4Ext, Quat, Transform, Vec3};
use crate::physics::CollisionShape;

/// What a component contributes besides its transform
///
/// The set of component kinds is closed; systems that care about a kind
/// (renderer, camera manager, physics) match on it instead of downcasting.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentKind {
    /// Plain transform node
    Scene,

    /// Renders a mesh instance registered with the renderer
    Mesh(MeshInstanceId),

    /// Drives a camera owned by the camera manager
    Camera(CameraId),

    /// Collision shape used by the owning physics object
    Collision(CollisionShape),
}

/// Lifecycle stage of a component or object
///
/// Stages only move forward; each transition runs exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Constructed, nothing has run yet
    Created,
    /// `pre_init` has run
    PreInitialized,
    /// `init` has run
    Initialized,
    /// `post_init` has run
    PostInitialized,
    /// `begin_game` has run; the node ticks from now on
    Playing,
}

/// Local transform of a component relative to its parent
#[derive(Debug, Clone, PartialEq)]
pub struct LocalTransform {
    /// Relative position
    pub position: Vec3,
    /// Relative rotation
    pub rotation: Quat,
    /// Relative scaling
    pub scaling: Vec3,
    /// Point rotation and scaling are applied about
    pub pivot: Vec3,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scaling: Vec3::new(1.0, 1.0, 1.0),
            pivot: Vec3::zeros(),
        }
    }
}

impl LocalTransform {
    /// translate(pivot) · T(position) · R(rotation) · S(scaling) · translate(−pivot)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::translation(&self.pivot)
            * Mat4::transformation(&self.rotation, &self.position, &self.scaling)
            * Mat4::translation(&(-self.pivot))
    }
}

/// Per-component gameplay hook
///
/// Behaviours receive the component's local transform; when they change it
/// the scene recomputes the component's subtree right after the call.
pub trait ComponentBehavior {
    /// Called once when the owning object begins play
    fn begin_game(&mut self, _transform: &mut LocalTransform) {}

    /// Called every frame while the component is active, tick-enabled and tickable
    fn tick_component(&mut self, transform: &mut LocalTransform, delta_time: f32);
}

/// Scene-graph node
pub struct Component {
    pub(super) name: String,
    pub(super) guid: u32,
    pub(super) kind: ComponentKind,
    pub(super) owner: ObjectId,
    pub(super) parent: Option<ComponentId>,
    pub(super) children: Vec<ComponentId>,

    pub(super) local: LocalTransform,
    pub(super) relative_transformation: Mat4,
    pub(super) component_to_world: Mat4,
    pub(super) world: Transform,

    pub(super) is_active: bool,
    pub(super) is_tickable: bool,
    pub(super) is_tick_enabled: bool,
    pub(super) is_pending_destroy: bool,
    pub(super) state: LifecycleState,

    pub(super) behavior: Option<Box<dyn ComponentBehavior>>,
}

impl Component {
    pub(super) fn new(name: impl Into<String>, guid: u32, owner: ObjectId, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            guid,
            kind,
            owner,
            parent: None,
            children: Vec::new(),
            local: LocalTransform::default(),
            relative_transformation: Mat4::identity(),
            component_to_world: Mat4::identity(),
            world: Transform::identity(),
            is_active: true,
            is_tickable: false,
            is_tick_enabled: true,
            is_pending_destroy: false,
            state: LifecycleState::Created,
            behavior: None,
        }
    }

    /// Recompute the cached relative matrix from the local transform
    pub(super) fn update_relative_transformation_matrix(&mut self) {
        self.relative_transformation = self.local.to_matrix();
    }

    /// Store a freshly composed component-to-world matrix
    pub(super) fn apply_component_to_world(&mut self, matrix: Mat4) {
        self.component_to_world = matrix;
        self.world = Transform::from_matrix(&matrix);
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique id assigned at creation
    pub fn guid(&self) -> u32 {
        self.guid
    }

    /// Kind tag
    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    /// Owning object
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    /// Parent component, `None` for object roots and detached nodes
    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    /// Children in attachment order
    pub fn children(&self) -> &[ComponentId] {
        &self.children
    }

    /// Local transform
    pub fn local_transform(&self) -> &LocalTransform {
        &self.local
    }

    /// Relative position
    pub fn relative_position(&self) -> Vec3 {
        self.local.position
    }

    /// Relative rotation
    pub fn relative_rotation(&self) -> Quat {
        self.local.rotation
    }

    /// Relative scaling
    pub fn relative_scaling(&self) -> Vec3 {
        self.local.scaling
    }

    /// Pivot point
    pub fn pivot_point(&self) -> Vec3 {
        self.local.pivot
    }

    /// World position
    pub fn world_position(&self) -> Vec3 {
        self.world.position
    }

    /// World rotation
    pub fn world_rotation(&self) -> Quat {
        self.world.rotation
    }

    /// World scaling
    pub fn world_scaling(&self) -> Vec3 {
        self.world.scale
    }

    /// Cached relative transformation matrix
    pub fn relative_transformation_matrix(&self) -> &Mat4 {
        &self.relative_transformation
    }

    /// Cached component-to-world matrix
    pub fn component_to_world_matrix(&self) -> &Mat4 {
        &self.component_to_world
    }

    /// Relative forward (local +X), normalized on every call
    pub fn relative_forward_vector(&self) -> Vec3 {
        utils::axis_of(&self.relative_transformation, 0)
    }

    /// Relative left (local +Y), normalized on every call
    pub fn relative_left_vector(&self) -> Vec3 {
        utils::axis_of(&self.relative_transformation, 1)
    }

    /// Relative up (local +Z), normalized on every call
    pub fn relative_up_vector(&self) -> Vec3 {
        utils::axis_of(&self.relative_transformation, 2)
    }

    /// World forward, normalized on every call
    pub fn world_forward_vector(&self) -> Vec3 {
        utils::axis_of(&self.component_to_world, 0)
    }

    /// World left, normalized on every call
    pub fn world_left_vector(&self) -> Vec3 {
        utils::axis_of(&self.component_to_world, 1)
    }

    /// World up, normalized on every call
    pub fn world_up_vector(&self) -> Vec3 {
        utils::axis_of(&self.component_to_world, 2)
    }

    /// Whether the component is active
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Whether the component wants ticks at all
    pub fn is_tickable(&self) -> bool {
        self.is_tickable
    }

    /// Whether ticking is currently enabled
    pub fn is_tick_enabled(&self) -> bool {
        self.is_tick_enabled
    }

    /// Whether `init` has run
    pub fn is_initialized(&self) -> bool {
        self.state >= LifecycleState::Initialized
    }

    /// Whether the component is being torn down
    pub fn is_pending_destroy(&self) -> bool {
        self.is_pending_destroy
    }

    /// Current lifecycle stage
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.state
    }

    /// All three tick gates pass
    pub fn should_tick(&self) -> bool {
        self.is_active && self.is_tick_enabled && self.is_tickable
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("guid", &self.guid)
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("local", &self.local)
            .field("world", &self.world)
            .field("state", &self.state)
            .field("has_behavior", &self.behavior.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pivot_rotates_about_offset_point() {
        let transform = LocalTransform {
            rotation: Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::PI),
            pivot: Vec3::new(1.0, 0.0, 0.0),
            ..Default::default()
        };

        let matrix = transform.to_matrix();
        let origin = matrix * nalgebra::Vector4::new(0.0, 0.0, 0.0, 1.0);

        // Origin rotated half a turn about (1,0,0) lands on (2,0,0)
        assert_relative_eq!(origin.xyz(), Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_tick_gates_are_independent() {
        let mut component = Component::new("c", 1, ObjectId::default(), ComponentKind::Scene);
        assert!(!component.should_tick());

        component.is_tickable = true;
        assert!(component.should_tick());

        component.is_tick_enabled = false;
        assert!(!component.should_tick());

        component.is_tick_enabled = true;
        component.is_active = false;
        assert!(!component.should_tick());
    }
}
