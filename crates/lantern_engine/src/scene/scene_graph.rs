//! Scene arena
//!
//! [`Scene`] owns every component and object. Parent links are plain
//! [`ComponentId`] back-references and child lists are ordered id vectors, so
//! ownership flows strictly downward: destroying a node destroys its subtree.
//!
//! Transform propagation is synchronous and depth-first. When a mutator
//! returns, the node and every descendant already hold their new
//! component-to-world matrix.

use thiserror::Error;

use crate::foundation::collections::{ComponentId, ObjectId, SlotMap};
use crate::foundation::math::{Mat4, Point3, Quat, Vec3, EPSILON};
use crate::foundation::logging::{debug, trace};
use crate::scene::component::{Component, ComponentBehavior, ComponentKind, LifecycleState, LocalTransform};
use crate::scene::object::ObjectBase;

/// Scene-graph errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// Component id is stale or was never issued
    #[error("Unknown component {0:?}")]
    UnknownComponent(ComponentId),

    /// Object id is stale or was never issued
    #[error("Unknown object {0:?}")]
    UnknownObject(ObjectId),

    /// Attaching would make a component its own ancestor
    #[error("Attaching {child:?} under {parent:?} would create a cycle")]
    HierarchyCycle {
        /// Component being attached
        child: ComponentId,
        /// Requested parent
        parent: ComponentId,
    },
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;

/// Everything removed by one destroy call
#[derive(Debug, Default)]
pub struct DestroyedNodes {
    /// Removed components in removal order (children before parents)
    pub components: Vec<(ComponentId, Component)>,

    /// Removed objects
    pub objects: Vec<ObjectId>,
}

impl DestroyedNodes {
    /// Whether nothing was removed
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.objects.is_empty()
    }
}

/// Newly created objects and components waiting for their lifecycle calls
#[derive(Debug, Default, Clone)]
pub struct PendingBatch {
    /// Objects in creation order
    pub objects: Vec<ObjectId>,

    /// Components in creation order, including every component of `objects`
    pub components: Vec<ComponentId>,
}

impl PendingBatch {
    /// Whether the batch holds nothing
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.components.is_empty()
    }
}

/// Component and object arena
pub struct Scene {
    components: SlotMap<ComponentId, Component>,
    objects: SlotMap<ObjectId, ObjectBase>,
    pending_objects: Vec<ObjectId>,
    pending_components: Vec<ComponentId>,
    next_guid: u32,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self {
            components: SlotMap::with_key(),
            objects: SlotMap::with_key(),
            pending_objects: Vec::new(),
            pending_components: Vec::new(),
            next_guid: 0,
        }
    }

    fn allocate_guid(&mut self) -> u32 {
        self.next_guid += 1;
        self.next_guid
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create an object with a plain root component
    ///
    /// The object is queued and runs its lifecycle at the next frame boundary.
    pub fn create_object(&mut self, name: impl Into<String>) -> ObjectId {
        let name = name.into();
        let root_guid = self.allocate_guid();
        let root = self.components.insert(Component::new(
            format!("{name}.root"),
            root_guid,
            ObjectId::default(),
            ComponentKind::Scene,
        ));

        let guid = self.allocate_guid();
        let object = self.objects.insert(ObjectBase::new(name, guid, root));
        if let Some(component) = self.components.get_mut(root) {
            component.owner = object;
            component.update_relative_transformation_matrix();
            component.apply_component_to_world(component.relative_transformation);
        }

        self.pending_objects.push(object);
        debug!("Created object {:?} with root {:?}", object, root);
        object
    }

    /// Add a component under an object's root component
    pub fn add_component(&mut self, object: ObjectId, name: impl Into<String>, kind: ComponentKind) -> Option<ComponentId> {
        let root = self.objects.get(object)?.root;
        self.add_child_component(root, name, kind)
    }

    /// Add a component under another component, owned by the same object
    pub fn add_child_component(&mut self, parent: ComponentId, name: impl Into<String>, kind: ComponentKind) -> Option<ComponentId> {
        let owner = self.components.get(parent)?.owner;
        let guid = self.allocate_guid();
        let id = self.components.insert(Component::new(name, guid, owner, kind));

        if let Some(component) = self.components.get_mut(id) {
            component.parent = Some(parent);
            component.update_relative_transformation_matrix();
        }
        if let Some(parent_component) = self.components.get_mut(parent) {
            parent_component.children.push(id);
        }

        if let Some(object) = self.objects.get_mut(owner) {
            object.components.push(id);
            // Objects still waiting in the queue pick the component up with them
            if object.state != LifecycleState::Created {
                self.pending_components.push(id);
            }
        }

        self.update_component_to_world(id);
        Some(id)
    }

    /// Replace a component's kind tag
    pub(crate) fn set_component_kind(&mut self, id: ComponentId, kind: ComponentKind) {
        if let Some(component) = self.components.get_mut(id) {
            component.kind = kind;
        }
    }

    /// Attach a behaviour; the component becomes tickable
    pub fn set_behavior(&mut self, id: ComponentId, behavior: Box<dyn ComponentBehavior>) {
        if let Some(component) = self.components.get_mut(id) {
            component.behavior = Some(behavior);
            component.is_tickable = true;
        }
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Component by id
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id)
    }

    /// Object by id
    pub fn object(&self, id: ObjectId) -> Option<&ObjectBase> {
        self.objects.get(id)
    }

    /// Whether a component id is live
    pub fn contains_component(&self, id: ComponentId) -> bool {
        self.components.contains_key(id)
    }

    /// Whether an object id is live
    pub fn contains_object(&self, id: ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Iterate over all components
    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &Component)> {
        self.components.iter()
    }

    /// Iterate over all objects
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &ObjectBase)> {
        self.objects.iter()
    }

    /// Number of live components
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Number of live objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of objects waiting for their lifecycle
    pub fn pending_object_count(&self) -> usize {
        self.pending_objects.len()
    }

    /// Component and all descendants, depth-first pre-order
    pub fn subtree(&self, id: ComponentId) -> Vec<ComponentId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(component) = self.components.get(current) else { continue };
            result.push(current);
            stack.extend(component.children.iter().rev().copied());
        }
        result
    }

    /// Objects whose root component lies in the subtree of `id`
    pub fn objects_rooted_under(&self, id: ComponentId) -> Vec<ObjectId> {
        self.subtree(id)
            .into_iter()
            .filter_map(|component| {
                let owner = self.components.get(component)?.owner;
                (self.objects.get(owner)?.root == component).then_some(owner)
            })
            .collect()
    }

    /// The object and every object that would be destroyed along with it
    pub fn dependent_objects(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if result.contains(&current) {
                continue;
            }
            let Some(object) = self.objects.get(current) else { continue };
            result.push(current);
            for &component in &object.components {
                stack.extend(
                    self.objects_rooted_under(component)
                        .into_iter()
                        .filter(|other| *other != current),
                );
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Transforms
    // ------------------------------------------------------------------

    fn modify_local(&mut self, id: ComponentId, update: bool, modify: impl FnOnce(&mut LocalTransform)) {
        let Some(component) = self.components.get_mut(id) else { return };
        modify(&mut component.local);
        if update {
            self.update_relative_transformation(id);
        }
    }

    /// Set relative position and propagate
    pub fn set_relative_position(&mut self, id: ComponentId, position: Vec3) {
        self.modify_local(id, true, |local| local.position = position);
    }

    /// Set relative rotation and propagate
    pub fn set_relative_rotation(&mut self, id: ComponentId, rotation: Quat) {
        self.modify_local(id, true, |local| local.rotation = rotation);
    }

    /// Set relative scaling and propagate
    pub fn set_relative_scaling(&mut self, id: ComponentId, scaling: Vec3) {
        self.modify_local(id, true, |local| local.scaling = scaling);
    }

    /// Set the pivot point and propagate
    pub fn set_pivot_point(&mut self, id: ComponentId, pivot: Vec3) {
        self.modify_local(id, true, |local| local.pivot = pivot);
    }

    /// Replace the whole local transform and propagate
    pub fn set_local_transform(&mut self, id: ComponentId, transform: LocalTransform) {
        self.modify_local(id, true, |local| *local = transform);
    }

    /// Set relative position without propagating
    pub fn stage_relative_position(&mut self, id: ComponentId, position: Vec3) {
        self.modify_local(id, false, |local| local.position = position);
    }

    /// Set relative rotation without propagating
    pub fn stage_relative_rotation(&mut self, id: ComponentId, rotation: Quat) {
        self.modify_local(id, false, |local| local.rotation = rotation);
    }

    /// Set relative scaling without propagating
    pub fn stage_relative_scaling(&mut self, id: ComponentId, scaling: Vec3) {
        self.modify_local(id, false, |local| local.scaling = scaling);
    }

    /// Recompute the relative matrix, then the world matrices of the subtree
    pub fn update_relative_transformation(&mut self, id: ComponentId) {
        let Some(component) = self.components.get_mut(id) else { return };
        component.update_relative_transformation_matrix();
        self.update_component_to_world(id);
    }

    fn parent_world_matrix(&self, id: ComponentId) -> Mat4 {
        self.components
            .get(id)
            .and_then(|component| component.parent)
            .and_then(|parent| self.components.get(parent))
            .map_or_else(Mat4::identity, |parent| parent.component_to_world)
    }

    fn update_component_to_world(&mut self, id: ComponentId) {
        let parent_world = self.parent_world_matrix(id);
        let Some(component) = self.components.get_mut(id) else { return };
        component.apply_component_to_world(parent_world * component.relative_transformation);
        trace!("Component {:?} world position {:?}", id, component.world.position);

        let mut index = 0;
        while let Some(child) = self.components.get(id).and_then(|c| c.children.get(index).copied()) {
            self.update_component_to_world(child);
            index += 1;
        }
    }

    // ------------------------------------------------------------------
    // Object transforms
    // ------------------------------------------------------------------

    fn root_of(&self, object: ObjectId) -> Option<ComponentId> {
        self.objects.get(object).map(|o| o.root)
    }

    fn root_parent(&self, object: ObjectId) -> Option<&Component> {
        let root = self.root_of(object)?;
        let parent = self.components.get(root)?.parent?;
        self.components.get(parent)
    }

    /// Place an object in world space
    pub fn set_object_world_position(&mut self, object: ObjectId, position: Vec3) {
        let Some(root) = self.root_of(object) else { return };
        let local = match self.root_parent(object) {
            Some(parent) => parent
                .component_to_world
                .try_inverse()
                .map_or(position, |inverse| inverse.transform_point(&Point3::from(position)).coords),
            None => position,
        };
        self.set_relative_position(root, local);
    }

    /// Orient an object in world space
    pub fn set_object_world_rotation(&mut self, object: ObjectId, rotation: Quat) {
        let Some(root) = self.root_of(object) else { return };
        let local = match self.root_parent(object) {
            Some(parent) => parent.world.rotation.inverse() * rotation,
            None => rotation,
        };
        self.set_relative_rotation(root, local);
    }

    /// Scale an object in world space
    pub fn set_object_world_scaling(&mut self, object: ObjectId, scaling: Vec3) {
        let Some(root) = self.root_of(object) else { return };
        let local = match self.root_parent(object) {
            Some(parent) => scaling.zip_map(&parent.world.scale, |s, p| if p.abs() > EPSILON { s / p } else { s }),
            None => scaling,
        };
        self.set_relative_scaling(root, local);
    }

    fn root_component(&self, object: ObjectId) -> Option<&Component> {
        self.components.get(self.root_of(object)?)
    }

    /// World position of an object's root component
    pub fn object_world_position(&self, object: ObjectId) -> Option<Vec3> {
        self.root_component(object).map(Component::world_position)
    }

    /// World rotation of an object's root component
    pub fn object_world_rotation(&self, object: ObjectId) -> Option<Quat> {
        self.root_component(object).map(Component::world_rotation)
    }

    /// World scaling of an object's root component
    pub fn object_world_scaling(&self, object: ObjectId) -> Option<Vec3> {
        self.root_component(object).map(Component::world_scaling)
    }

    /// World forward vector of an object
    pub fn object_forward_vector(&self, object: ObjectId) -> Option<Vec3> {
        self.root_component(object).map(Component::world_forward_vector)
    }

    /// World left vector of an object
    pub fn object_left_vector(&self, object: ObjectId) -> Option<Vec3> {
        self.root_component(object).map(Component::world_left_vector)
    }

    /// World up vector of an object
    pub fn object_up_vector(&self, object: ObjectId) -> Option<Vec3> {
        self.root_component(object).map(Component::world_up_vector)
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    fn is_ancestor_or_self(&self, candidate: ComponentId, mut node: ComponentId) -> bool {
        loop {
            if node == candidate {
                return true;
            }
            match self.components.get(node).and_then(|c| c.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn detach(&mut self, child: ComponentId) {
        let Some(parent) = self.components.get_mut(child).and_then(|c| c.parent.take()) else { return };
        if let Some(parent_component) = self.components.get_mut(parent) {
            parent_component.children.retain(|c| *c != child);
        }
    }

    /// Move `child` under `parent`, keeping its relative transform
    pub fn set_parent(&mut self, child: ComponentId, parent: ComponentId) -> SceneResult<()> {
        if !self.components.contains_key(child) {
            return Err(SceneError::UnknownComponent(child));
        }
        if !self.components.contains_key(parent) {
            return Err(SceneError::UnknownComponent(parent));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(SceneError::HierarchyCycle { child, parent });
        }

        self.detach(child);
        if let Some(parent_component) = self.components.get_mut(parent) {
            parent_component.children.push(child);
        }
        if let Some(component) = self.components.get_mut(child) {
            component.parent = Some(parent);
        }

        self.update_component_to_world(child);
        trace!("Attached {:?} under {:?}", child, parent);
        Ok(())
    }

    /// Move `child` under an object's root component
    pub fn set_parent_object(&mut self, child: ComponentId, object: ObjectId) -> SceneResult<()> {
        let root = self.root_of(object).ok_or(SceneError::UnknownObject(object))?;
        self.set_parent(child, root)
    }

    /// Attach one object's root under another object's root
    pub fn set_object_parent(&mut self, child: ObjectId, parent: ObjectId) -> SceneResult<()> {
        let child_root = self.root_of(child).ok_or(SceneError::UnknownObject(child))?;
        self.set_parent_object(child_root, parent)
    }

    /// Detach `child` from `parent`; the child keeps its relative transform
    /// and becomes a root
    pub fn remove_child(&mut self, parent: ComponentId, child: ComponentId) {
        if self.components.get(child).and_then(|c| c.parent) != Some(parent) {
            return;
        }
        self.detach(child);
        self.update_component_to_world(child);
    }

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------

    /// Toggle a single component
    pub fn set_component_active(&mut self, id: ComponentId, active: bool) {
        if let Some(component) = self.components.get_mut(id) {
            component.is_active = active;
        }
    }

    /// Toggle whether a component wants ticks
    pub fn set_is_tickable(&mut self, id: ComponentId, tickable: bool) {
        if let Some(component) = self.components.get_mut(id) {
            component.is_tickable = tickable;
        }
    }

    /// Enable or disable ticking
    pub fn set_is_tick_enabled(&mut self, id: ComponentId, enabled: bool) {
        if let Some(component) = self.components.get_mut(id) {
            component.is_tick_enabled = enabled;
        }
    }

    /// Toggle an object and every component it owns
    pub fn set_object_active(&mut self, id: ObjectId, active: bool) {
        let Some(object) = self.objects.get_mut(id) else { return };
        object.is_active = active;
        for &component in &object.components {
            if let Some(component) = self.components.get_mut(component) {
                component.is_active = active;
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Drain the pending queues in creation order
    pub fn take_pending(&mut self) -> PendingBatch {
        let objects = std::mem::take(&mut self.pending_objects);
        let mut components: Vec<ComponentId> = objects
            .iter()
            .filter_map(|&object| self.objects.get(object))
            .flat_map(|object| object.components.iter().copied())
            .collect();
        components.append(&mut self.pending_components);

        PendingBatch { objects, components }
    }

    fn advance(&mut self, batch: &PendingBatch, from: LifecycleState, to: LifecycleState) {
        for &id in &batch.components {
            if let Some(component) = self.components.get_mut(id) {
                if component.state == from {
                    component.state = to;
                }
            }
        }
        for &id in &batch.objects {
            if let Some(object) = self.objects.get_mut(id) {
                if object.state == from {
                    object.state = to;
                }
            }
        }
    }

    /// Run the pre-init stage for a batch
    pub fn pre_init(&mut self, batch: &PendingBatch) {
        self.advance(batch, LifecycleState::Created, LifecycleState::PreInitialized);
    }

    /// Run the init stage for a batch
    pub fn init(&mut self, batch: &PendingBatch) {
        self.advance(batch, LifecycleState::PreInitialized, LifecycleState::Initialized);
    }

    /// Run the post-init stage for a batch
    pub fn post_init(&mut self, batch: &PendingBatch) {
        self.advance(batch, LifecycleState::Initialized, LifecycleState::PostInitialized);
    }

    /// Begin play for a batch; behaviours get their `begin_game` call
    pub fn begin_game(&mut self, batch: &PendingBatch) {
        for &id in &batch.components {
            let Some(component) = self.components.get_mut(id) else { continue };
            if component.state != LifecycleState::PostInitialized {
                continue;
            }
            component.state = LifecycleState::Playing;

            if let Some(mut behavior) = component.behavior.take() {
                let before = component.local.clone();
                behavior.begin_game(&mut component.local);
                let changed = component.local != before;
                component.behavior = Some(behavior);
                if changed {
                    self.update_relative_transformation(id);
                }
            }
        }
        self.advance(batch, LifecycleState::PostInitialized, LifecycleState::Playing);
    }

    /// Tick every playing component that passes all three tick gates
    pub fn tick(&mut self, delta_time: f32) {
        let tickable: Vec<ComponentId> = self
            .components
            .iter()
            .filter(|(_, c)| c.state == LifecycleState::Playing && c.should_tick() && c.behavior.is_some())
            .map(|(id, _)| id)
            .collect();

        for id in tickable {
            self.tick_component(id, delta_time);
        }
    }

    fn tick_component(&mut self, id: ComponentId, delta_time: f32) {
        // Gates are re-checked: an earlier tick this frame may have changed them
        let Some(component) = self.components.get_mut(id) else { return };
        if !component.should_tick() || component.is_pending_destroy {
            return;
        }
        let Some(mut behavior) = component.behavior.take() else { return };

        let before = component.local.clone();
        behavior.tick_component(&mut component.local, delta_time);
        let changed = component.local != before;
        component.behavior = Some(behavior);

        if changed {
            self.update_relative_transformation(id);
        }
    }

    // ------------------------------------------------------------------
    // Destruction
    // ------------------------------------------------------------------

    /// Destroy a component and its subtree
    ///
    /// Objects whose root component is removed are destroyed along with it.
    pub fn destroy_component(&mut self, id: ComponentId) -> DestroyedNodes {
        let mut destroyed = DestroyedNodes::default();
        self.destroy_component_into(id, &mut destroyed);
        destroyed
    }

    /// Destroy an object, every component it owns and every object attached
    /// below it
    pub fn destroy_object(&mut self, id: ObjectId) -> DestroyedNodes {
        let mut destroyed = DestroyedNodes::default();
        self.destroy_object_into(id, &mut destroyed);
        destroyed
    }

    fn destroy_object_into(&mut self, id: ObjectId, destroyed: &mut DestroyedNodes) {
        let Some(object) = self.objects.get_mut(id) else { return };
        if object.is_pending_destroy {
            return;
        }
        object.is_pending_destroy = true;

        let components = object.components.clone();
        for component in components {
            self.destroy_component_into(component, destroyed);
        }

        self.objects.remove(id);
        self.pending_objects.retain(|o| *o != id);
        destroyed.objects.push(id);
        debug!("Destroyed object {:?}", id);
    }

    fn destroy_component_into(&mut self, id: ComponentId, destroyed: &mut DestroyedNodes) {
        if !self.components.contains_key(id) {
            return;
        }
        self.detach(id);
        self.destroy_subtree(id, destroyed);
    }

    fn destroy_subtree(&mut self, id: ComponentId, destroyed: &mut DestroyedNodes) {
        let Some(component) = self.components.get_mut(id) else { return };
        component.is_pending_destroy = true;
        let children = std::mem::take(&mut component.children);

        for child in children {
            self.destroy_subtree(child, destroyed);
        }

        let Some(component) = self.components.remove(id) else { return };
        self.pending_components.retain(|c| *c != id);

        let owner = component.owner;
        let mut owner_lost_root = false;
        if let Some(object) = self.objects.get_mut(owner) {
            object.components.retain(|c| *c != id);
            owner_lost_root = object.root == id && !object.is_pending_destroy;
        }
        destroyed.components.push((id, component));

        if owner_lost_root {
            self.destroy_object_into(owner, destroyed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::foundation::math::constants::HALF_PI;

    fn scene_with_object() -> (Scene, ObjectId, ComponentId) {
        let mut scene = Scene::new();
        let object = scene.create_object("object");
        let root = scene.object(object).unwrap().root_component();
        (scene, object, root)
    }

    #[test]
    fn test_propagation_is_immediate() {
        let (mut scene, object, root) = scene_with_object();
        let child = scene.add_component(object, "child", ComponentKind::Scene).unwrap();
        let grandchild = scene.add_child_component(child, "grandchild", ComponentKind::Scene).unwrap();

        scene.set_relative_position(child, Vec3::new(0.0, 1.0, 0.0));
        scene.set_relative_position(grandchild, Vec3::new(0.0, 0.0, 1.0));
        scene.set_relative_position(root, Vec3::new(10.0, 0.0, 0.0));

        let world = scene.component(grandchild).unwrap().world_position();
        assert_relative_eq!(world, Vec3::new(10.0, 1.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_ancestor_rotation_moves_descendants() {
        let (mut scene, object, root) = scene_with_object();
        let child = scene.add_component(object, "child", ComponentKind::Scene).unwrap();
        scene.set_relative_position(child, Vec3::new(1.0, 0.0, 0.0));

        scene.set_relative_rotation(root, Quat::from_axis_angle(&Vec3::z_axis(), HALF_PI));

        let component = scene.component(child).unwrap();
        assert_relative_eq!(component.world_position(), Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(component.world_forward_vector(), Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_staged_changes_wait_for_update() {
        let (mut scene, _, root) = scene_with_object();

        scene.stage_relative_position(root, Vec3::new(3.0, 0.0, 0.0));
        assert_relative_eq!(scene.component(root).unwrap().world_position(), Vec3::zeros());

        scene.update_relative_transformation(root);
        assert_relative_eq!(scene.component(root).unwrap().world_position(), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_reparenting_moves_between_child_lists() {
        let mut scene = Scene::new();
        let a = scene.create_object("a");
        let b = scene.create_object("b");
        let a_root = scene.object(a).unwrap().root_component();
        let b_root = scene.object(b).unwrap().root_component();
        scene.set_relative_position(b_root, Vec3::new(5.0, 0.0, 0.0));

        let child = scene.add_component(a, "child", ComponentKind::Scene).unwrap();
        scene.set_relative_position(child, Vec3::new(1.0, 0.0, 0.0));

        scene.set_parent(child, b_root).unwrap();

        assert!(scene.component(a_root).unwrap().children().is_empty());
        assert_eq!(scene.component(b_root).unwrap().children(), &[child]);
        assert_eq!(scene.component(child).unwrap().parent(), Some(b_root));
        assert_relative_eq!(scene.component(child).unwrap().world_position(), Vec3::new(6.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_cycles_are_rejected() {
        let (mut scene, object, root) = scene_with_object();
        let child = scene.add_component(object, "child", ComponentKind::Scene).unwrap();
        let grandchild = scene.add_child_component(child, "grandchild", ComponentKind::Scene).unwrap();

        assert_eq!(
            scene.set_parent(root, grandchild),
            Err(SceneError::HierarchyCycle { child: root, parent: grandchild })
        );
        assert_eq!(
            scene.set_parent(child, child),
            Err(SceneError::HierarchyCycle { child, parent: child })
        );
        assert_eq!(scene.component(child).unwrap().parent(), Some(root));
    }

    #[test]
    fn test_remove_child_makes_a_root() {
        let (mut scene, object, root) = scene_with_object();
        scene.set_relative_position(root, Vec3::new(2.0, 0.0, 0.0));
        let child = scene.add_component(object, "child", ComponentKind::Scene).unwrap();

        scene.remove_child(root, child);

        assert!(scene.component(root).unwrap().children().is_empty());
        assert_eq!(scene.component(child).unwrap().parent(), None);
        assert_relative_eq!(scene.component(child).unwrap().world_position(), Vec3::zeros());
    }

    #[test]
    fn test_destroy_cascades_and_spares_siblings() {
        let (mut scene, object, root) = scene_with_object();
        let parent = scene.add_component(object, "parent", ComponentKind::Scene).unwrap();
        let sibling = scene.add_component(object, "sibling", ComponentKind::Scene).unwrap();
        let first = scene.add_child_component(parent, "first", ComponentKind::Scene).unwrap();
        let second = scene.add_child_component(parent, "second", ComponentKind::Scene).unwrap();
        let sibling_child = scene.add_child_component(sibling, "sibling_child", ComponentKind::Scene).unwrap();

        let destroyed = scene.destroy_component(parent);

        let removed: Vec<ComponentId> = destroyed.components.iter().map(|(id, _)| *id).collect();
        assert_eq!(removed, vec![first, second, parent]);
        assert!(destroyed.objects.is_empty());

        assert_eq!(scene.component(root).unwrap().children(), &[sibling]);
        assert_eq!(scene.component(sibling).unwrap().children(), &[sibling_child]);
        assert!(!scene.object(object).unwrap().components().contains(&parent));

        // Stale ids are no-ops
        scene.set_relative_position(first, Vec3::new(1.0, 0.0, 0.0));
        assert!(scene.destroy_component(parent).is_empty());
    }

    #[test]
    fn test_destroying_parent_object_takes_attached_objects() {
        let mut scene = Scene::new();
        let target = scene.create_object("target");
        let arrow = scene.create_object("arrow");
        let bystander = scene.create_object("bystander");
        scene.set_object_parent(arrow, target).unwrap();

        assert_eq!(scene.dependent_objects(target), vec![target, arrow]);

        let destroyed = scene.destroy_object(target);

        assert_eq!(destroyed.objects.len(), 2);
        assert!(!scene.contains_object(target));
        assert!(!scene.contains_object(arrow));
        assert!(scene.contains_object(bystander));
        assert_eq!(scene.component_count(), 1);
    }

    #[test]
    fn test_object_world_position_under_parent() {
        let mut scene = Scene::new();
        let parent = scene.create_object("parent");
        let child = scene.create_object("child");
        scene.set_object_world_position(parent, Vec3::new(1.0, 2.0, 3.0));
        scene.set_object_parent(child, parent).unwrap();

        scene.set_object_world_position(child, Vec3::new(4.0, 4.0, 4.0));

        assert_relative_eq!(scene.object_world_position(child).unwrap(), Vec3::new(4.0, 4.0, 4.0), epsilon = 1e-5);
        let child_root = scene.object(child).unwrap().root_component();
        assert_relative_eq!(scene.component(child_root).unwrap().relative_position(), Vec3::new(3.0, 2.0, 1.0), epsilon = 1e-5);
    }

    struct Mover {
        velocity: Vec3,
    }

    impl ComponentBehavior for Mover {
        fn tick_component(&mut self, transform: &mut LocalTransform, delta_time: f32) {
            transform.position += self.velocity * delta_time;
        }
    }

    fn run_lifecycle(scene: &mut Scene) -> PendingBatch {
        let batch = scene.take_pending();
        scene.pre_init(&batch);
        scene.init(&batch);
        scene.post_init(&batch);
        scene.begin_game(&batch);
        batch
    }

    #[test]
    fn test_lifecycle_runs_once_in_order() {
        let (mut scene, object, root) = scene_with_object();
        assert_eq!(scene.pending_object_count(), 1);

        let batch = scene.take_pending();
        assert_eq!(batch.objects, vec![object]);
        assert_eq!(batch.components, vec![root]);

        // Stages out of order do nothing
        scene.init(&batch);
        assert_eq!(scene.object(object).unwrap().lifecycle_state(), LifecycleState::Created);

        scene.pre_init(&batch);
        scene.init(&batch);
        scene.post_init(&batch);
        scene.begin_game(&batch);
        assert!(scene.object(object).unwrap().has_begun_play());
        assert_eq!(scene.component(root).unwrap().lifecycle_state(), LifecycleState::Playing);

        assert!(scene.take_pending().is_empty());
    }

    #[test]
    fn test_components_added_after_init_are_queued() {
        let (mut scene, object, _) = scene_with_object();
        run_lifecycle(&mut scene);

        let late = scene.add_component(object, "late", ComponentKind::Scene).unwrap();
        let batch = run_lifecycle(&mut scene);

        assert_eq!(batch.components, vec![late]);
        assert!(scene.component(late).unwrap().is_initialized());
    }

    #[test]
    fn test_tick_respects_all_gates() {
        let (mut scene, _, root) = scene_with_object();
        scene.set_behavior(root, Box::new(Mover { velocity: Vec3::new(1.0, 0.0, 0.0) }));

        // Not playing yet
        scene.tick(1.0);
        assert_relative_eq!(scene.component(root).unwrap().world_position(), Vec3::zeros());

        run_lifecycle(&mut scene);
        scene.tick(1.0);
        assert_relative_eq!(scene.component(root).unwrap().world_position(), Vec3::new(1.0, 0.0, 0.0));

        scene.set_is_tick_enabled(root, false);
        scene.tick(1.0);
        scene.set_is_tick_enabled(root, true);
        scene.set_component_active(root, false);
        scene.tick(1.0);
        scene.set_component_active(root, true);
        scene.set_is_tickable(root, false);
        scene.tick(1.0);
        assert_relative_eq!(scene.component(root).unwrap().world_position(), Vec3::new(1.0, 0.0, 0.0));

        scene.set_is_tickable(root, true);
        scene.tick(0.5);
        assert_relative_eq!(scene.component(root).unwrap().world_position(), Vec3::new(1.5, 0.0, 0.0));
    }
}
