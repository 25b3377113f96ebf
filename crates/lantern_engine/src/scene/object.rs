//! Scene objects
//!
//! An object is a named owner of a root component and any number of
//! sub-components. Its world transform is its root component's world
//! transform.

use crate::foundation::collections::ComponentId;
use crate::scene::component::LifecycleState;

/// Owner of a component hierarchy
#[derive(Debug)]
pub struct ObjectBase {
    pub(super) name: String,
    pub(super) guid: u32,
    pub(super) root: ComponentId,
    pub(super) components: Vec<ComponentId>,
    pub(super) is_active: bool,
    pub(super) is_pending_destroy: bool,
    pub(super) state: LifecycleState,
}

impl ObjectBase {
    pub(super) fn new(name: impl Into<String>, guid: u32, root: ComponentId) -> Self {
        Self {
            name: name.into(),
            guid,
            root,
            components: vec![root],
            is_active: true,
            is_pending_destroy: false,
            state: LifecycleState::Created,
        }
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique id assigned at creation
    pub fn guid(&self) -> u32 {
        self.guid
    }

    /// Root component
    pub fn root_component(&self) -> ComponentId {
        self.root
    }

    /// Every component owned by this object, root first, in creation order
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    /// Whether the object is active
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Whether `init` has run
    pub fn is_initialized(&self) -> bool {
        self.state >= LifecycleState::Initialized
    }

    /// Whether `begin_game` has run
    pub fn has_begun_play(&self) -> bool {
        self.state == LifecycleState::Playing
    }

    /// Whether the object is being torn down
    pub fn is_pending_destroy(&self) -> bool {
        self.is_pending_destroy
    }

    /// Current lifecycle stage
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.state
    }
}
