//! Stable handle types
//!
//! Every registry in the engine (scene arena, camera manager, renderer,
//! GPU device) stores its entries in a [`SlotMap`]. Keys stay valid until the
//! entry is removed; a stale key simply misses, which is how operations on
//! destroyed entries become silent no-ops.

pub use slotmap::{SecondaryMap, SlotMap};

slotmap::new_key_type! {
    /// Handle of a scene-graph component
    pub struct ComponentId;

    /// Handle of a scene object (owner of a root component)
    pub struct ObjectId;

    /// Handle of a camera stored in the camera manager
    pub struct CameraId;

    /// Handle of a mesh registered with the renderer
    pub struct MeshId;

    /// Handle of a mesh instance registered with the renderer
    pub struct MeshInstanceId;

    /// Handle of a render target owned by the renderer
    pub struct RenderTargetId;

    /// Handle of a light owned by the light manager
    pub struct LightId;

    /// Handle of a registered post-processing effect
    pub struct PostProcessId;
}
