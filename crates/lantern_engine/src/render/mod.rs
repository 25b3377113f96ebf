//! # Rendering System
//!
//! Deferred renderer over an abstract [`GraphicsDevice`].
//!
//! ## Architecture
//!
//! - **Camera / CameraManager**: explicit-basis cameras and the deferred
//!   camera registration queue
//! - **Renderer**: mesh registry, nine instance buckets (mesh kind × blend
//!   model), render targets, lights and post-processing
//! - **GeometryBufferData / DeferredRenderingData**: the G-buffer and the
//!   lighting composite that reads it
//! - **GraphicsDevice / WindowManager**: the GPU and window collaborators;
//!   `HeadlessDevice` and `HeadlessWindow` stand in when no GPU is attached
//!
//! ## Frame Structure
//!
//! Shadow passes, then every active render target, then the main pass. The
//! main deferred pass fills the G-buffer with opaque and masked geometry,
//! composites lighting, copies G-buffer depth and draws transparent geometry
//! forward on top before post-processing and present.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod camera;
pub mod camera_manager;
pub mod deferred;
pub mod device;
pub mod light;
pub mod mesh;
pub mod render_target;
pub mod renderer;
pub mod shader_names;
pub mod window;

pub use camera::{Camera, CameraProjection, CameraType, CameraUniforms};
pub use camera_manager::CameraManager;
pub use deferred::{DeferredRenderingData, GeometryBufferData};
pub use device::{
    Attachment, DeviceCommand, FramebufferHandle, GraphicsDevice, HeadlessDevice, MeshBufferHandle,
    RenderbufferFormat, RenderbufferHandle, TextureDescriptor, TextureFilter, TextureFormat, TextureHandle,
};
pub use light::{Light, LightManager, LightType};
pub use mesh::{BlendModel, Mesh, MeshInstance, MeshKind, Vertex};
pub use render_target::RenderTarget;
pub use renderer::{FrameStats, PostProcessingEffect, Renderer};
pub use window::{HeadlessWindow, WindowManager};

/// Kind of pass the renderer executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderPassType {
    /// Nothing is drawn
    None,
    /// Single forward pass over every bucket
    Forward,
    /// Directional / spot light depth pass
    Shadow,
    /// Point light depth pass
    PointLightShadow,
    /// Geometry written into the G-buffer only
    GeometryBuffer,
    /// G-buffer, lighting composite, then forward transparency
    #[default]
    Deferred,
}

/// Errors that can occur during rendering operations
#[derive(Error, Debug)]
pub enum RenderError {
    /// Renderer initialization failed during setup
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// A rendering operation failed during execution
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// GPU resource creation or management failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Backend-specific error occurred
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
