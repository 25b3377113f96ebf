//! # Lantern Engine
//!
//! A scene-graph game engine core with a deferred rendering pipeline and
//! rapier physics integration.
//!
//! ## Features
//!
//! - **Scene Graph**: objects own a hierarchy of components with immediate
//!   transform propagation (Z-up world)
//! - **Deferred Rendering**: G-buffer, lighting composite, forward
//!   transparency, shadow maps, render targets and post-processing
//! - **Cameras**: explicit-basis cameras with a frame-boundary registration queue
//! - **Physics**: rigid bodies and overlap volumes simulated through a
//!   pluggable backend
//! - **Headless**: every GPU and window call goes through a trait with an
//!   in-memory implementation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lantern_engine::prelude::*;
//!
//! struct Viewer;
//!
//! impl Application for Viewer {
//!     fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
//!         let player = engine.scene.create_object("player");
//!         let camera = Camera::new(engine.window().window_size());
//!         engine.add_camera_component(player, "eye", camera);
//!         Ok(())
//!     }
//!
//!     fn update(&mut self, engine: &mut Engine, _delta_time: f32) -> Result<(), AppError> {
//!         if engine.last_frame().skipped {
//!             engine.quit();
//!         }
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = Engine::headless(EngineConfig::default())?;
//!     engine.run(&mut Viewer)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod physics;
pub mod render;
pub mod scene;

mod application;
mod engine;

#[cfg(test)]
mod engine_tests;

pub use application::{AppError, Application};
pub use engine::{Engine, EngineError};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{EngineConfig, PhysicsConfig, RendererConfig},
        foundation::{
            collections::{CameraId, ComponentId, LightId, MeshId, MeshInstanceId, ObjectId, RenderTargetId},
            math::{Mat4, Quat, Vec2, Vec3},
            time::Timer,
        },
        physics::{CollisionFlag, CollisionGroup, CollisionMask, CollisionShape, OverlapEvent, PhysicsObject},
        render::{
            BlendModel, Camera, CameraType, GraphicsDevice, Light, Mesh, MeshKind, RenderPassType, Renderer,
            WindowManager,
        },
        scene::{ComponentKind, Scene},
        AppError, Application, Engine, EngineError,
    };
}
