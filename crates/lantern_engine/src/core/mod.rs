//! # Core Engine Module
//!
//! Shared configuration types used by every subsystem. The settings structs
//! live here so the renderer, physics world and frame loop all read from one
//! serializable document.

pub mod config;

pub use config::{
    EngineConfig,
    WindowConfig,
    RendererConfig,
    PhysicsConfig,
    LoggingConfig,
};
pub use crate::config::{Config, ConfigError};
