//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and operations
//! - Stable handle types for the arenas (scene, cameras, renderer, GPU)
//! - Time management
//! - Logging utilities

pub mod math;
pub mod collections;
pub mod time;
pub mod logging;
