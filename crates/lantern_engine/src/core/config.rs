//! # Engine Configuration
//!
//! One serializable document configures the whole engine. Every section has
//! defaults, so a config file only needs to name the values it changes:
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [renderer]
//! main_render_pass = "Forward"
//! ```

use serde::{Serialize, Deserialize};

use crate::config::Config;
use crate::render::RenderPassType;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window settings
    pub window: WindowConfig,

    /// Renderer settings
    pub renderer: RendererConfig,

    /// Physics settings
    pub physics: PhysicsConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config for EngineConfig {}

/// Window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,

    /// Window width in pixels
    pub width: u32,

    /// Window height in pixels
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Lantern Engine".to_string(),
            width: 1600,
            height: 900,
        }
    }
}

/// Renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Pass type used for the main frame
    pub main_render_pass: RenderPassType,

    /// Whether the main pass presents to the window
    pub draw_on_window: bool,

    /// Edge length of per-light shadow maps in texels
    pub shadow_map_size: u32,

    /// Frame size of render targets created without an explicit size
    pub default_frame_size: [f32; 2],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            main_render_pass: RenderPassType::Deferred,
            draw_on_window: true,
            shadow_map_size: 1024,
            default_frame_size: [1024.0, 1024.0],
        }
    }
}

/// Physics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity vector (world is Z-up)
    pub gravity: [f32; 3],

    /// Fixed simulation step in seconds
    pub fixed_time_step: f32,

    /// Maximum simulation steps per frame
    pub max_sub_steps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, 0.0, -9.81],
            fixed_time_step: 1.0 / 60.0,
            max_sub_steps: 8,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter (overridden by `RUST_LOG`)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [window]
            width = 1280
            height = 720

            [renderer]
            main_render_pass = "Forward"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.title, "Lantern Engine");
        assert_eq!(config.renderer.main_render_pass, RenderPassType::Forward);
        assert_eq!(config.renderer.shadow_map_size, 1024);
        assert_eq!(config.physics.max_sub_steps, 8);
    }

    #[test]
    fn test_ron_config() {
        let config = EngineConfig::from_ron_str(
            "(physics: (gravity: (0.0, -9.81, 0.0)), logging: (level: \"debug\"))",
        )
        .unwrap();

        assert_eq!(config.physics.gravity, [0.0, -9.81, 0.0]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.renderer.main_render_pass, RenderPassType::Deferred);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = EngineConfig::load_from_file("settings.json");
        assert!(result.is_err());
    }
}
