//! Application trait and lifecycle management

use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::engine::{Engine, EngineError};

/// Application lifecycle trait
///
/// Implement this trait to drive a game with [`Engine::run`].
pub trait Application {
    /// Initialize the application
    ///
    /// Called once before the first frame. Create the initial objects,
    /// cameras and meshes here; they join the scene at the first frame
    /// boundary.
    fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError>;

    /// Update the application
    ///
    /// Called every frame before the engine ticks the scene.
    ///
    /// # Arguments
    /// * `engine` - Mutable reference to the engine
    /// * `delta_time` - Time since last frame in seconds
    fn update(&mut self, engine: &mut Engine, delta_time: f32) -> Result<(), AppError>;

    /// Cleanup the application
    ///
    /// Called once after the loop ends, before the engine frees its resources.
    fn cleanup(&mut self, _engine: &mut Engine) {}
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Engine error propagated to application level
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),

    /// Application settings failed to load or save
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;

    struct Loader {
        path: &'static str,
    }

    impl Application for Loader {
        fn initialize(&mut self, _engine: &mut Engine) -> Result<(), AppError> {
            let _settings = EngineConfig::load_from_file(self.path)?;
            Ok(())
        }

        fn update(&mut self, _engine: &mut Engine, _delta_time: f32) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[test]
    fn test_config_errors_reach_the_application() {
        let mut engine = Engine::headless(EngineConfig::default()).unwrap();
        let mut app = Loader { path: "settings.json" };

        let result = app.initialize(&mut engine);
        assert!(matches!(result, Err(AppError::Config(ConfigError::Io(_)))));

        let result = engine.run(&mut app);
        assert!(matches!(result, Err(EngineError::ApplicationError(_))));
    }
}
