//! Logger installation from the engine configuration
//!
//! Kept in its own test binary: the logger is process-global.

use lantern_engine::config::Config;
use lantern_engine::core::config::EngineConfig;
use lantern_engine::Engine;

#[test]
fn test_configured_log_level_is_applied() {
    std::env::remove_var("RUST_LOG");

    let config = EngineConfig::from_toml_str(
        r#"
        [logging]
        level = "debug"
        "#,
    )
    .unwrap();
    assert_eq!(config.logging.level, "debug");

    let _engine = Engine::headless(config).unwrap();

    assert_eq!(log::max_level(), log::LevelFilter::Debug);
    assert!(log::log_enabled!(log::Level::Debug));
    assert!(!log::log_enabled!(log::Level::Trace));
}
