//! Configuration loading and validation.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::ClueNoteConfig;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load full configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<ClueNoteConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ClueNoteConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &ClueNoteConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.grid.rows == 0 || config.grid.cols == 0 {
        return Err(ConfigError::Invalid(
            "grid.rows and grid.cols must be > 0".to_string(),
        ));
    }

    if config.grid.min_notes == 0 {
        return Err(ConfigError::Invalid(
            "grid.min_notes must be > 0".to_string(),
        ));
    }

    if config.grid.min_notes > config.grid.cols {
        return Err(ConfigError::Invalid(format!(
            "grid.min_notes ({}) cannot exceed grid.cols ({})",
            config.grid.min_notes, config.grid.cols
        )));
    }

    // Trio mode needs at least one scene per author.
    if config.session.scene_count < 3 {
        return Err(ConfigError::Invalid(
            "session.scene_count must be at least 3".to_string(),
        ));
    }

    if config.session.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid(
            "session.poll_interval_ms must be > 0".to_string(),
        ));
    }

    if config.session.fail_threshold == 0 {
        return Err(ConfigError::Invalid(
            "session.fail_threshold must be > 0".to_string(),
        ));
    }

    if config.solve.floor_points > config.solve.pass_points {
        return Err(ConfigError::Invalid(format!(
            "solve.floor_points ({}) cannot exceed solve.pass_points ({})",
            config.solve.floor_points, config.solve.pass_points
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClueNoteConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "solve:\n  max_hints: 1\nsession:\n  poll_interval_ms: 5000"
        )
        .expect("write");

        let config = load_config(file.path()).expect("load");
        assert_eq!(config.solve.max_hints, 1);
        assert_eq!(config.session.poll_interval_ms, 5_000);
        // Untouched sections keep the product defaults.
        assert_eq!(config.solve.hint_penalty, crate::DEFAULT_HINT_PENALTY);
        assert_eq!(config.grid.rows, crate::DEFAULT_GRID_ROWS);
    }

    #[test]
    fn test_validate_rejects_zero_scene_count() {
        let mut config = ClueNoteConfig::default();
        config.session.scene_count = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_min_notes_wider_than_grid() {
        let mut config = ClueNoteConfig::default();
        config.grid.min_notes = config.grid.cols + 1;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_floor_above_pass_threshold() {
        let mut config = ClueNoteConfig::default();
        config.solve.floor_points = config.solve.pass_points + 1;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid(_))
        ));
    }
}
