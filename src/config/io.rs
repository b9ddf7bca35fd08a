//! Config I/O operations: load and save.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::config_struct::Config;

// ============================================================================
// CONFIG PATH
// ============================================================================

/// Get the config file path
pub fn get_config_path() -> PathBuf {
    let config_dir = dirs::config_dir().unwrap_or_default().join("orbit-relay");
    let _ = std::fs::create_dir_all(&config_dir);
    config_dir.join("config.json")
}

// ============================================================================
// CONFIG LOADING
// ============================================================================

/// Load config from `path`, falling back to defaults when it is missing or invalid
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Config::default();
    }

    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
            return Config::default();
        }
    };

    match serde_json::from_str::<Config>(&data) {
        Ok(c) => c.normalized(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config invalid, using defaults");
            Config::default()
        }
    }
}

// ============================================================================
// CONFIG SAVING
// ============================================================================

/// Save config to `path`
pub fn save_config_to(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(config)?;
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.json"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.session_id = "meeting-7".to_string();
        config.voice = "Kore".to_string();
        config.credentials = vec!["tok-a".to_string(), "tok-b".to_string()];
        save_config_to(&config, &path).unwrap();

        assert_eq!(load_config_from(&path), config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "language": "fr", "polling": { "min_interval_ms": 3000 } }"#)
            .unwrap();

        let config = load_config_from(&path);
        assert_eq!(config.language, "fr");
        assert_eq!(config.voice, "Charon");
        // min above the default max gets swapped into order
        assert_eq!(config.polling.min_interval_ms, 2000);
        assert_eq!(config.polling.max_interval_ms, 3000);
    }

    #[test]
    fn garbage_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(load_config_from(&path), Config::default());
    }

    #[test]
    fn normalization_drops_blank_credentials_and_zero_workers() {
        let mut config = Config::default();
        config.credentials = vec!["  ".to_string(), "k".to_string()];
        config.decode_workers = 0;
        let config = config.normalized();
        assert_eq!(config.credentials, vec!["k".to_string()]);
        assert_eq!(config.decode_workers, 2);
    }
}
