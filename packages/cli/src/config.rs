use anyhow::Context;
use folio_workspace::CollabConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "folio.config.json";

/// Folio configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Collaboration timings and retry policy
    #[serde(default)]
    pub collab: CollabConfig,

    /// Actor used when a command needs one and none is given
    #[serde(default = "default_actor")]
    pub default_actor: String,
}

fn default_actor() -> String {
    "local".to_string()
}

impl Config {
    /// Load `explicit`, or the default config file in `cwd` when present
    pub fn load(cwd: &str, explicit: Option<&Path>) -> anyhow::Result<Self> {
        let (config_path, required) = match explicit {
            Some(path) => (PathBuf::from(cwd).join(path), true),
            None => (PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME), false),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else if required {
            anyhow::bail!("Config file not found: {}", config_path.display())
        } else {
            Ok(Config::default())
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collab: CollabConfig::default(),
            default_actor: default_actor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "defaultActor": "ana",
            "collab": {
                "heartbeatIntervalMs": 500,
                "retry": { "maxAttempts": 2 }
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.default_actor, "ana");
        assert_eq!(config.collab.heartbeat_interval_ms, 500);
        assert_eq!(config.collab.autosave_debounce_ms, 2000);
        assert_eq!(config.collab.retry.max_attempts, 2);
        assert_eq!(config.collab.retry.initial_backoff_ms, 200);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_actor, "local");
        assert_eq!(config.collab, CollabConfig::default());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().display().to_string();
        assert_eq!(Config::load(&cwd, None).unwrap().default_actor, "local");

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), r#"{ "defaultActor": "ben" }"#).unwrap();
        assert_eq!(Config::load(&cwd, None).unwrap().default_actor, "ben");

        assert!(Config::load(&cwd, Some(Path::new("missing.json"))).is_err());
    }
}
