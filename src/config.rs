//! Application-level configuration loading: game master credentials, scoring options and
//! runtime limits.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dao::models::GmId;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TABLETOP_BACK_CONFIG_PATH";
/// Scenario catalog imported at startup when the config does not name one.
const DEFAULT_SCENARIOS_PATH: &str = "config/scenarios.json";
const DEFAULT_TRANSITION_TIMEOUT_MS: u64 = 5_000;

/// A game master allowed to drive games.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameMaster {
    /// Stable identity recorded as game owner.
    pub id: GmId,
    /// Display name.
    pub name: String,
    /// Secret presented in the `x-gm-token` header.
    pub token: String,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    game_masters: Vec<GameMaster>,
    normalize_team_size: bool,
    scenarios_path: PathBuf,
    cors_origins: Vec<String>,
    transition_timeout: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        game_masters = app_config.game_masters.len(),
                        normalize_team_size = app_config.normalize_team_size,
                        "loaded application config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Replace the configured game masters.
    pub fn with_game_masters(mut self, game_masters: Vec<GameMaster>) -> Self {
        self.game_masters = game_masters;
        self
    }

    /// Toggle team size weighting of scores.
    pub fn with_normalize_team_size(mut self, normalize: bool) -> Self {
        self.normalize_team_size = normalize;
        self
    }

    /// Game master owning `token`, if any.
    pub fn game_master_for_token(&self, token: &str) -> Option<&GameMaster> {
        self.game_masters.iter().find(|gm| gm.token == token)
    }

    /// Whether scores are weighted by team size.
    pub fn normalize_team_size(&self) -> bool {
        self.normalize_team_size
    }

    /// Scenario catalog imported at startup.
    pub fn scenarios_path(&self) -> &PathBuf {
        &self.scenarios_path
    }

    /// Allowed CORS origins; empty means any origin.
    pub fn cors_origins(&self) -> &[String] {
        &self.cors_origins
    }

    /// Upper bound for one transactional command.
    pub fn transition_timeout(&self) -> Duration {
        self.transition_timeout
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    game_masters: Vec<GameMaster>,
    scoring: RawScoring,
    scenarios_path: Option<PathBuf>,
    cors_origins: Vec<String>,
    transition_timeout_ms: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            game_masters: default_game_masters(),
            scoring: RawScoring::default(),
            scenarios_path: None,
            cors_origins: Vec::new(),
            transition_timeout_ms: DEFAULT_TRANSITION_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawScoring {
    normalize_team_size: bool,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            game_masters: value.game_masters,
            normalize_team_size: value.scoring.normalize_team_size,
            scenarios_path: value
                .scenarios_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCENARIOS_PATH)),
            cors_origins: value.cors_origins,
            transition_timeout: Duration::from_millis(value.transition_timeout_ms),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Development game master used when no config file is present.
fn default_game_masters() -> Vec<GameMaster> {
    vec![GameMaster {
        id: Uuid::from_u128(0x6a1e_0c3e_4d5f_4b8a_9f1e_2d3c_4b5a_6978),
        name: "Game Master".into(),
        token: "dev-gm-token".into(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert!(!config.normalize_team_size());
        assert_eq!(config.scenarios_path(), &PathBuf::from(DEFAULT_SCENARIOS_PATH));
        assert_eq!(config.transition_timeout(), Duration::from_secs(5));
        assert!(config.cors_origins().is_empty());
        assert!(config.game_master_for_token("dev-gm-token").is_some());
    }

    #[test]
    fn full_document_is_honoured() {
        let config = AppConfig::from_json(
            r#"{
                "game_masters": [
                    {"id": "0f8fad5b-d9cb-469f-a165-70867728950e", "name": "Alice", "token": "s3cret"}
                ],
                "scoring": {"normalize_team_size": true},
                "scenarios_path": "/etc/tabletop/scenarios.json",
                "cors_origins": ["https://tabletop.example"],
                "transition_timeout_ms": 1500
            }"#,
        )
        .unwrap();

        assert!(config.normalize_team_size());
        assert_eq!(config.transition_timeout(), Duration::from_millis(1500));
        assert_eq!(config.cors_origins(), ["https://tabletop.example".to_owned()]);
        let gm = config.game_master_for_token("s3cret").unwrap();
        assert_eq!(gm.name, "Alice");
        assert!(config.game_master_for_token("dev-gm-token").is_none());
    }

    #[test]
    fn malformed_gm_id_is_rejected() {
        let err = AppConfig::from_json(
            r#"{"game_masters": [{"id": "not-a-uuid", "name": "x", "token": "y"}]}"#,
        );
        assert!(err.is_err());
    }
}
