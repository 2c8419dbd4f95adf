//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON. Every section
//! defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub pipeline: PipelineConfig,
    pub classification: ClassificationConfig,
    pub streaming: StreamingConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.auth.enabled && self.auth.api_keys.is_empty() {
            warnings.push("auth is enabled but no api_keys are configured".into());
        }

        for (token, key) in &self.auth.api_keys {
            if key.owner_id.trim().is_empty() {
                let shown: String = token.chars().take(6).collect();
                warnings.push(format!("api key {shown}... has an empty owner_id"));
            }
        }

        if self.pipeline.max_concurrent_jobs == 0 {
            warnings.push("pipeline.max_concurrent_jobs is 0; treating it as 1".into());
        }

        if self.pipeline.stale_after_secs <= self.pipeline.stage_timeout_secs {
            warnings.push(
                "pipeline.stale_after_secs should exceed stage_timeout_secs, \
                 otherwise healthy jobs may be restarted"
                    .into(),
            );
        }

        if !(0.0..=100.0).contains(&self.classification.threshold) {
            warnings.push(format!(
                "classification.threshold {} is outside [0, 100]",
                self.classification.threshold
            ));
        }

        if self.classification.scorer == ScorerKind::Http
            && self.classification.endpoint.is_none()
        {
            warnings.push(
                "classification.scorer is 'http' but no endpoint is set".into(),
            );
        }

        if self.streaming.chunk_size == 0 {
            warnings.push("streaming.chunk_size is 0; the default will be used".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server and storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: PathBuf::from("./data/mediaflow.db"),
            storage_dir: PathBuf::from("./data/media"),
            max_upload_bytes: 500 * 1024 * 1024,
        }
    }
}

/// Capability level attached to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Viewer,
    Editor,
    Admin,
}

impl Role {
    /// Whether this role may upload, edit, cancel, re-run, or delete jobs.
    pub fn can_edit(self) -> bool {
        matches!(self, Role::Editor | Role::Admin)
    }
}

/// One API key entry: the identity a bearer token resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub owner_id: String,
    #[serde(default)]
    pub role: Role,
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    /// Bearer token -> identity.
    pub api_keys: HashMap<String, ApiKeyConfig>,
}

/// Pipeline execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_concurrent_jobs: usize,
    pub stage_timeout_secs: u64,
    pub stale_after_secs: u64,
    pub stale_sweep_interval_secs: u64,
    pub sample_windows: usize,
    pub sample_window_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            stage_timeout_secs: 120,
            stale_after_secs: 900,
            stale_sweep_interval_secs: 60,
            sample_windows: 8,
            sample_window_bytes: 64 * 1024,
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Which content scorer backs the classification stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    /// Deterministic scorer derived from the sample digest.
    #[default]
    Digest,
    /// Remote scoring service.
    Http,
}

/// Classification policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Scores at or above this value are flagged.
    pub threshold: f64,
    pub scorer: ScorerKind,
    pub endpoint: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            threshold: 70.0,
            scorer: ScorerKind::Digest,
            endpoint: None,
            request_timeout_secs: 30,
        }
    }
}

/// Streaming server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Read buffer size for streamed response bodies.
    pub chunk_size: usize,
    /// How often buffered view counts are written to the database.
    pub view_flush_interval_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            view_flush_interval_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8080);
        assert!(!cfg.auth.enabled);
        assert_eq!(cfg.classification.threshold, 70.0);
        assert_eq!(cfg.classification.scorer, ScorerKind::Digest);
        assert_eq!(cfg.pipeline.stale_after_secs, 900);
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = Config::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn auth_enabled_without_keys_warns() {
        let mut cfg = Config::default();
        cfg.auth.enabled = true;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("api_keys")));
    }

    #[test]
    fn http_scorer_without_endpoint_warns() {
        let mut cfg = Config::default();
        cfg.classification.scorer = ScorerKind::Http;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("endpoint")));
    }

    #[test]
    fn stale_threshold_below_stage_budget_warns() {
        let mut cfg = Config::default();
        cfg.pipeline.stale_after_secs = 10;
        cfg.pipeline.stage_timeout_secs = 30;
        assert!(cfg.validate().iter().any(|w| w.contains("stale_after_secs")));
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{
            "server": {"port": 9090},
            "auth": {"enabled": true, "api_keys": {"tok": {"owner_id": "alice", "role": "editor"}}},
            "classification": {"threshold": 50}
        }"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.classification.threshold, 50.0);
        let key = &cfg.auth.api_keys["tok"];
        assert_eq!(key.owner_id, "alice");
        assert_eq!(key.role, Role::Editor);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn api_key_role_defaults_to_viewer() {
        let json = r#"{"auth": {"api_keys": {"tok": {"owner_id": "bob"}}}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.auth.api_keys["tok"].role, Role::Viewer);
        assert!(!Role::Viewer.can_edit());
        assert!(Role::Editor.can_edit());
        assert!(Role::Admin.can_edit());
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.streaming.chunk_size, 64 * 1024);
    }

    #[test]
    fn invalid_json_is_a_validation_error() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/config.json")));
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(Config::load_or_default(None).server.port, 8080);
    }
}
