//! File and environment settings for the command-line runner.
//!
//! Resolution order: explicit flags > environment (including `.env`) >
//! TOML file > built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::agent::{DEFAULT_MAX_STEPS_PER_STORY, DEFAULT_MAX_STEPS_TOTAL};
use crate::error::ProbeError;

const ENV_PREFIX: &str = "STORYPROBE_";

/// Optional settings; unset fields fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeSettings {
    pub source_path: Option<PathBuf>,
    pub service_url: Option<String>,
    pub database_url: Option<String>,
    /// Comma-separated Kafka bootstrap brokers.
    pub kafka_brokers: Option<String>,
    pub model: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub max_steps_total: Option<usize>,
    pub max_steps_per_story: Option<usize>,
    /// Overall run deadline in seconds.
    pub timeout_secs: Option<u64>,
}

impl ProbeSettings {
    /// Load the TOML file (explicit path, else the per-user default) and
    /// overlay the environment.
    ///
    /// An explicit path must exist; a missing default file is skipped.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ProbeError> {
        let file = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::read_file(&default_config_path())? {
                Some(settings) => settings,
                None => Self::default(),
            },
        };
        Ok(file.overlay(Self::from_env()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ProbeError> {
        Self::read_file(path)?.ok_or_else(|| {
            ProbeError::Configuration(format!("config file not found: {}", path.display()))
        })
    }

    fn read_file(path: &Path) -> Result<Option<Self>, ProbeError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Self::from_toml(&raw).map(Some)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ProbeError> {
        toml::from_str(raw).map_err(|e| ProbeError::Configuration(format!("invalid config: {e}")))
    }

    /// Settings from process environment, loading `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Settings from an arbitrary variable lookup. Numeric values that do
    /// not parse are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty())
        };
        Self {
            source_path: var("SOURCE").map(PathBuf::from),
            service_url: var("SERVICE_URL"),
            database_url: var("DATABASE_URL").or_else(|| lookup("DATABASE_URL")),
            kafka_brokers: var("KAFKA_BROKERS"),
            model: var("MODEL"),
            anthropic_api_key: lookup("ANTHROPIC_API_KEY").filter(|v| !v.is_empty()),
            anthropic_base_url: lookup("ANTHROPIC_BASE_URL").filter(|v| !v.is_empty()),
            max_steps_total: var("MAX_STEPS_TOTAL").and_then(|v| v.trim().parse().ok()),
            max_steps_per_story: var("MAX_STEPS_PER_STORY").and_then(|v| v.trim().parse().ok()),
            timeout_secs: var("TIMEOUT").and_then(|v| v.trim().parse().ok()),
        }
    }

    /// Layer `over` on top of `self`; fields set in `over` win.
    pub fn overlay(self, over: Self) -> Self {
        Self {
            source_path: over.source_path.or(self.source_path),
            service_url: over.service_url.or(self.service_url),
            database_url: over.database_url.or(self.database_url),
            kafka_brokers: over.kafka_brokers.or(self.kafka_brokers),
            model: over.model.or(self.model),
            anthropic_api_key: over.anthropic_api_key.or(self.anthropic_api_key),
            anthropic_base_url: over.anthropic_base_url.or(self.anthropic_base_url),
            max_steps_total: over.max_steps_total.or(self.max_steps_total),
            max_steps_per_story: over.max_steps_per_story.or(self.max_steps_per_story),
            timeout_secs: over.timeout_secs.or(self.timeout_secs),
        }
    }

    pub fn source_path(&self) -> PathBuf {
        self.source_path.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn max_steps_total(&self) -> usize {
        self.max_steps_total.unwrap_or(DEFAULT_MAX_STEPS_TOTAL)
    }

    pub fn max_steps_per_story(&self) -> usize {
        self.max_steps_per_story.unwrap_or(DEFAULT_MAX_STEPS_PER_STORY)
    }
}

/// `~/.storyprobe/config.toml`.
pub fn default_config_path() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".storyprobe"))
        .unwrap_or_else(|| PathBuf::from(".storyprobe"))
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn env_lookup_reads_prefixed_and_provider_vars() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("STORYPROBE_SERVICE_URL", "http://localhost:8080"),
            ("STORYPROBE_MAX_STEPS_TOTAL", "50"),
            ("STORYPROBE_MAX_STEPS_PER_STORY", "many"),
            ("DATABASE_URL", "postgres://localhost/app"),
            ("STORYPROBE_KAFKA_BROKERS", "localhost:9092,localhost:9093"),
            ("ANTHROPIC_API_KEY", "sk-test"),
        ]);
        let settings = ProbeSettings::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(settings.service_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(settings.max_steps_total(), 50);
        assert_eq!(settings.max_steps_per_story(), DEFAULT_MAX_STEPS_PER_STORY);
        assert_eq!(settings.database_url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(settings.kafka_brokers.as_deref(), Some("localhost:9092,localhost:9093"));
        assert_eq!(settings.anthropic_api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.source_path(), PathBuf::from("."));
    }

    #[test]
    fn overlay_prefers_the_upper_layer() {
        let file = ProbeSettings::from_toml(
            r#"
            service_url = "http://file:8080"
            max_steps_total = 10
            model = "claude-file"
            "#,
        )
        .unwrap();
        let env = ProbeSettings {
            service_url: Some("http://env:8080".into()),
            ..Default::default()
        };
        let merged = file.overlay(env);
        assert_eq!(merged.service_url.as_deref(), Some("http://env:8080"));
        assert_eq!(merged.max_steps_total(), 10);
        assert_eq!(merged.model.as_deref(), Some("claude-file"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ProbeSettings::from_toml("max_step_total = 3").unwrap_err();
        assert!(matches!(err, ProbeError::Configuration(_)));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProbeSettings::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("config file not found"));

        let path = dir.path().join("probe.toml");
        std::fs::write(&path, "timeout_secs = 90\n").unwrap();
        assert_eq!(ProbeSettings::from_file(&path).unwrap().timeout_secs, Some(90));
    }
}
