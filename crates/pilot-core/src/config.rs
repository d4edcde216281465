//! Configuration management for Pilot
//!
//! Loaded from `.pilot/config.toml`. Every section falls back to its defaults,
//! so a partial file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{PilotError, Result};

/// Repository-level Pilot configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PilotConfig {
    /// Control loop limits
    #[serde(default)]
    pub run: RunSettings,

    /// Repetition guard on browser operations
    #[serde(default)]
    pub guard: GuardSettings,

    /// Planner retry behaviour
    #[serde(default)]
    pub planner: PlannerSettings,

    /// Reasoning oracle endpoint
    #[serde(default)]
    pub oracle: OracleSettings,

    /// Browser launch options
    #[serde(default)]
    pub browser: BrowserSettings,
}

/// Limits on the perceive/plan/act/observe loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Hard cap on completed cycles
    pub max_iterations: usize,
    /// Transient failures retried with the same action before re-planning
    pub max_transient_retries: u32,
    /// Pause before re-executing after a transient failure
    pub retry_pause_ms: u64,
    /// History records exposed to planning and completion prompts
    pub history_window: usize,
    /// Consecutive failed executions tolerated before the run is abandoned
    pub max_consecutive_failures: u32,
}

/// Look-back window for identical consecutive calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    pub history_depth: usize,
    pub threshold_ms: u64,
    pub max_repeats: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Oracle attempts per planning step
    pub max_attempts: usize,
    pub backoff_ms: u64,
    /// Scroll distance of the idle fallback action
    pub fallback_scroll_px: i64,
}

/// OpenAI-compatible completion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Environment variable overriding `base_url`
    pub base_url_env: String,
    /// Environment variable overriding `model`
    pub model_env: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: Option<usize>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub timeout_seconds: u64,
    /// How long element highlights stay visible while a snapshot is taken
    pub highlight_settle_ms: u64,
    /// Attach to an existing browser on this DevTools port instead of launching one
    pub debug_port: Option<u16>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            max_transient_retries: 3,
            retry_pause_ms: 1000,
            history_window: 5,
            max_consecutive_failures: 12,
        }
    }
}

impl RunSettings {
    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            history_depth: 15,
            threshold_ms: 30_000,
            max_repeats: 3,
        }
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
            fallback_scroll_px: crate::types::DEFAULT_SCROLL_PX,
        }
    }
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            api_key_env: "LLM_API_KEY".to_string(),
            base_url_env: "LLM_BASE_URL".to_string(),
            model_env: "LLM_MODEL".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: None,
            request_timeout_secs: 120,
            max_retries: 3,
            initial_backoff_secs: 2,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            timeout_seconds: 30,
            highlight_settle_ms: 1000,
            debug_port: None,
        }
    }
}

impl PilotConfig {
    /// Load configuration from `.pilot/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".pilot/config.toml");

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            PilotError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Write default configuration to `.pilot/config.toml`
    pub fn write_default(root: &Path) -> Result<()> {
        let config_dir = root.join(".pilot");
        std::fs::create_dir_all(&config_dir)?;

        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| PilotError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(config_dir.join("config.toml"), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_loop_limits() {
        let config = PilotConfig::default();
        assert_eq!(config.run.max_iterations, 30);
        assert_eq!(config.run.max_transient_retries, 3);
        assert_eq!(config.run.history_window, 5);
        assert_eq!(config.guard.history_depth, 15);
        assert_eq!(config.guard.threshold_ms, 30_000);
        assert_eq!(config.guard.max_repeats, 3);
        assert_eq!(config.planner.max_attempts, 3);
        assert_eq!(config.oracle.api_key_env, "LLM_API_KEY");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = PilotConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, PilotConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".pilot")).unwrap();
        std::fs::write(
            dir.path().join(".pilot/config.toml"),
            "[run]\nmax_iterations = 8\n\n[browser]\nheadless = false\n",
        )
        .unwrap();

        let config = PilotConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.run.max_iterations, 8);
        assert_eq!(config.run.max_transient_retries, 3);
        assert!(!config.browser.headless);
        assert_eq!(config.guard, GuardSettings::default());
    }

    #[test]
    fn test_write_default_round_trips() {
        let dir = TempDir::new().unwrap();
        PilotConfig::write_default(dir.path()).unwrap();
        let loaded = PilotConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, PilotConfig::default());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[run\nmax_iterations = ").unwrap();
        assert!(matches!(PilotConfig::load(&path), Err(PilotError::Config(_))));
    }
}
