//! Oracle credentials
//!
//! The API key is only ever read from the environment. Base URL and model come
//! from the config file but an environment variable wins when set.

use pilot_core::{OracleSettings, PilotError, Result};
use std::env;
use std::fmt;

/// Resolved endpoint, model and key for the oracle
#[derive(Clone)]
pub struct OracleCredentials {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl OracleCredentials {
    /// Resolve credentials from the variables named in `settings`
    pub fn from_env(settings: &OracleSettings) -> Result<Self> {
        let api_key = non_empty_var(&settings.api_key_env).ok_or_else(|| {
            PilotError::Auth(format!(
                "No API key found. Set {}=... for the oracle endpoint",
                settings.api_key_env
            ))
        })?;

        let base_url =
            non_empty_var(&settings.base_url_env).unwrap_or_else(|| settings.base_url.clone());
        let model = non_empty_var(&settings.model_env).unwrap_or_else(|| settings.model.clone());

        tracing::info!("Using oracle model {} at {}", model, base_url);

        Ok(Self {
            api_key,
            base_url,
            model,
        })
    }
}

impl fmt::Debug for OracleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleCredentials")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to prevent concurrent env var modifications
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_LOCK.lock().unwrap();

        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let result = f();

        for (key, original) in originals {
            match original {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        result
    }

    fn settings() -> OracleSettings {
        OracleSettings {
            api_key_env: "PILOT_TEST_API_KEY".to_string(),
            base_url_env: "PILOT_TEST_BASE_URL".to_string(),
            model_env: "PILOT_TEST_MODEL".to_string(),
            ..OracleSettings::default()
        }
    }

    #[test]
    fn test_env_overrides_file_values() {
        with_env_vars(
            &[
                ("PILOT_TEST_API_KEY", Some("sk-test")),
                ("PILOT_TEST_BASE_URL", Some("http://localhost:8080/v1")),
                ("PILOT_TEST_MODEL", Some("local-model")),
            ],
            || {
                let creds = OracleCredentials::from_env(&settings()).unwrap();
                assert_eq!(creds.api_key, "sk-test");
                assert_eq!(creds.base_url, "http://localhost:8080/v1");
                assert_eq!(creds.model, "local-model");
            },
        );
    }

    #[test]
    fn test_file_values_used_without_env() {
        with_env_vars(
            &[
                ("PILOT_TEST_API_KEY", Some("sk-test")),
                ("PILOT_TEST_BASE_URL", None),
                ("PILOT_TEST_MODEL", Some("  ")),
            ],
            || {
                let creds = OracleCredentials::from_env(&settings()).unwrap();
                assert_eq!(creds.base_url, "https://api.openai.com/v1");
                assert_eq!(creds.model, "gpt-4o-mini");
            },
        );
    }

    #[test]
    fn test_missing_key_is_auth_error() {
        with_env_vars(&[("PILOT_TEST_API_KEY", None)], || {
            let result = OracleCredentials::from_env(&settings());
            assert!(matches!(result, Err(PilotError::Auth(_))));
        });
    }

    #[test]
    fn test_debug_redacts_key() {
        let creds = OracleCredentials {
            api_key: "sk-secret".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("gpt-4o-mini"));
    }
}
