//! Runtime configuration: targets, comparison rule file, rate limit, and
//! secrets, loaded once from YAML with `${VAR}` interpolation (§4.14, §6).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub base_url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub key_password: Option<String>,
    pub ca_bundle: Option<PathBuf>,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    pub ciphers: Option<String>,
}

const fn default_verify_ssl() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretsConfig {
    #[serde(default)]
    pub redact_fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub targets: BTreeMap<String, TargetConfig>,
    pub comparison_rules: PathBuf,
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

impl RuntimeConfig {
    /// Reads `path`, substitutes `${VAR}` placeholders against the process
    /// environment, and deserializes the result.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read, an
    /// `${VAR}` placeholder has no matching environment variable, or the
    /// substituted text is not valid YAML.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::invalid_config(format!("failed to read config '{}': {e}", path.display())))?;
        let expanded = interpolate_env(&raw)?;
        let config: Self = serde_yaml::from_str(&expanded)?;
        Ok(config)
    }

    #[must_use]
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.get(name)
    }

    /// Looks up a target by name, for contexts where an unknown name is a
    /// hard configuration error (e.g. CLI `--target-a`/`--target-b`).
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a configured target.
    pub fn require_target(&self, name: &str) -> Result<&TargetConfig, Error> {
        self.target(name).ok_or_else(|| Error::unknown_target(name))
    }
}

/// Substitutes every `${VAR}` occurrence with the named environment
/// variable's value.
///
/// # Errors
///
/// Returns a configuration error naming the first unresolved variable.
fn interpolate_env(text: &str) -> Result<String, Error> {
    shellexpand::env(text)
        .map(|cow| cow.into_owned())
        .map_err(|e| Error::unresolved_env_var(&e.var_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolate_env_substitutes_known_variable() {
        std::env::set_var("PARITY_FUZZ_TEST_VAR", "hello");
        let out = interpolate_env("value: ${PARITY_FUZZ_TEST_VAR}").unwrap();
        assert_eq!(out, "value: hello");
        std::env::remove_var("PARITY_FUZZ_TEST_VAR");
    }

    #[test]
    fn interpolate_env_fails_on_unresolved_variable() {
        let err = interpolate_env("value: ${PARITY_FUZZ_DOES_NOT_EXIST}").unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::Configuration));
    }

    #[test]
    fn load_parses_full_runtime_config() {
        std::env::set_var("PARITY_FUZZ_TEST_TOKEN", "abc123");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r"
targets:
  a:
    base_url: https://a.example.com
    headers:
      Authorization: Bearer ${PARITY_FUZZ_TEST_TOKEN}
  b:
    base_url: https://b.example.com
comparison_rules: rules.json
rate_limit:
  requests_per_second: 5.0
secrets:
  redact_fields:
    - $.token
",
        )
        .unwrap();
        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.targets.len(), 2);
        assert_eq!(
            config.target("a").unwrap().headers.get("Authorization").unwrap(),
            "Bearer abc123"
        );
        assert_eq!(config.secrets.redact_fields, vec!["$.token".to_string()]);
        std::env::remove_var("PARITY_FUZZ_TEST_TOKEN");
    }

    #[test]
    fn require_target_errors_on_unknown_name() {
        let config = RuntimeConfig {
            targets: BTreeMap::new(),
            comparison_rules: PathBuf::from("rules.json"),
            rate_limit: None,
            secrets: SecretsConfig::default(),
        };
        let err = config.require_target("staging").unwrap_err();
        assert!(err.to_string().contains("staging"));
    }
}
