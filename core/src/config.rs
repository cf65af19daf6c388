//! Dispatcher configuration.
//!
//! Values arrive from the host at construction time. Everything except
//! `rest_endpoint` has a default, so a minimal TOML document is one line:
//!
//! ```toml
//! rest_endpoint = "gate:8080/check"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::packet::{FUNCTION_CODE_FIELD, SERIALIZED_COMMAND_FIELD, STREAM_ID_FIELD};

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_NOOP_FUNCTION_CODE: i64 = 1;

/// What to do when the decision service accepted a command but its bytes
/// could not be written into the packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPolicy {
    /// Halt the packet.
    #[default]
    Stop,
    /// Let the packet through unmodified.
    PassThrough,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Decision service URL, normalized by `Endpoint::parse`.
    pub rest_endpoint: String,

    /// Identity reported as `keycloak_id`; `"unknown"` when unset.
    #[serde(default)]
    pub keycloak_identity: Option<String>,

    /// Forwarded untouched to the surrounding protocol layer.
    #[serde(default)]
    pub allow_empty_data: Option<bool>,

    /// Freeform argument logged at construction.
    #[serde(default)]
    pub test_arg: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_stream_id_field")]
    pub stream_id_field: String,

    #[serde(default = "default_function_code_field")]
    pub function_code_field: String,

    /// Function code that bypasses the decision service entirely.
    #[serde(default = "default_noop_function_code")]
    pub noop_function_code: i64,

    /// Write accepted response bytes into `response_field`.
    #[serde(default = "default_true")]
    pub inject_response: bool,

    #[serde(default = "default_response_field")]
    pub response_field: String,

    #[serde(default)]
    pub on_mutation_failure: MutationPolicy,
}

impl DispatcherConfig {
    pub fn new(rest_endpoint: impl Into<String>) -> Self {
        Self {
            rest_endpoint: rest_endpoint.into(),
            keycloak_identity: None,
            allow_empty_data: None,
            test_arg: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            stream_id_field: default_stream_id_field(),
            function_code_field: default_function_code_field(),
            noop_function_code: DEFAULT_NOOP_FUNCTION_CODE,
            inject_response: true,
            response_field: default_response_field(),
            on_mutation_failure: MutationPolicy::Stop,
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.keycloak_identity = Some(identity.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_mutation_policy(mut self, policy: MutationPolicy) -> Self {
        self.on_mutation_failure = policy;
        self
    }

    /// Summaries are still dispatched, but the packet is never modified.
    pub fn without_injection(mut self) -> Self {
        self.inject_response = false;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        for (key, value) in [
            ("stream_id_field", &self.stream_id_field),
            ("function_code_field", &self.function_code_field),
            ("response_field", &self.response_field),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: "must be non-empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_stream_id_field() -> String {
    STREAM_ID_FIELD.to_string()
}

fn default_function_code_field() -> String {
    FUNCTION_CODE_FIELD.to_string()
}

fn default_noop_function_code() -> i64 {
    DEFAULT_NOOP_FUNCTION_CODE
}

fn default_response_field() -> String {
    SERIALIZED_COMMAND_FIELD.to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let cfg = DispatcherConfig::from_toml_str(r#"rest_endpoint = "gate:8080/check""#).unwrap();
        assert_eq!(cfg, DispatcherConfig::new("gate:8080/check"));
        assert_eq!(cfg.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.noop_function_code, 1);
        assert_eq!(cfg.response_field, "SER_CMD");
        assert!(cfg.inject_response);
        assert_eq!(cfg.on_mutation_failure, MutationPolicy::Stop);
    }

    #[test]
    fn full_toml_overrides_everything() {
        let cfg = DispatcherConfig::from_toml_str(
            r#"
            rest_endpoint = "https://gate/check"
            keycloak_identity = "ops-42"
            allow_empty_data = true
            test_arg = "hello"
            timeout_ms = 250
            stream_id_field = "SID"
            function_code_field = "FC"
            noop_function_code = 9
            inject_response = false
            response_field = "BLOB"
            on_mutation_failure = "pass_through"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.keycloak_identity.as_deref(), Some("ops-42"));
        assert_eq!(cfg.allow_empty_data, Some(true));
        assert_eq!(cfg.test_arg.as_deref(), Some("hello"));
        assert_eq!(cfg.timeout(), Duration::from_millis(250));
        assert_eq!(cfg.stream_id_field, "SID");
        assert_eq!(cfg.function_code_field, "FC");
        assert_eq!(cfg.noop_function_code, 9);
        assert!(!cfg.inject_response);
        assert_eq!(cfg.response_field, "BLOB");
        assert_eq!(cfg.on_mutation_failure, MutationPolicy::PassThrough);
    }

    #[test]
    fn missing_endpoint_is_a_parse_error() {
        let err = DispatcherConfig::from_toml_str("timeout_ms = 10").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = DispatcherConfig::from_toml_str(
            "rest_endpoint = \"gate\"\non_mutation_failure = \"retry\"",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let cfg = DispatcherConfig::new("gate").with_timeout(Duration::ZERO);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { key: "timeout_ms", .. })
        ));
    }

    #[test]
    fn blank_field_name_fails_validation() {
        let mut cfg = DispatcherConfig::new("gate");
        cfg.function_code_field = "  ".to_string();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { key: "function_code_field", .. })
        ));
    }

    #[test]
    fn builders_set_fields() {
        let cfg = DispatcherConfig::new("gate")
            .with_identity("alice")
            .with_timeout(Duration::from_millis(1500))
            .with_mutation_policy(MutationPolicy::PassThrough)
            .without_injection();
        assert_eq!(cfg.keycloak_identity.as_deref(), Some("alice"));
        assert_eq!(cfg.timeout_ms, 1500);
        assert_eq!(cfg.on_mutation_failure, MutationPolicy::PassThrough);
        assert!(!cfg.inject_response);
        assert!(cfg.validate().is_ok());
    }
}
