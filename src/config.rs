//! Runtime configuration
//!
//! Every setting has a default and can be overridden from the environment
//! through [`OrchestratorConfig::from_env`].

use std::env;

use crate::{ExecutionsError, Result};

/// Bus subjects used by the orchestrator
///
/// The request path finalizes on `request + ".done"` / `request + ".error"`
/// while the outcome path finalizes on `aggregate_prefix + "done"` /
/// `aggregate_prefix + "error"`. Both spellings are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subjects {
    /// Inbound batch creation requests
    pub request: String,
    /// Outbound per-execution dispatches
    pub dispatch: String,
    /// Inbound per-execution success outcomes
    pub outcome_done: String,
    /// Inbound per-execution failure outcomes
    pub outcome_error: String,
    /// Base of the outcome-path aggregate subjects
    pub aggregate_prefix: String,
}

impl Subjects {
    /// Aggregate-done subject on the request path
    pub fn request_done(&self) -> String {
        format!("{}.done", self.request)
    }

    /// Aggregate-error subject on the request path
    pub fn request_error(&self) -> String {
        format!("{}.error", self.request)
    }

    /// Aggregate-done subject on the outcome path
    pub fn aggregate_done(&self) -> String {
        format!("{}done", self.aggregate_prefix)
    }

    /// Aggregate-error subject on the outcome path
    pub fn aggregate_error(&self) -> String {
        format!("{}error", self.aggregate_prefix)
    }
}

impl Default for Subjects {
    fn default() -> Self {
        Self {
            request: "executions.create".to_string(),
            dispatch: "execution.create".to_string(),
            outcome_done: "execution.create.done".to_string(),
            outcome_error: "execution.create.error".to_string(),
            aggregate_prefix: "executions.create.".to_string(),
        }
    }
}

/// How a message is handled when its inputs or the store misbehave
///
/// Covers a request or outcome that fails to decode, a stored batch that is
/// missing or fails to decode, and store read or write errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Log and continue: zero-valued records stand in for undecodable or
    /// unreadable ones, failed writes are logged and publishing goes ahead
    #[default]
    Lenient,
    /// Drop the message with an error; nothing further is written or published
    Strict,
}

impl std::str::FromStr for DecodePolicy {
    type Err = ExecutionsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(DecodePolicy::Lenient),
            "strict" => Ok(DecodePolicy::Strict),
            other => Err(ExecutionsError::Config(format!("unknown decode policy: {}", other))),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Redis URL of the state store
    pub redis_url: String,
    /// Redis URL of the pub/sub bus
    pub bus_url: String,
    /// Handling of undecodable input and store I/O failures
    pub decode_policy: DecodePolicy,
    /// Conditional-write attempts per outcome event
    pub update_attempts: u32,
    pub subjects: Subjects,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379/0".to_string(),
            bus_url: "redis://localhost:6379/0".to_string(),
            decode_policy: DecodePolicy::Lenient,
            update_attempts: 5,
            subjects: Subjects::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("REDIS_URL") {
            config.redis_url = url;
        } else if let Some(addr) = lookup("REDIS_ADDR") {
            config.redis_url = format!("redis://{}", addr);
        }

        config.bus_url = lookup("BUS_URL").unwrap_or_else(|| config.redis_url.clone());

        if let Some(policy) = lookup("EXECUTIONS_DECODE_POLICY") {
            config.decode_policy = policy.parse()?;
        }

        if let Some(attempts) = lookup("EXECUTIONS_UPDATE_ATTEMPTS") {
            config.update_attempts = attempts.parse().map_err(|_| {
                ExecutionsError::Config(format!("invalid EXECUTIONS_UPDATE_ATTEMPTS: {}", attempts))
            })?;
        }
        if config.update_attempts == 0 {
            return Err(ExecutionsError::Config("EXECUTIONS_UPDATE_ATTEMPTS must be at least 1".to_string()));
        }

        let subject_overrides = [
            ("EXECUTIONS_SUBJECT_REQUEST", &mut config.subjects.request),
            ("EXECUTIONS_SUBJECT_DISPATCH", &mut config.subjects.dispatch),
            ("EXECUTIONS_SUBJECT_OUTCOME_DONE", &mut config.subjects.outcome_done),
            ("EXECUTIONS_SUBJECT_OUTCOME_ERROR", &mut config.subjects.outcome_error),
            ("EXECUTIONS_SUBJECT_AGGREGATE_PREFIX", &mut config.subjects.aggregate_prefix),
        ];
        for (key, slot) in subject_overrides {
            if let Some(value) = lookup(key) {
                *slot = value;
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_subjects() {
        let subjects = Subjects::default();

        assert_eq!(subjects.request_done(), "executions.create.done");
        assert_eq!(subjects.request_error(), "executions.create.error");
        assert_eq!(subjects.aggregate_done(), "executions.create.done");
        assert_eq!(subjects.aggregate_error(), "executions.create.error");
    }

    #[test]
    fn test_finalization_subjects_follow_their_own_base() {
        let subjects = Subjects {
            request: "req".to_string(),
            aggregate_prefix: "agg-".to_string(),
            ..Subjects::default()
        };

        assert_eq!(subjects.request_done(), "req.done");
        assert_eq!(subjects.aggregate_done(), "agg-done");
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = OrchestratorConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.redis_url, "redis://localhost:6379/0");
        assert_eq!(config.bus_url, config.redis_url);
        assert_eq!(config.decode_policy, DecodePolicy::Lenient);
        assert_eq!(config.update_attempts, 5);
    }

    #[test]
    fn test_from_lookup_legacy_addr() {
        let config = OrchestratorConfig::from_lookup(lookup_from(&[
            ("REDIS_ADDR", "cache:6380"),
            ("EXECUTIONS_DECODE_POLICY", "Strict"),
            ("EXECUTIONS_SUBJECT_REQUEST", "batches.create"),
        ]))
        .unwrap();

        assert_eq!(config.redis_url, "redis://cache:6380");
        assert_eq!(config.bus_url, "redis://cache:6380");
        assert_eq!(config.decode_policy, DecodePolicy::Strict);
        assert_eq!(config.subjects.request, "batches.create");
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert!(OrchestratorConfig::from_lookup(lookup_from(&[("EXECUTIONS_DECODE_POLICY", "yolo")])).is_err());
        assert!(OrchestratorConfig::from_lookup(lookup_from(&[("EXECUTIONS_UPDATE_ATTEMPTS", "many")])).is_err());
        assert!(OrchestratorConfig::from_lookup(lookup_from(&[("EXECUTIONS_UPDATE_ATTEMPTS", "0")])).is_err());
    }
}
