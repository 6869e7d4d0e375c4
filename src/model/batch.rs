use serde::{Deserialize, Serialize};

use crate::aggregator;
use crate::model::{null_as_default, Execution};
use crate::Result;

/// Aggregate verdict of a batch, set only on finalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum BatchStatus {
    /// Not finalized yet
    #[default]
    Unresolved,
    /// Every execution resolved without error
    Completed,
    /// Validation failed or at least one execution errored
    Error,
}

impl BatchStatus {
    /// Wire spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Unresolved => "",
            BatchStatus::Completed => "completed",
            BatchStatus::Error => "error",
        }
    }
}

impl From<Option<String>> for BatchStatus {
    fn from(value: Option<String>) -> Self {
        match value.as_deref() {
            Some("completed") => BatchStatus::Completed,
            Some("error") => BatchStatus::Error,
            _ => BatchStatus::Unresolved,
        }
    }
}

impl From<BatchStatus> for String {
    fn from(status: BatchStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Credentials forwarded to workers with every dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    #[serde(deserialize_with = "null_as_default")]
    pub user: String,
    #[serde(deserialize_with = "null_as_default")]
    pub password: String,
}

/// Creation request for one service and the ordered executions it owns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Batch {
    /// Service id, suffix of the store key
    #[serde(deserialize_with = "null_as_default")]
    pub service: String,
    #[serde(deserialize_with = "null_as_default")]
    pub service_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub service_type: String,
    /// Executions in dispatch priority order
    #[serde(deserialize_with = "null_as_default")]
    pub executions: Vec<Execution>,
    #[serde(deserialize_with = "null_as_default")]
    pub options: ServiceOptions,
    #[serde(rename = "service_endpoint", deserialize_with = "null_as_default")]
    pub endpoint: String,
    /// Aggregate verdict
    pub status: BatchStatus,
    #[serde(deserialize_with = "null_as_default")]
    pub error_code: String,
    #[serde(deserialize_with = "null_as_default")]
    pub error_message: String,
    /// Dispatch one execution at a time on creation
    #[serde(deserialize_with = "null_as_default")]
    pub sequential_processing: bool,
}

impl Batch {
    /// Create an empty batch for a service
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Default::default()
        }
    }

    /// Append an execution
    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.executions.push(execution);
        self
    }

    /// Store key holding this batch
    pub fn cache_key(&self) -> String {
        aggregator::cache_key(&self.service)
    }

    /// Decode a batch document
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Encode the batch document
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Look up an execution by name
    pub fn execution(&self, name: &str) -> Option<&Execution> {
        self.executions.iter().find(|e| e.name == name)
    }
}
