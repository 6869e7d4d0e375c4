use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::null_as_default;

/// Validation errors for a single execution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An execution has no name
    #[error("Execution name is empty")]
    EmptyName,
}

/// Lifecycle of one execution within a batch
///
/// `Pending -> Processing` on dispatch, then `Processing -> Completed` or
/// `Processing -> Errored` when the worker reports back. The two terminal
/// states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum ExecutionStatus {
    /// Not dispatched yet. Any unrecognised wire value lands here
    #[default]
    Pending,
    /// Dispatched, waiting for an outcome
    Processing,
    /// Worker reported success
    Completed,
    /// Worker reported failure
    Errored,
}

impl ExecutionStatus {
    /// Wire spelling; `Processing` keeps the legacy `"processed"` string
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "",
            ExecutionStatus::Processing => "processed",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Errored => "errored",
        }
    }

    /// True for `Completed` and `Errored`
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Errored)
    }

    /// True while the execution is still waiting to be dispatched
    pub fn to_be_processed(&self) -> bool {
        matches!(self, ExecutionStatus::Pending)
    }
}

impl From<Option<String>> for ExecutionStatus {
    fn from(value: Option<String>) -> Self {
        match value.as_deref() {
            Some("processed") | Some("processing") => ExecutionStatus::Processing,
            Some("completed") => ExecutionStatus::Completed,
            Some("errored") => ExecutionStatus::Errored,
            _ => ExecutionStatus::Pending,
        }
    }
}

impl From<ExecutionStatus> for String {
    fn from(status: ExecutionStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Per-instance result reported by a worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Report {
    /// Process exit code on the instance
    #[serde(rename = "return_code", deserialize_with = "null_as_default")]
    pub code: i64,
    /// Instance identifier
    #[serde(deserialize_with = "null_as_default")]
    pub instance: String,
    /// Captured standard error
    #[serde(deserialize_with = "null_as_default")]
    pub stderr: String,
    /// Captured standard output
    #[serde(deserialize_with = "null_as_default")]
    pub stdout: String,
}

/// One unit of dispatched work, owned by its [`crate::model::Batch`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Execution {
    /// Set once any outcome for this execution has been received
    #[serde(deserialize_with = "null_as_default")]
    pub created: bool,
    /// Identity within the batch
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    /// Service id echoed back by the outcome event
    #[serde(deserialize_with = "null_as_default")]
    pub service: String,
    /// Execution type, passed through to workers
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub execution_type: String,
    /// Opaque payload, passed through to workers
    #[serde(deserialize_with = "null_as_default")]
    pub payload: String,
    /// Target selector, passed through to workers
    #[serde(deserialize_with = "null_as_default")]
    pub target: String,
    /// Reports from a success outcome
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub reports: Vec<Report>,
    /// Instances matched by a success outcome
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub matched_instances: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub client_name: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub datacenter_type: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub datacenter_name: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub datacenter_username: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub datacenter_password: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub datacenter_region: String,
    /// Lifecycle state
    pub status: ExecutionStatus,
    /// Error code from a failure outcome
    #[serde(deserialize_with = "null_as_default")]
    pub error_code: String,
    /// Error message from a failure outcome
    #[serde(deserialize_with = "null_as_default")]
    pub error_message: String,
}

impl Execution {
    /// Create a pending execution with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check the execution can be dispatched
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(())
    }

    /// Mark as dispatched
    pub fn mark_processing(&mut self) {
        self.status = ExecutionStatus::Processing;
    }

    /// Record a success outcome
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
    }

    /// Record a failure outcome
    pub fn fail(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.error_code = code.into();
        self.error_message = message.into();
        self.status = ExecutionStatus::Errored;
    }
}
