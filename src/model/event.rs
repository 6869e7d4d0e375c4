use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::aggregator;
use crate::model::{null_as_default, Batch, Execution, Report, ServiceOptions};
use crate::Result;

/// Which outcome subject an event arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// `execution.create.done`
    Completed,
    /// `execution.create.error`
    Errored,
}

/// Failure details carried by an outcome event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeError {
    /// Error code; workers send either a number or a string
    #[serde(deserialize_with = "code_from_number_or_string")]
    pub code: String,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
}

fn code_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "error code must be a number or string, got {}",
            other
        ))),
    }
}

/// Reports section of a success outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionResults {
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub reports: Vec<Report>,
}

/// Per-execution message
///
/// Used for the outbound `execution.create` dispatch and for the inbound
/// `execution.create.done` / `execution.create.error` outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionEvent {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub event_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created: bool,
    #[serde(rename = "execution_name", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub datacenter_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub client_name: String,
    #[serde(rename = "service_id", deserialize_with = "null_as_default")]
    pub service: String,
    #[serde(deserialize_with = "null_as_default")]
    pub service_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub service_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub service_endpoint: String,
    #[serde(deserialize_with = "null_as_default")]
    pub service_options: ServiceOptions,
    #[serde(deserialize_with = "null_as_default")]
    pub execution_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub execution_payload: String,
    #[serde(deserialize_with = "null_as_default")]
    pub execution_target: String,
    #[serde(deserialize_with = "null_as_default")]
    pub execution_results: ExecutionResults,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub execution_matched_instances: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub execution_status: String,
    #[serde(alias = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

impl ExecutionEvent {
    /// Build the dispatch event for one execution of a batch
    pub fn dispatch(subject: &str, execution: &Execution, batch: &Batch) -> Self {
        Self {
            event_type: subject.to_string(),
            name: execution.name.clone(),
            datacenter_name: execution.datacenter_name.clone(),
            client_name: execution.client_name.clone(),
            service: batch.service.clone(),
            service_name: batch.service_name.clone(),
            service_type: batch.service_type.clone(),
            service_endpoint: batch.endpoint.clone(),
            service_options: batch.options.clone(),
            execution_type: execution.execution_type.clone(),
            execution_payload: execution.payload.clone(),
            execution_target: execution.target.clone(),
            ..Default::default()
        }
    }

    /// Store key of the batch this event belongs to
    pub fn cache_key(&self) -> String {
        aggregator::cache_key(&self.service)
    }

    /// Decode an event
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Encode the event
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
