//! Records exchanged with the bus and kept in the state store
//!
//! A [`Batch`] is the authoritative per-service document: it is stored whole
//! under [`crate::aggregator::cache_key`] and published whole on aggregate
//! finalization. [`ExecutionEvent`] is the per-execution message used both
//! for outbound dispatches and inbound worker outcomes.

mod batch;
mod event;
mod execution;

pub use batch::{Batch, BatchStatus, ServiceOptions};
pub use event::{ExecutionEvent, ExecutionResults, OutcomeError, OutcomeKind};
pub use execution::{Execution, ExecutionStatus, Report, ValidationError};

use serde::{Deserialize, Deserializer};

/// Decode an explicit `null` as the field's zero value
///
/// Producers encode nil slices and unset nested records as `null`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
