//! Aggregate completion logic shared by the request and outcome handlers

use crate::model::{Batch, BatchStatus, ExecutionStatus};

/// Prefix of every batch key in the state store
pub const CACHE_KEY_PREFIX: &str = "GPBExecutions_";

/// Aggregate code for a batch rejected by validation
pub const VALIDATION_ERROR_CODE: &str = "0001";

/// Aggregate code for a batch where some execution errored
pub const EXECUTION_ERROR_CODE: &str = "0002";

/// Aggregate message paired with [`EXECUTION_ERROR_CODE`]
pub const EXECUTION_ERROR_MESSAGE: &str = "Some instances could not been successfully processed";

/// Store key for a service's batch
///
/// The only correlation between a creation request and its outcome events.
pub fn cache_key(service: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, service)
}

/// True if any execution has errored
pub fn is_errored(batch: &Batch) -> bool {
    batch.executions.iter().any(|e| e.status == ExecutionStatus::Errored)
}

/// True if every execution reached a terminal state
pub fn all_resolved(batch: &Batch) -> bool {
    batch.executions.iter().all(|e| e.status.is_terminal())
}

/// Stamp a batch as completed and clear error fields
pub fn mark_completed(batch: &mut Batch) {
    batch.status = BatchStatus::Completed;
    batch.error_code.clear();
    batch.error_message.clear();
}

/// Stamp a batch as failed with the given code and message
pub fn mark_error(batch: &mut Batch, code: &str, message: impl Into<String>) {
    batch.status = BatchStatus::Error;
    batch.error_code = code.to_string();
    batch.error_message = message.into();
}

/// Apply the aggregate verdict of a fully resolved batch
///
/// Errored if any execution errored, completed otherwise.
pub fn finalize(batch: &mut Batch) -> BatchStatus {
    if is_errored(batch) {
        mark_error(batch, EXECUTION_ERROR_CODE, EXECUTION_ERROR_MESSAGE);
    } else {
        mark_completed(batch);
    }
    batch.status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Execution;
    use proptest::prelude::*;

    fn batch_with(statuses: &[ExecutionStatus]) -> Batch {
        let mut batch = Batch::new("svc");
        for (i, status) in statuses.iter().enumerate() {
            let mut execution = Execution::new(format!("e{}", i));
            execution.status = *status;
            batch.executions.push(execution);
        }
        batch
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("sss"), "GPBExecutions_sss");
        assert_eq!(cache_key(""), "GPBExecutions_");
    }

    #[test]
    fn test_finalize_completed_clears_errors() {
        let mut batch = batch_with(&[ExecutionStatus::Completed, ExecutionStatus::Completed]);
        batch.error_code = "stale".to_string();
        batch.error_message = "stale".to_string();

        assert_eq!(finalize(&mut batch), BatchStatus::Completed);
        assert!(batch.error_code.is_empty());
        assert!(batch.error_message.is_empty());
    }

    #[test]
    fn test_finalize_errored() {
        let mut batch = batch_with(&[ExecutionStatus::Completed, ExecutionStatus::Errored]);

        assert_eq!(finalize(&mut batch), BatchStatus::Error);
        assert_eq!(batch.error_code, EXECUTION_ERROR_CODE);
        assert_eq!(batch.error_message, EXECUTION_ERROR_MESSAGE);
    }

    #[test]
    fn test_empty_batch_is_resolved() {
        let batch = Batch::new("svc");
        assert!(all_resolved(&batch));
        assert!(!is_errored(&batch));
    }

    fn status_strategy() -> impl Strategy<Value = ExecutionStatus> {
        prop_oneof![
            Just(ExecutionStatus::Pending),
            Just(ExecutionStatus::Processing),
            Just(ExecutionStatus::Completed),
            Just(ExecutionStatus::Errored),
        ]
    }

    proptest! {
        #[test]
        fn prop_resolved_iff_no_open_execution(statuses in prop::collection::vec(status_strategy(), 0..12)) {
            let batch = batch_with(&statuses);
            let open = statuses.iter().any(|s| matches!(s, ExecutionStatus::Pending | ExecutionStatus::Processing));
            prop_assert_eq!(all_resolved(&batch), !open);
        }

        #[test]
        fn prop_errored_iff_any_errored(statuses in prop::collection::vec(status_strategy(), 0..12)) {
            let batch = batch_with(&statuses);
            prop_assert_eq!(is_errored(&batch), statuses.contains(&ExecutionStatus::Errored));
        }
    }
}
