use tracing::{debug, info, instrument, warn};

use crate::aggregator::{self, VALIDATION_ERROR_CODE};
use crate::config::Subjects;
use crate::handler::{Outbound, Transition};
use crate::model::{Batch, BatchStatus, ExecutionEvent, ExecutionStatus};

/// Apply a batch creation request
///
/// The caller persists the request snapshot before calling this. The
/// returned transition either finalizes the batch right away (nothing to
/// do, or invalid) or carries the dispatched executions to write back.
#[instrument(skip(batch, subjects), fields(service = %batch.service, executions = batch.executions.len()))]
pub fn process_request(mut batch: Batch, subjects: &Subjects) -> Transition {
    if batch.executions.is_empty() || batch.status == BatchStatus::Completed {
        info!("Nothing to dispatch, batch completed");
        return finalize_completed(batch, subjects);
    }

    let invalid = batch
        .executions
        .iter()
        .find_map(|execution| execution.validate().err());
    if let Some(err) = invalid {
        warn!(error = %err, "Rejecting batch");
        aggregator::mark_error(&mut batch, VALIDATION_ERROR_CODE, err.to_string());
        return Transition {
            persist: None,
            outbound: vec![Outbound::aggregate(subjects.request_error(), batch)],
            finalized: Some(BatchStatus::Error),
        };
    }

    let mut outbound = Vec::new();
    for i in 0..batch.executions.len() {
        if batch.executions[i].status == ExecutionStatus::Completed {
            continue;
        }

        batch.executions[i].mark_processing();
        let event = ExecutionEvent::dispatch(&subjects.dispatch, &batch.executions[i], &batch);
        debug!(execution = %event.name, "Dispatching execution");
        outbound.push(Outbound::dispatch(subjects.dispatch.clone(), event));

        if batch.sequential_processing {
            break;
        }
    }

    if outbound.is_empty() {
        info!("All executions already completed");
        return finalize_completed(batch, subjects);
    }

    info!(
        dispatched = outbound.len(),
        sequential = batch.sequential_processing,
        "Dispatched executions"
    );
    Transition {
        persist: Some(batch),
        outbound,
        finalized: None,
    }
}

fn finalize_completed(mut batch: Batch, subjects: &Subjects) -> Transition {
    aggregator::mark_completed(&mut batch);
    Transition {
        persist: None,
        outbound: vec![Outbound::aggregate(subjects.request_done(), batch)],
        finalized: Some(BatchStatus::Completed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::OutboundBody;
    use crate::model::Execution;
    use pretty_assertions::assert_eq;

    fn batch_of(names: &[&str]) -> Batch {
        names
            .iter()
            .fold(Batch::new("svc"), |batch, name| batch.with_execution(Execution::new(*name)))
    }

    #[test]
    fn test_parallel_dispatches_every_pending_execution() {
        let transition = process_request(batch_of(&["a", "b", "c"]), &Subjects::default());

        assert_eq!(transition.dispatch_count(), 3);
        assert!(transition.finalized.is_none());
        let persisted = transition.persist.unwrap();
        assert!(persisted
            .executions
            .iter()
            .all(|e| e.status == ExecutionStatus::Processing));
        assert!(transition.outbound.iter().all(|o| o.subject == "execution.create"));
    }

    #[test]
    fn test_sequential_dispatches_first_only() {
        let mut batch = batch_of(&["a", "b", "c"]);
        batch.sequential_processing = true;

        let transition = process_request(batch, &Subjects::default());

        assert_eq!(transition.dispatch_count(), 1);
        match &transition.outbound[0].body {
            OutboundBody::Dispatch(event) => assert_eq!(event.name, "a"),
            other => panic!("unexpected outbound {:?}", other),
        }
        let persisted = transition.persist.unwrap();
        let statuses: Vec<_> = persisted.executions.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![ExecutionStatus::Processing, ExecutionStatus::Pending, ExecutionStatus::Pending]
        );
    }

    #[test]
    fn test_sequential_skips_completed_executions() {
        let mut batch = batch_of(&["a", "b"]);
        batch.sequential_processing = true;
        batch.executions[0].complete();

        let transition = process_request(batch, &Subjects::default());

        match &transition.outbound[0].body {
            OutboundBody::Dispatch(event) => assert_eq!(event.name, "b"),
            other => panic!("unexpected outbound {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch_completes_immediately() {
        let transition = process_request(Batch::new("svc"), &Subjects::default());

        assert_eq!(transition.dispatch_count(), 0);
        assert!(transition.persist.is_none());
        assert_eq!(transition.finalized, Some(BatchStatus::Completed));
        let (subject, batch) = transition.aggregate().unwrap();
        assert_eq!(subject, "executions.create.done");
        assert_eq!(batch.status, BatchStatus::Completed);
    }

    #[test]
    fn test_already_completed_batch_is_redelivered_as_done() {
        let mut batch = batch_of(&["a"]);
        batch.status = BatchStatus::Completed;
        batch.error_code = "old".to_string();

        let transition = process_request(batch, &Subjects::default());

        assert_eq!(transition.dispatch_count(), 0);
        let (_, batch) = transition.aggregate().unwrap();
        assert!(batch.error_code.is_empty());
    }

    #[test]
    fn test_empty_name_rejects_whole_batch() {
        let transition = process_request(batch_of(&["a", "", "c"]), &Subjects::default());

        assert_eq!(transition.dispatch_count(), 0);
        assert!(transition.persist.is_none());
        let (subject, batch) = transition.aggregate().unwrap();
        assert_eq!(subject, "executions.create.error");
        assert_eq!(batch.status, BatchStatus::Error);
        assert_eq!(batch.error_code, "0001");
        assert_eq!(batch.error_message, "Execution name is empty");
        assert!(batch.executions.iter().all(|e| e.status == ExecutionStatus::Pending));
    }

    #[test]
    fn test_all_completed_finalizes_without_dispatch() {
        let mut batch = batch_of(&["a", "b"]);
        batch.executions.iter_mut().for_each(|e| e.complete());

        let transition = process_request(batch, &Subjects::default());

        assert_eq!(transition.dispatch_count(), 0);
        assert_eq!(transition.finalized, Some(BatchStatus::Completed));
        assert_eq!(transition.aggregate().unwrap().0, "executions.create.done");
    }
}
