use tracing::{debug, info, instrument, warn};

use crate::aggregator;
use crate::config::Subjects;
use crate::handler::{Outbound, Transition};
use crate::model::{Batch, BatchStatus, ExecutionEvent, OutcomeKind};

/// Apply a per-execution outcome to the stored batch
///
/// Merges the outcome into the matching execution, dispatches at most one
/// still-pending execution, and finalizes the batch once every execution
/// is terminal. The batch is always written back, before the aggregate
/// fields are stamped.
///
/// Continuation is one execution per outcome whatever the batch's
/// `sequential_processing` flag says; the flag only shapes the first wave.
#[instrument(skip(stored, event, subjects), fields(service = %event.service, execution = %event.name))]
pub fn process_outcome(
    mut stored: Batch,
    event: &ExecutionEvent,
    kind: OutcomeKind,
    subjects: &Subjects,
) -> Transition {
    let mut all_done = true;
    let mut scheduled = false;
    let mut matched = false;
    let mut outbound = Vec::new();

    for i in 0..stored.executions.len() {
        if stored.executions[i].name == event.name {
            matched = true;
            let execution = &mut stored.executions[i];
            if execution.status.is_terminal() {
                debug!(status = ?execution.status, "Execution already resolved, ignoring outcome");
            } else {
                execution.created = true;
                execution.service = event.service.clone();
                execution.reports = event.execution_results.reports.clone();
                execution.matched_instances = event.execution_matched_instances.clone();
                match kind {
                    OutcomeKind::Completed => execution.complete(),
                    OutcomeKind::Errored => {
                        let error = event.error.clone().unwrap_or_default();
                        execution.fail(error.code, error.message);
                    }
                }
            }
        }

        if !stored.executions[i].status.is_terminal() {
            all_done = false;
        }

        if !scheduled && stored.executions[i].status.to_be_processed() {
            scheduled = true;
            all_done = false;
            stored.executions[i].mark_processing();
            let next = ExecutionEvent::dispatch(&subjects.dispatch, &stored.executions[i], &stored);
            debug!(next = %next.name, "Dispatching next execution");
            outbound.push(Outbound::dispatch(subjects.dispatch.clone(), next));
        }
    }

    if !matched {
        warn!("Outcome does not match any execution of the stored batch");
    }

    let persist = Some(stored.clone());

    if !all_done {
        return Transition {
            persist,
            outbound,
            finalized: None,
        };
    }

    let verdict = aggregator::finalize(&mut stored);
    let subject = match verdict {
        BatchStatus::Error => subjects.aggregate_error(),
        BatchStatus::Completed | BatchStatus::Unresolved => subjects.aggregate_done(),
    };
    info!(status = verdict.as_str(), subject = %subject, "Batch finalized");
    outbound.push(Outbound::aggregate(subject, stored));

    Transition {
        persist,
        outbound,
        finalized: Some(verdict),
    }
}
