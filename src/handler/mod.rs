//! Pure state transitions for the two inbound flows
//!
//! Handlers never talk to the bus or the store. Each one takes the current
//! batch plus the inbound event and returns a [`Transition`]: the record to
//! write back (if any) and the messages to publish once it is written.

mod request;
mod response;

pub use request::process_request;
pub use response::process_outcome;

use bytes::Bytes;

use crate::model::{Batch, BatchStatus, ExecutionEvent};
use crate::Result;

/// Body of an outbound message
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBody {
    /// `execution.create` dispatch
    Dispatch(ExecutionEvent),
    /// Aggregate done/error with the full batch
    Aggregate(Batch),
}

/// A message to publish
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub subject: String,
    pub body: OutboundBody,
}

impl Outbound {
    /// Dispatch message
    pub fn dispatch(subject: impl Into<String>, event: ExecutionEvent) -> Self {
        Self {
            subject: subject.into(),
            body: OutboundBody::Dispatch(event),
        }
    }

    /// Aggregate finalization message
    pub fn aggregate(subject: impl Into<String>, batch: Batch) -> Self {
        Self {
            subject: subject.into(),
            body: OutboundBody::Aggregate(batch),
        }
    }

    /// JSON payload for the bus
    pub fn encode(&self) -> Result<Bytes> {
        let json = match &self.body {
            OutboundBody::Dispatch(event) => serde_json::to_vec(event)?,
            OutboundBody::Aggregate(batch) => serde_json::to_vec(batch)?,
        };
        Ok(Bytes::from(json))
    }
}

/// Result of applying one inbound event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    /// Batch to write back before publishing
    pub persist: Option<Batch>,
    /// Messages to publish, in order
    pub outbound: Vec<Outbound>,
    /// Aggregate verdict if this event finalized the batch
    pub finalized: Option<BatchStatus>,
}

impl Transition {
    /// Number of dispatch messages
    pub fn dispatch_count(&self) -> usize {
        self.outbound
            .iter()
            .filter(|o| matches!(o.body, OutboundBody::Dispatch(_)))
            .count()
    }

    /// The aggregate message, if any
    pub fn aggregate(&self) -> Option<(&str, &Batch)> {
        self.outbound.iter().find_map(|o| match &o.body {
            OutboundBody::Aggregate(batch) => Some((o.subject.as_str(), batch)),
            OutboundBody::Dispatch(_) => None,
        })
    }
}
