//! Subscription wiring and the read/apply/write/publish cycle
//!
//! Every inbound message runs in its own task. Handling one message is:
//! decode, lock the store key, read the batch, apply the pure handler,
//! write the batch back, then publish. Nothing is published before the
//! write succeeds.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::bus::{EventBus, Message};
use crate::config::{DecodePolicy, OrchestratorConfig};
use crate::handler::{self, Transition};
use crate::model::{Batch, ExecutionEvent, OutcomeKind};
use crate::store::{KeyedLocks, StateStore};
use crate::{ExecutionsError, Result};

/// Which flow an inbound subject feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Request,
    Outcome(OutcomeKind),
}

/// Orchestrator bound to a store and a bus
#[derive(Clone)]
pub struct ExecutionsService {
    store: Arc<dyn StateStore>,
    bus: Arc<dyn EventBus>,
    config: Arc<OrchestratorConfig>,
    locks: KeyedLocks,
}

impl std::fmt::Debug for ExecutionsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionsService")
            .field("config", &self.config)
            .field("locked_keys", &self.locks.len())
            .finish()
    }
}

/// Running subscriptions of a started service
pub struct ServiceHandle {
    listeners: Vec<JoinHandle<()>>,
}

impl ServiceHandle {
    /// Stop listening; handlers already running finish on their own
    pub fn shutdown(&self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }

    /// Wait until every subscription stream ends
    pub async fn join(self) -> Result<()> {
        for listener in self.listeners {
            match listener.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl ExecutionsService {
    /// Create a service
    pub fn new(store: Arc<dyn StateStore>, bus: Arc<dyn EventBus>, config: OrchestratorConfig) -> Self {
        Self {
            store,
            bus,
            config: Arc::new(config),
            locks: KeyedLocks::new(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Subscribe to the request and outcome subjects
    ///
    /// Subscriptions are in place when this returns.
    pub async fn start(&self) -> Result<ServiceHandle> {
        let subjects = &self.config.subjects;
        let routes = [
            (subjects.request.clone(), Route::Request),
            (subjects.outcome_done.clone(), Route::Outcome(OutcomeKind::Completed)),
            (subjects.outcome_error.clone(), Route::Outcome(OutcomeKind::Errored)),
        ];

        let mut listeners = Vec::with_capacity(routes.len());
        for (subject, route) in routes {
            let mut subscription = self.bus.subscribe(&subject).await?;
            let service = self.clone();
            listeners.push(tokio::spawn(async move {
                while let Some(message) = subscription.next().await {
                    let service = service.clone();
                    tokio::spawn(async move {
                        service.handle_message(route, message).await;
                    });
                }
                warn!(subject = %subscription.subject(), "Subscription closed");
            }));
            info!(subject = %subject, "Listening");
        }

        Ok(ServiceHandle { listeners })
    }

    #[instrument(skip(self, message), fields(message_id = %message.id, subject = %message.subject))]
    async fn handle_message(&self, route: Route, message: Message) {
        let queued = Utc::now() - message.received_at;
        debug!(queued_ms = queued.num_milliseconds(), "Handling message");

        let result = match route {
            Route::Request => self.handle_request(&message.payload).await,
            Route::Outcome(kind) => self.handle_outcome(&message.payload, kind).await,
        };

        match result {
            Ok(transition) => {
                if transition.finalized.is_some() {
                    self.locks.prune();
                }
            }
            Err(e) => error!(error = %e, "Message dropped"),
        }
    }

    /// Handle a batch creation request
    pub async fn handle_request(&self, payload: &[u8]) -> Result<Transition> {
        let batch = match Batch::from_slice(payload) {
            Ok(batch) => batch,
            Err(e) => self.on_decode_error("creation request", e)?,
        };

        let key = batch.cache_key();
        let _guard = self.locks.lock(&key).await;

        let snapshot = batch.to_json()?;
        self.persist(&key, &snapshot).await?;

        let transition = handler::process_request(batch, &self.config.subjects);
        if let Some(updated) = &transition.persist {
            self.persist(&key, &updated.to_json()?).await?;
        }

        self.publish_all(&transition).await;
        Ok(transition)
    }

    /// Handle a per-execution outcome
    pub async fn handle_outcome(&self, payload: &[u8], kind: OutcomeKind) -> Result<Transition> {
        let event = match ExecutionEvent::from_slice(payload) {
            Ok(event) => event,
            Err(e) => self.on_decode_error("outcome event", e)?,
        };

        let read_key = event.cache_key();
        let _guard = self.locks.lock(&read_key).await;
        let attempts = self.config.update_attempts.max(1);

        for attempt in 1..=attempts {
            let (current, readable) = match self.store.get(&read_key).await {
                Ok(current) => (current, true),
                Err(e) if self.config.decode_policy == DecodePolicy::Lenient => {
                    warn!(key = %read_key, error = %e, "Store read failed, continuing with an empty batch");
                    (None, false)
                }
                Err(e) => return Err(e),
            };

            let stored = match current.as_deref() {
                Some(raw) => match Batch::from_slice(raw.as_bytes()) {
                    Ok(batch) => batch,
                    Err(e) => self.on_decode_error("stored batch", e)?,
                },
                None if readable => self.on_missing_batch(&read_key)?,
                None => Batch::default(),
            };

            let transition = handler::process_outcome(stored, &event, kind, &self.config.subjects);
            let updated = match &transition.persist {
                Some(updated) => updated,
                None => {
                    self.publish_all(&transition).await;
                    return Ok(transition);
                }
            };

            let write_key = updated.cache_key();
            let value = updated.to_json()?;
            let written = if readable && write_key == read_key {
                self.store
                    .compare_and_set(&write_key, current.as_deref(), &value)
                    .await
            } else {
                self.store.set(&write_key, &value).await.map(|_| true)
            };

            match written {
                Ok(true) => {
                    self.publish_all(&transition).await;
                    return Ok(transition);
                }
                Ok(false) => {
                    debug!(key = %write_key, attempt, "Batch changed concurrently, re-reading");
                }
                Err(e) if self.config.decode_policy == DecodePolicy::Lenient => {
                    error!(key = %write_key, error = %e, "Failed to persist batch");
                    self.publish_all(&transition).await;
                    return Ok(transition);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ExecutionsError::Conflict {
            key: read_key,
            attempts,
        })
    }

    async fn persist(&self, key: &str, value: &str) -> Result<()> {
        match self.store.set(key, value).await {
            Ok(()) => Ok(()),
            Err(e) if self.config.decode_policy == DecodePolicy::Lenient => {
                error!(key, error = %e, "Failed to persist batch");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn publish_all(&self, transition: &Transition) {
        for outbound in &transition.outbound {
            let payload = match outbound.encode() {
                Ok(payload) => payload,
                Err(e) => {
                    error!(subject = %outbound.subject, error = %e, "Failed to encode message");
                    continue;
                }
            };
            if let Err(e) = self.bus.publish(&outbound.subject, payload).await {
                error!(subject = %outbound.subject, error = %e, "Failed to publish message");
            }
        }
    }

    fn on_decode_error<T: Default>(&self, what: &str, err: ExecutionsError) -> Result<T> {
        match self.config.decode_policy {
            DecodePolicy::Lenient => {
                warn!(error = %err, "Malformed {}, continuing with empty values", what);
                Ok(T::default())
            }
            DecodePolicy::Strict => Err(ExecutionsError::Decode(format!("malformed {}: {}", what, err))),
        }
    }

    fn on_missing_batch(&self, key: &str) -> Result<Batch> {
        match self.config.decode_policy {
            DecodePolicy::Lenient => {
                warn!(key, "No stored batch, continuing with an empty batch");
                Ok(Batch::default())
            }
            DecodePolicy::Strict => Err(ExecutionsError::Decode(format!("no batch stored under {}", key))),
        }
    }
}
