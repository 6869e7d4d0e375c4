//! # Executions Orchestrator
//!
//! Drives the "execution creation" workflow of the provisioning platform:
//! a batch of named executions belonging to a service is dispatched to
//! external workers over a publish/subscribe bus, per-execution and
//! aggregate state is tracked in a shared key-value store, and a single
//! aggregate completion or failure event is emitted once every execution in
//! the batch has resolved.
//!
//! ## Overview
//!
//! The core of the crate is pure: [`handler::process_request`] and
//! [`handler::process_outcome`] take the current batch and an inbound event
//! and return a [`handler::Transition`] describing the record to persist and
//! the messages to publish. [`service::ExecutionsService`] wires those
//! functions to an [`bus::EventBus`] and a [`store::StateStore`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use executions::bus::MemoryBus;
//! use executions::config::OrchestratorConfig;
//! use executions::service::ExecutionsService;
//! use executions::store::MemoryStore;
//!
//! # async fn example() -> executions::Result<()> {
//! let service = ExecutionsService::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryBus::default()),
//!     OrchestratorConfig::default(),
//! );
//! let handle = service.start().await?;
//! // ... publish on `executions.create` ...
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`model`]: batch, execution and per-execution event records
//! - [`aggregator`]: completion and error tests shared by both handlers
//! - [`handler`]: request and outcome state transitions
//! - [`bus`]: publish/subscribe adapters
//! - [`store`]: key-value store adapters
//! - [`service`]: subscription wiring and the read/apply/write cycle
//! - [`config`]: runtime configuration

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, ExecutionsError>;

/// Main error type for orchestrator operations
#[derive(Error, Debug)]
pub enum ExecutionsError {
    /// State store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Event bus failure
    #[error("Bus error: {0}")]
    Bus(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis client error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A record or event could not be decoded under the strict policy
    #[error("Decode error: {0}")]
    Decode(String),

    /// Conditional write kept losing against concurrent writers
    #[error("Update conflict on {key} after {attempts} attempts")]
    Conflict {
        /// Store key being updated
        key: String,
        /// Attempts made before giving up
        attempts: u32,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Join error from async tasks
    #[error("Async join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Batch, execution and event records
pub mod model;

/// Aggregate completion and error helpers
pub mod aggregator;

/// Pure request/outcome state transitions
pub mod handler;

/// Publish/subscribe transport
pub mod bus;

/// Key-value state store
pub mod store;

/// Runtime configuration
pub mod config;

/// Subscription wiring
pub mod service;
