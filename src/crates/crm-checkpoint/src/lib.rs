//! # crm-checkpoint - state persistence for the graph execution engine
//!
//! Trait-based checkpoint abstractions for persisting and restoring graph execution
//! state. A [`Checkpoint`] is a snapshot of every channel's value taken after a node
//! runs; a [`CheckpointSaver`] implementation decides where those snapshots live.
//!
//! This crate is domain-agnostic: it knows nothing about CRM entities, contacts, or
//! calendar events. `crm-graph` builds the node-execution engine on top of it, and
//! `crm-coordinator` wires a concrete [`CheckpointSaver`] into the run loop so that an
//! interrupted run (approval, disambiguation) can be resumed later from exactly the
//! state it suspended in.
//!
//! ## Core concepts
//!
//! - [`Channel`] - a typed state container with explicit update/checkpoint/restore
//!   semantics. [`LastValueChannel`] (overwrite), [`TopicChannel`] (append-only), and
//!   [`BinaryOperatorChannel`] (custom reducer) cover every merge strategy the domain
//!   state machines need.
//! - [`Checkpoint`] / [`CheckpointMetadata`] / [`CheckpointTuple`] - the persisted shape
//!   of one execution step: channel values, channel versions, and the metadata needed
//!   to walk checkpoint history.
//! - [`CheckpointSaver`] - the storage trait. [`InMemoryCheckpointSaver`] is the
//!   reference implementation used by tests and by default configuration; production
//!   deployments provide their own (Postgres, Redis, ...).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use crm_checkpoint::{InMemoryCheckpointSaver, CheckpointSaver, CheckpointConfig, Checkpoint, CheckpointMetadata};
//! use std::collections::HashMap;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let saver = InMemoryCheckpointSaver::new();
//! let config = CheckpointConfig::new().with_thread_id("thread-123".to_string());
//! let checkpoint = Checkpoint::empty();
//! let saved = saver.put(&config, checkpoint, CheckpointMetadata::default(), HashMap::new()).await?;
//! assert!(saver.get(&saved).await?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod serializer;
pub mod traits;

pub use channels::{BinaryOperatorChannel, Channel, LastValueChannel, ReducerFn, TopicChannel};
pub use checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointId, CheckpointMetadata, CheckpointSource,
    CheckpointTuple, ChannelVersion, ChannelVersions, PendingWrite,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use serializer::{BincodeSerializer, JsonSerializer, SerializerProtocol};
pub use traits::{CheckpointSaver, CheckpointStream};
