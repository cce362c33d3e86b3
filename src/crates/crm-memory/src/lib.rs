//! # crm-memory — pluggable conversational memory (§4.G)
//!
//! - [`memory`]: the `Memory` row and `RecallOptions`.
//! - [`provider`]: the `MemoryProvider` backend trait plus the non-fatal
//!   `recall`/`synthesize` free functions domain subgraphs actually call.
//! - [`in_memory`]: `InMemoryMemoryProvider`, a keyword-scored reference
//!   backend used by tests and as the coordinator's default.
//! - [`error`]: `MemoryError`, never observed outside this crate.
//!
//! Both operations are non-fatal by construction: a backend failure logs a
//! warning and the caller gets an empty recall / a no-op synthesize. No node
//! in any domain subgraph may treat memory unavailability as fatal.

pub mod error;
pub mod in_memory;
pub mod memory;
pub mod provider;

pub use error::{MemoryError, Result};
pub use in_memory::InMemoryMemoryProvider;
pub use memory::{Memory, RecallOptions};
pub use provider::{recall, synthesize, MemoryProvider};
