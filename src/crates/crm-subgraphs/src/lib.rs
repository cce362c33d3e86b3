//! # crm-subgraphs — the four domain state machines (§4.I)
//!
//! Each module compiles one `crm_graph::StateGraph` for a domain:
//!
//! - [`calendar`]: §4.I.1, appointment create/update/delete/view.
//! - [`task`]: §4.I.2, task create/update/complete.
//! - [`workflow`]: §4.I.3, generate-then-create a multi-step workflow.
//! - [`contact`]: §4.I.4, contact resolution exposed as its own subgraph
//!   rather than folded into a single resolver call.
//!
//! [`common`] holds the channel names and helpers every domain shares;
//! [`date`] resolves free-text date phrases for calendar/task. The
//! coordinator builds one [`common::SubgraphDeps`] per process and passes it
//! to each domain's `build()`.

pub mod calendar;
pub mod common;
pub mod contact;
pub mod date;
pub mod task;
pub mod workflow;

pub use common::SubgraphDeps;
