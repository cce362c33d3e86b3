//! The compiled, executable form of a `StateGraph`.

mod execution;
mod structure;

pub use execution::ExecutionOutcome;
pub use structure::{CompiledGraph, GraphDescription};
