//! Planner-local error type. `plan()` itself never returns `Result` — an
//! internal construction failure degrades to the general fallback plan and
//! is logged here rather than propagated, per the unconditional "pure
//! function" contract.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlannerError {
    #[error("constructed plan failed validation: {0}")]
    InvalidPlan(String),
}
