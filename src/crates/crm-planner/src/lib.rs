//! # crm-planner — query → execution plan (§4.H)
//!
//! - [`domains`]: keyword-based domain detection.
//! - [`entities`]: person/date/duration/location/subject extraction.
//! - [`annotator`]: the optional pre-computed LLM-assisted extraction seam.
//! - [`planner`]: [`plan`], the pure function tying the above together and
//!   inserting contact/user dependency steps ahead of domains that mention a
//!   person.
//! - [`error`]: `PlannerError`, used only for the internal validation
//!   backstop inside `plan()`.

pub mod annotator;
pub mod domains;
pub mod entities;
pub mod error;
pub mod planner;

pub use annotator::{QueryAnnotation, QueryAnnotator};
pub use domains::detect_domains;
pub use entities::{extract_entities, extract_persons, ExtractedEntity, ExtractedEntityType};
pub use error::PlannerError;
pub use planner::{plan, PlanningContext};
