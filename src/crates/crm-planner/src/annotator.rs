//! The optional LLM-assisted extraction seam.
//!
//! `plan()` stays a pure, synchronous function: an annotator is not invoked
//! by this crate, it is consulted. Callers that want LLM-assisted domain/
//! entity extraction run it ahead of time (where the async call and its
//! failure modes belong) and hand the result in as `context.annotation`.
//! Absent an annotation, keyword-only detection is the whole story.

use crate::entities::ExtractedEntity;
use crm_domain::Domain;

/// Extra signal an external collaborator (typically an LLM call) can supply
/// on top of keyword detection.
#[derive(Debug, Clone, Default)]
pub struct QueryAnnotation {
    pub domains: Vec<Domain>,
    pub entities: Vec<ExtractedEntity>,
}

/// Implemented by whatever produces a [`QueryAnnotation`] ahead of planning.
/// `crm-planner` ships no implementation; a coordinator wiring an LLM client
/// provides one.
pub trait QueryAnnotator: Send + Sync {
    fn annotate(&self, query: &str) -> Option<QueryAnnotation>;
}
