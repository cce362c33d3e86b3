//! # crm-domain - shared domain types for the CRM orchestration core
//!
//! Types every other crate in the workspace builds on: opaque identifiers,
//! the entity graph threaded between domain subgraphs, execution plans,
//! previews/approvals, the interrupt value sum, domain-level run
//! checkpoints, dedupe key hashing, and the closed link-relation map. None
//! of this crate performs I/O or graph execution; it is pure data and the
//! invariants that hold over it.

pub mod approval;
pub mod checkpoint;
pub mod dedupe;
pub mod entity;
pub mod entity_graph;
pub mod ids;
pub mod interrupt;
pub mod link;
pub mod message;
pub mod plan;
pub mod preview;

pub use approval::{ApprovalDecision, ApprovalRequest, ApprovalRequestType};
pub use checkpoint::{ResumePayload, RunCheckpoint, Selection};
pub use dedupe::{canonical_json, dedupe_key};
pub use entity::{
    Appointment, Contact, EntityRef, EntityType, Priority, Task, TaskStatus, User, Workflow,
    WorkflowStepSummary,
};
pub use entity_graph::{EntityGraph, DEFAULT_MAX_HISTORY_PER_TYPE};
pub use ids::{ActionId, OrgId, SessionId, ThreadId, UserId};
pub use interrupt::{
    Candidate, ContactClarification, ContactDisambiguation, InterruptValue, ScoredCandidate,
    UserClarification, UserDisambiguation,
};
pub use link::{ActivityType, LinkRelation, LinkRequest};
pub use message::{Message, Role};
pub use plan::{Domain, DomainStep, ExecutionPlan, PlanError, StepKind};
pub use preview::{DetailField, Preview};
