//! # crm-resolver — contact/user resolution, scoring, disambiguation, caching
//!
//! Implements §4.E of the architecture:
//!
//! - [`score`]: name similarity, composite candidate scoring.
//! - [`decision`]: auto-pick vs. disambiguation decision rule.
//! - [`cache`]: per-session LRU+TTL resolver cache.
//! - [`resolver`]: `ContactResolver`/`UserResolver`, self-reference routing,
//!   clarification/disambiguation interrupt construction.
//! - [`gateway_source`]: `ContactSearch`/`UserSearch` adapters backed by
//!   `crm_gateway::CrmGateway`.
//! - [`error`]: `ResolverError`.
//!
//! The contact domain subgraph in `crm-subgraphs` drives this crate directly
//! rather than duplicating the scoring/decision logic.

pub mod cache;
pub mod decision;
pub mod error;
pub mod gateway_source;
pub mod resolver;
pub mod score;

pub use cache::{ResolverCache, SessionCaches};
pub use decision::{decide, Decision};
pub use error::ResolverError;
pub use gateway_source::{GatewayContactSource, GatewayUserSource};
pub use resolver::{
    is_self_reference, ContactResolution, ContactResolver, ContactSearch, UserResolution,
    UserResolver, UserSearch,
};
pub use score::{name_similarity, score_candidate, ScoringContext};
