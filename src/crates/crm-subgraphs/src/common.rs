//! Channel names and small helpers shared by every domain subgraph.
//!
//! Every domain graph registers the channels common to all four
//! (`messages, memory_context, entities, org_id, user_id, session_id,
//! thread_id, timezone, response, error, approved, rejected,
//! requiresApproval, approvalRequest, approval_decision`) plus whatever
//! domain-specific channels its own nodes need. `format_response` is itself
//! shared: every domain's terminal node delegates to [`render_response`] so
//! the error/rejection/success precedence is defined once.

use crm_gateway::EffectRunner;
use crm_graph::node_result::{ChannelUpdates, Command, NodeResult};
use crm_graph::{ChannelKind, ChannelStore, StateGraph};
use crm_memory::MemoryProvider;
use crm_resolver::{GatewayContactSource, GatewayUserSource, SessionCaches};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

pub const MESSAGES: &str = "messages";
pub const MEMORY_CONTEXT: &str = "memory_context";
pub const ENTITIES: &str = "entities";
pub const ORG_ID: &str = "org_id";
pub const USER_ID: &str = "user_id";
pub const SESSION_ID: &str = "session_id";
pub const THREAD_ID: &str = "thread_id";
pub const TIMEZONE: &str = "timezone";
pub const INSTRUCTION: &str = "instruction";
pub const RESPONSE: &str = "response";
pub const ERROR: &str = "error";
pub const APPROVED: &str = "approved";
pub const REJECTED: &str = "rejected";
pub const REQUIRES_APPROVAL: &str = "requiresApproval";
pub const APPROVAL_REQUEST: &str = "approvalRequest";
pub const APPROVAL_DECISION: &str = "approval_decision";

/// Resume channels, named per §4.I's "Transition invariants" example list.
/// Only the contact/task/calendar subgraphs that drive a resolver register
/// these; the workflow subgraph has no resolver step.
pub const CONTACT_DISAMBIGUATION_RESPONSE: &str = "contact_disambiguation_response";
pub const CONTACT_CLARIFICATION_RESPONSE: &str = "contact_clarification_response";
pub const USER_DISAMBIGUATION_RESPONSE: &str = "user_disambiguation_response";
pub const USER_CLARIFICATION_RESPONSE: &str = "user_clarification_response";

pub fn register_common_channels(graph: StateGraph) -> StateGraph {
    graph
        .add_channel(MESSAGES, ChannelKind::Topic)
        .add_channel(MEMORY_CONTEXT, ChannelKind::LastValue)
        .add_channel(ENTITIES, ChannelKind::ObjectUnion)
        .add_channel(ORG_ID, ChannelKind::LastValue)
        .add_channel(USER_ID, ChannelKind::LastValue)
        .add_channel(SESSION_ID, ChannelKind::LastValue)
        .add_channel(THREAD_ID, ChannelKind::LastValue)
        .add_channel(TIMEZONE, ChannelKind::LastValue)
        .add_channel(INSTRUCTION, ChannelKind::LastValue)
        .add_channel(RESPONSE, ChannelKind::LastValue)
        .add_channel(ERROR, ChannelKind::LastValue)
        .add_channel(APPROVED, ChannelKind::LastValue)
        .add_channel(REJECTED, ChannelKind::LastValue)
        .add_channel(REQUIRES_APPROVAL, ChannelKind::LastValue)
        .add_channel(APPROVAL_REQUEST, ChannelKind::LastValue)
        .add_channel(APPROVAL_DECISION, ChannelKind::LastValue)
}

pub fn register_resolution_channels(graph: StateGraph) -> StateGraph {
    graph
        .add_channel(CONTACT_DISAMBIGUATION_RESPONSE, ChannelKind::LastValue)
        .add_channel(CONTACT_CLARIFICATION_RESPONSE, ChannelKind::LastValue)
        .add_channel(USER_DISAMBIGUATION_RESPONSE, ChannelKind::LastValue)
        .add_channel(USER_CLARIFICATION_RESPONSE, ChannelKind::LastValue)
}

pub fn get<T: DeserializeOwned>(channels: &ChannelStore, name: &str) -> Option<T> {
    channels
        .try_get_json(name)
        .and_then(|value| serde_json::from_value(value).ok())
}

pub fn get_string(channels: &ChannelStore, name: &str) -> Option<String> {
    channels
        .try_get_json(name)
        .and_then(|value| value.as_str().map(str::to_string))
}

pub fn get_bool(channels: &ChannelStore, name: &str) -> bool {
    channels
        .try_get_json(name)
        .and_then(|value| value.as_bool())
        .unwrap_or(false)
}

pub fn set(updates: &mut ChannelUpdates, name: &str, value: impl Serialize) {
    updates.insert(
        name.to_string(),
        serde_json::to_value(value).expect("channel values are always serializable"),
    );
}

/// The `{error}` transition invariant (§4.I: "A node returning `{error}`
/// routes directly to `format_response`"), available to any node via an
/// explicit `Command::goto`.
pub fn error_command(message: impl Into<String>) -> NodeResult {
    let mut updates = ChannelUpdates::new();
    set(&mut updates, ERROR, message.into());
    NodeResult::Command(
        Command::new()
            .with_update(updates)
            .with_goto("format_response"),
    )
}

/// Shared collaborators every domain subgraph's nodes close over: the
/// gateway effect runner, the resolver's gateway-backed search sources, the
/// memory provider, and the coordinator's per-session resolver caches. One
/// instance is built per coordinator process and cloned (cheaply — every
/// field is an `Arc`) into each node that needs it.
#[derive(Clone)]
pub struct SubgraphDeps {
    pub effects: Arc<EffectRunner>,
    pub contacts: Arc<GatewayContactSource>,
    pub users: Arc<GatewayUserSource>,
    pub memory: Arc<dyn MemoryProvider>,
    pub caches: Arc<AsyncMutex<SessionCaches>>,
}

impl SubgraphDeps {
    pub fn new(
        effects: Arc<EffectRunner>,
        memory: Arc<dyn MemoryProvider>,
        caches: Arc<AsyncMutex<SessionCaches>>,
    ) -> Self {
        Self {
            contacts: Arc::new(GatewayContactSource::new(effects.clone())),
            users: Arc::new(GatewayUserSource::new(effects.clone())),
            effects,
            memory,
            caches,
        }
    }
}

/// Builds the final `response` string, shared by every domain's terminal
/// node. Precedence: an explicit `error` always wins; a body the domain
/// already computed (e.g. a success summary written by `link_attendees` or
/// `create_workflow`) is used as-is; otherwise a generic fallback covers the
/// (rare) case a domain reaches `format_response` without ever writing one.
pub fn render_response(channels: &ChannelStore) -> String {
    if let Some(error) = get_string(channels, ERROR) {
        return format!("Error: {error}");
    }
    if let Some(body) = get_string(channels, RESPONSE) {
        return body;
    }
    "No response was generated for this request.".to_string()
}
