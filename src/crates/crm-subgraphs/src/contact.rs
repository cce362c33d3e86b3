//! The contact domain subgraph (§4.I.4: "resolver-as-subgraph").
//!
//! `check_cache -> extract_name -> search_bsa -> score_matches ->
//! {disambiguate|auto_pick|no_matches} -> cache_result -> create_entity ->
//! format_response`. Same scoring rules as §4.E; this module calls the same
//! public building blocks `crm-resolver` exposes (`score_candidate`,
//! `decide`, `ResolverCache`) rather than `ContactResolver::resolve` as a
//! single call, since the contact domain exposes each of those steps as its
//! own named graph node instead of folding them into one resolver call the
//! way `calendar.rs`/`task.rs` do.

use crate::common::*;
use async_trait::async_trait;
use crm_domain::interrupt::{ContactClarification, ContactDisambiguation, ScoredCandidate};
use crm_domain::{EntityRef, InterruptValue, Selection};
use crm_graph::node_result::{ChannelUpdates, Command, NodeResult};
use crm_graph::{ChannelKind, ChannelStore, GraphNode, StateGraph};
use crm_planner::entities::extract_persons;
use crm_resolver::score::ScoringContext;
use crm_resolver::{decide, score_candidate, ContactSearch, Decision};
use std::sync::Arc;

const QUERY: &str = "contact_query";
const CANDIDATES: &str = "contact_candidates";
const CACHE_HIT: &str = "contact_cache_hit";
const PENDING_CONTACT_ID: &str = "pending_contact_id";

const PREFIX_LEN: usize = 4;
const FUZZY_THRESHOLD: f64 = 0.3;
const DEFAULT_SEARCH_LIMIT: usize = 20;

pub fn register_channels(graph: StateGraph) -> StateGraph {
    register_resolution_channels(register_common_channels(graph))
        .add_channel(QUERY, ChannelKind::LastValue)
        .add_channel(CANDIDATES, ChannelKind::LastValue)
        .add_channel(CACHE_HIT, ChannelKind::LastValue)
        .add_channel(PENDING_CONTACT_ID, ChannelKind::LastValue)
}

/// If this session already resolved a contact for this thread, skip
/// straight to `create_entity` instead of searching again.
fn check_cache_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        if channels.try_get_json(ENTITIES).and_then(|v| v.get("contact").cloned()).is_some() {
            return Ok(NodeResult::Command(Command::new().with_goto("create_entity")));
        }
        Ok(NodeResult::update(ChannelUpdates::new()))
    }
}

fn extract_name_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let instruction = get_string(channels, INSTRUCTION).unwrap_or_default();
        let persons = extract_persons(&instruction);
        match persons.into_iter().find(|p| !p.eq_ignore_ascii_case("me")) {
            Some(name) => {
                let mut updates = ChannelUpdates::new();
                set(&mut updates, QUERY, name);
                Ok(NodeResult::update(updates))
            }
            None => Ok(error_command("Could not find a contact name in the request.")),
        }
    }
}

fn extract_name_router(channels: &ChannelStore) -> String {
    if get_string(channels, ERROR).is_some() {
        "error".to_string()
    } else {
        "search_bsa".to_string()
    }
}

struct SearchBsa {
    deps: Arc<SubgraphDeps>,
}

#[async_trait]
impl GraphNode for SearchBsa {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let query = get_string(channels, QUERY).unwrap_or_default();
        let session_id = get_string(channels, SESSION_ID).unwrap_or_default();

        let mut caches = self.deps.caches.lock().await;
        let cache = caches.cache_for(&session_id);
        if let Some(candidates) = cache.get(&query) {
            let mut updates = ChannelUpdates::new();
            set(&mut updates, CANDIDATES, &candidates);
            set(&mut updates, CACHE_HIT, true);
            return Ok(NodeResult::update(updates));
        }
        drop(caches);

        let exact = self
            .deps
            .contacts
            .search_contacts(&query, DEFAULT_SEARCH_LIMIT)
            .await
            .map_err(|err| crm_graph::error::GraphError::Execution(err.to_string()))?;

        let raw = if !exact.is_empty() {
            exact
        } else {
            let prefix: String = query.chars().take(PREFIX_LEN).collect();
            if prefix.is_empty() {
                Vec::new()
            } else {
                let prefix_hits = self
                    .deps
                    .contacts
                    .search_contacts(&prefix, DEFAULT_SEARCH_LIMIT)
                    .await
                    .map_err(|err| crm_graph::error::GraphError::Execution(err.to_string()))?;
                prefix_hits
                    .into_iter()
                    .filter(|c| crm_resolver::name_similarity(&c.name, &query) >= FUZZY_THRESHOLD)
                    .collect()
            }
        };

        let context = ScoringContext::new(query.clone());
        let scored: Vec<ScoredCandidate> = raw
            .into_iter()
            .map(|contact| {
                let candidate = crm_domain::Candidate {
                    id: contact.id,
                    entity_type: crm_domain::EntityType::Contact,
                    name: contact.name,
                    role: contact.title,
                    company: contact.company,
                    email: contact.email,
                };
                let score = score_candidate(&candidate, &context);
                ScoredCandidate { candidate, score }
            })
            .collect();

        let mut caches = self.deps.caches.lock().await;
        caches.cache_for(&session_id).put(&query, scored.clone());

        let mut updates = ChannelUpdates::new();
        set(&mut updates, CANDIDATES, &scored);
        set(&mut updates, CACHE_HIT, false);
        Ok(NodeResult::update(updates))
    }
}

fn score_matches_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let candidates: Vec<ScoredCandidate> = get(channels, CANDIDATES).unwrap_or_default();
        let query = get_string(channels, QUERY).unwrap_or_default();

        match decide(candidates) {
            Decision::AutoPicked(scored) => {
                let mut updates = ChannelUpdates::new();
                set(&mut updates, PENDING_CONTACT_ID, scored.candidate.id);
                Ok(NodeResult::Command(Command::new().with_update(updates).with_goto("auto_pick")))
            }
            Decision::NeedsDisambiguation(candidates) => {
                let interrupt = InterruptValue::ContactDisambiguation(ContactDisambiguation { candidates, original_query: query });
                Ok(NodeResult::suspend(serde_json::to_value(&interrupt).expect("interrupt values serialize"), ChannelUpdates::new()))
            }
            Decision::NoMatches => {
                let interrupt = InterruptValue::ContactClarification(ContactClarification { suggestions: Vec::new(), original_query: query, allow_skip: true });
                Ok(NodeResult::suspend(serde_json::to_value(&interrupt).expect("interrupt values serialize"), ChannelUpdates::new()))
            }
        }
    }
}

fn auto_pick_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |_channels| Ok(NodeResult::update(ChannelUpdates::new()))
}

#[derive(Debug, Clone, serde::Deserialize)]
struct ClarificationResume {
    clarified_name: String,
    #[serde(default)]
    skip: bool,
}

fn cache_result_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        if get_string(channels, PENDING_CONTACT_ID).is_some() {
            return Ok(NodeResult::update(ChannelUpdates::new()));
        }

        if let Some(selection) = get::<Selection>(channels, CONTACT_DISAMBIGUATION_RESPONSE) {
            let mut updates = ChannelUpdates::new();
            set(&mut updates, PENDING_CONTACT_ID, selection.id);
            return Ok(NodeResult::update(updates));
        }

        if let Some(clarification) = get::<ClarificationResume>(channels, CONTACT_CLARIFICATION_RESPONSE) {
            if clarification.skip {
                return Ok(error_command("No contact was resolved; the request was skipped."));
            }
            let mut updates = ChannelUpdates::new();
            set(&mut updates, QUERY, clarification.clarified_name);
            // The clarified name needs another search pass; `search_bsa`
            // reads `contact_query` fresh each time so re-entering it here
            // repeats the pipeline without re-checking the session cache
            // (a just-clarified name is, by definition, not cached yet).
            return Ok(NodeResult::Command(Command::new().with_update(updates).with_goto("search_bsa")));
        }

        Ok(error_command("No contact selection was provided to resume with."))
    }
}

struct CreateEntity {
    deps: Arc<SubgraphDeps>,
}

#[async_trait]
impl GraphNode for CreateEntity {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        if channels.try_get_json(ENTITIES).and_then(|v| v.get("contact").cloned()).is_some() {
            let mut updates = ChannelUpdates::new();
            set(&mut updates, RESPONSE, "Using the previously resolved contact.");
            return Ok(NodeResult::update(updates));
        }

        let Some(id) = get_string(channels, PENDING_CONTACT_ID) else {
            return Ok(error_command("No contact id was resolved."));
        };

        match self.deps.effects.read("contacts.get", "contact_get", || self.deps.effects.gateway().get_contact(&id)).await {
            Ok(contact) => {
                let mut updates = ChannelUpdates::new();
                let name = contact.name.clone();
                set(&mut updates, ENTITIES, crate::calendar::entity_update(&EntityRef::Contact(contact)));
                set(&mut updates, RESPONSE, format!("Resolved contact \"{name}\"."));
                Ok(NodeResult::update(updates))
            }
            Err(err) => Ok(error_command(format!("Could not load the resolved contact: {err}"))),
        }
    }
}

fn format_response_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let body = render_response(channels);
        let mut updates = ChannelUpdates::new();
        set(&mut updates, RESPONSE, body);
        Ok(NodeResult::update(updates))
    }
}

fn error_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |_channels| Ok(NodeResult::goto("format_response"))
}

pub fn build(deps: Arc<SubgraphDeps>) -> crm_graph::error::Result<crm_graph::compiled::CompiledGraph> {
    let graph = register_channels(StateGraph::new())
        .add_sync_node("check_cache", check_cache_node())
        .add_sync_node("extract_name", extract_name_node())
        .add_node("search_bsa", Arc::new(SearchBsa { deps: deps.clone() }))
        .add_sync_node("score_matches", score_matches_node())
        .add_sync_node("auto_pick", auto_pick_node())
        .add_sync_node("cache_result", cache_result_node())
        .add_node("create_entity", Arc::new(CreateEntity { deps }))
        .add_sync_node("format_response", format_response_node())
        .add_sync_node("error", error_node())
        .set_entry_point("check_cache")
        .add_edge("check_cache", "extract_name")
        .add_conditional_edge("extract_name", extract_name_router)
        .add_edge("score_matches", "auto_pick")
        .add_edge("auto_pick", "cache_result")
        .add_edge("cache_result", "create_entity")
        .add_edge("create_entity", "format_response")
        .add_edge("error", "format_response")
        .set_terminal("format_response");

    // `check_cache` overrides its destination via `Command::goto` on the
    // cache-hit path; `search_bsa` is also a valid resume entry point
    // reached from `cache_result`'s `Command::goto`, both of which still
    // need a registered edge to satisfy `StateGraph::compile`.
    let graph = graph.add_edge("search_bsa", "score_matches");

    graph.compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_domain::{Candidate, EntityType};

    fn scored(id: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate { id: id.to_string(), entity_type: EntityType::Contact, name: id.to_string(), role: None, company: None, email: None },
            score,
        }
    }

    #[test]
    fn single_high_score_auto_picks() {
        assert!(matches!(decide(vec![scored("c-1", 90.0)]), Decision::AutoPicked(c) if c.candidate.id == "c-1"));
    }

    #[test]
    fn close_scores_need_disambiguation() {
        assert!(matches!(decide(vec![scored("c-1", 70.0), scored("c-2", 65.0)]), Decision::NeedsDisambiguation(_)));
    }
}
