//! Session-scoped state the coordinator keeps alive across calls within one
//! process: the entity graph each run reads from and writes back into (§5:
//! "Entity graph and memory: session-scoped, single-writer").

use crm_domain::entity::{EntityRef, EntityType};
use crm_domain::EntityGraph;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// All five entity types, in a fixed order, so the `entities` channel
/// payload a subgraph reads is built deterministically.
const ENTITY_TYPES: [EntityType; 5] = [
    EntityType::Contact,
    EntityType::User,
    EntityType::Appointment,
    EntityType::Task,
    EntityType::Workflow,
];

fn entity_key(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Contact => "contact",
        EntityType::User => "user",
        EntityType::Appointment => "appointment",
        EntityType::Task => "task",
        EntityType::Workflow => "workflow",
    }
}

/// Render a session's entity graph as the same `{type: entity}` object shape
/// every domain subgraph's `entities` channel expects (`crm_subgraphs::calendar::entity_update`).
pub(crate) fn entities_snapshot(graph: &EntityGraph) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for entity_type in ENTITY_TYPES {
        if let Some(entity) = graph.get_latest(entity_type) {
            map.insert(entity_key(entity_type).to_string(), serde_json::to_value(entity).expect("entities serialize"));
        }
    }
    serde_json::Value::Object(map)
}

/// Fold a domain subgraph's final `entities` channel value back into the
/// session graph, deserializing each present key into its `EntityRef`
/// variant. Unknown keys (there shouldn't be any) are ignored rather than
/// treated as fatal — a forward-compatible subgraph adding a new entity
/// type one day should not break every other domain's merge step.
pub(crate) fn merge_channel_entities(graph: &mut EntityGraph, value: &serde_json::Value) {
    let Some(map) = value.as_object() else { return };
    for entity_type in ENTITY_TYPES {
        if let Some(raw) = map.get(entity_key(entity_type)) {
            if let Ok(entity) = serde_json::from_value::<EntityRef>(raw.clone()) {
                graph.store(entity);
            }
        }
    }
}

/// Per-session entity graphs, keyed by session id. One coordinator instance
/// owns this for its process lifetime; nothing here is persisted, matching
/// §5's "rebuilds on restart" note for the resolver cache this sits next to.
#[derive(Default)]
pub(crate) struct SessionStore {
    graphs: Mutex<HashMap<String, EntityGraph>>,
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn snapshot(&self, session_id: &str) -> serde_json::Value {
        let graphs = self.graphs.lock().await;
        match graphs.get(session_id) {
            Some(graph) => entities_snapshot(graph),
            None => serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub(crate) async fn merge(&self, session_id: &str, value: &serde_json::Value) {
        let mut graphs = self.graphs.lock().await;
        let graph = graphs.entry(session_id.to_string()).or_default();
        merge_channel_entities(graph, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crm_domain::entity::Contact;

    fn contact_ref(id: &str) -> EntityRef {
        EntityRef::Contact(Contact {
            id: id.to_string(),
            name: "Jane Doe".to_string(),
            email: None,
            phone: None,
            company: None,
            title: None,
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn merge_then_snapshot_round_trips_an_entity() {
        let store = SessionStore::new();
        let value = serde_json::json!({ "contact": contact_ref("c-1") });
        store.merge("session-1", &value).await;

        let snapshot = store.snapshot("session-1").await;
        assert_eq!(snapshot["contact"]["id"], "c-1");
    }

    #[tokio::test]
    async fn unknown_session_snapshots_empty() {
        let store = SessionStore::new();
        let snapshot = store.snapshot("nobody-here").await;
        assert_eq!(snapshot, serde_json::json!({}));
    }
}
