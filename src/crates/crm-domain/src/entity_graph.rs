//! Session-scoped typed entity store threaded between domains.
//!
//! `EntityGraph` tracks, per entity type, a "latest" pointer, a bounded
//! history (most-recent-first, capped at `N` entries), and an `(type, id)`
//! index. It is the mechanism by which a calendar step can see the contact a
//! preceding contact-resolution step just resolved, and by which the
//! coordinator threads state across a run's checkpoints.

use crate::entity::{EntityRef, EntityType};
use std::collections::{HashMap, VecDeque};

/// Default bound on `history[type]`, per spec.
pub const DEFAULT_MAX_HISTORY_PER_TYPE: usize = 10;

#[derive(Debug, Clone)]
pub struct EntityGraph {
    max_history_per_type: usize,
    latest: HashMap<EntityType, EntityRef>,
    history: HashMap<EntityType, VecDeque<EntityRef>>,
    index: HashMap<(EntityType, String), EntityRef>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::with_max_history(DEFAULT_MAX_HISTORY_PER_TYPE)
    }

    pub fn with_max_history(max_history_per_type: usize) -> Self {
        Self {
            max_history_per_type,
            latest: HashMap::new(),
            history: HashMap::new(),
            index: HashMap::new(),
        }
    }

    /// Insert or update an entity. Storing an entity whose `(type, id)`
    /// already exists updates it in place (and moves it to the front of
    /// history, since it is now the most recently touched entity of that
    /// type); storing a new one prepends it and evicts the oldest entry past
    /// `max_history_per_type`.
    pub fn store(&mut self, entity: EntityRef) {
        let entity_type = entity.entity_type();
        let key = (entity_type, entity.id().to_string());

        let history = self.history.entry(entity_type).or_default();
        if self.index.contains_key(&key) {
            history.retain(|e| e.id() != key.1);
        }
        history.push_front(entity.clone());

        while history.len() > self.max_history_per_type {
            if let Some(evicted) = history.pop_back() {
                self.index.remove(&(entity_type, evicted.id().to_string()));
            }
        }

        self.index.insert(key, entity.clone());
        self.latest.insert(entity_type, entity);
    }

    /// Merge `other` into `self` entity-by-entity, with "most recent
    /// `createdAt` wins" on conflicting `latest[type]` — the rule the
    /// coordinator applies when sibling domains in a `parallel` plan group
    /// both touch the same entity type (§5 ordering guarantees).
    pub fn merge_recency_wins(&mut self, other: &EntityGraph) {
        for (entity_type, history) in &other.history {
            for entity in history.iter().rev() {
                let should_store = match self.latest.get(entity_type) {
                    Some(existing) if existing.id() == entity.id() => {
                        entity.created_at() >= existing.created_at()
                    }
                    _ => true,
                };
                if should_store {
                    self.store(entity.clone());
                }
            }
        }
    }

    /// The literal `merge(a, b)` operation from the spec: for each entity
    /// type present in either graph, the right-hand side (`other`) wins
    /// wholesale (its latest/history/index for that type replaces `self`'s);
    /// types absent from `other` survive unchanged from `self`.
    pub fn merge(mut self, other: &EntityGraph) -> EntityGraph {
        for entity_type in other.history.keys() {
            if let Some(history) = other.history.get(entity_type) {
                self.history.insert(*entity_type, history.clone());
            }
            if let Some(latest) = other.latest.get(entity_type) {
                self.latest.insert(*entity_type, latest.clone());
            }
            self.index.retain(|(t, _), _| t != entity_type);
            for (key, value) in other.index.iter().filter(|((t, _), _)| t == entity_type) {
                self.index.insert(key.clone(), value.clone());
            }
        }
        self
    }

    pub fn get_latest(&self, entity_type: EntityType) -> Option<&EntityRef> {
        self.latest.get(&entity_type)
    }

    pub fn get_by_id(&self, entity_type: EntityType, id: &str) -> Option<&EntityRef> {
        self.index.get(&(entity_type, id.to_string()))
    }

    pub fn history(&self, entity_type: EntityType, limit: Option<usize>) -> Vec<&EntityRef> {
        let entries = self.history.get(&entity_type);
        match entries {
            None => Vec::new(),
            Some(entries) => match limit {
                Some(limit) => entries.iter().take(limit).collect(),
                None => entries.iter().collect(),
            },
        }
    }

    pub fn search(
        &self,
        entity_type: EntityType,
        predicate: impl Fn(&EntityRef) -> bool,
    ) -> Vec<&EntityRef> {
        self.history
            .get(&entity_type)
            .map(|entries| entries.iter().filter(|e| predicate(e)).collect())
            .unwrap_or_default()
    }
}

impl Default for EntityGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Contact;
    use chrono::{Duration, Utc};

    fn contact(id: &str, created_at: chrono::DateTime<Utc>) -> EntityRef {
        EntityRef::Contact(Contact {
            id: id.to_string(),
            name: format!("Contact {id}"),
            email: None,
            phone: None,
            company: None,
            title: None,
            created_at,
        })
    }

    #[test]
    fn latest_is_always_history_head_after_store() {
        let mut graph = EntityGraph::new();
        graph.store(contact("c-1", Utc::now()));
        graph.store(contact("c-2", Utc::now()));

        let latest = graph.get_latest(EntityType::Contact).unwrap();
        let head = graph.history(EntityType::Contact, None)[0];
        assert_eq!(latest.id(), head.id());
        assert_eq!(latest.id(), "c-2");
    }

    #[test]
    fn storing_existing_id_updates_in_place_not_duplicated() {
        let mut graph = EntityGraph::new();
        graph.store(contact("c-1", Utc::now()));
        graph.store(contact("c-1", Utc::now()));

        assert_eq!(graph.history(EntityType::Contact, None).len(), 1);
    }

    #[test]
    fn history_bounded_to_max_and_index_evicted() {
        let mut graph = EntityGraph::with_max_history(2);
        graph.store(contact("c-1", Utc::now()));
        graph.store(contact("c-2", Utc::now()));
        graph.store(contact("c-3", Utc::now()));

        let history = graph.history(EntityType::Contact, None);
        assert_eq!(history.len(), 2);
        assert!(graph.get_by_id(EntityType::Contact, "c-1").is_none());
        assert!(graph.get_by_id(EntityType::Contact, "c-3").is_some());
    }

    #[test]
    fn get_by_id_round_trips_stored_entity() {
        let mut graph = EntityGraph::new();
        graph.store(contact("c-1", Utc::now()));
        let found = graph.get_by_id(EntityType::Contact, "c-1").unwrap();
        assert_eq!(found.id(), "c-1");
    }

    #[test]
    fn merge_recency_wins_on_conflicting_latest() {
        let now = Utc::now();
        let mut a = EntityGraph::new();
        a.store(contact("c-1", now - Duration::seconds(10)));

        let mut b = EntityGraph::new();
        b.store(contact("c-1", now));

        a.merge_recency_wins(&b);
        assert_eq!(a.get_latest(EntityType::Contact).unwrap().created_at(), now);
    }

    #[test]
    fn literal_merge_right_hand_wins_whole_type() {
        let mut a = EntityGraph::new();
        a.store(contact("c-1", Utc::now()));

        let mut b = EntityGraph::new();
        b.store(contact("c-2", Utc::now()));

        let merged = a.merge(&b);
        assert_eq!(merged.get_latest(EntityType::Contact).unwrap().id(), "c-2");
        assert!(merged.get_by_id(EntityType::Contact, "c-1").is_none());
    }
}
