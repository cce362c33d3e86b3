//! Contact and user resolver flavors (§4.E): identical contract, different
//! gateway operations and different `InterruptValue` wrapping.

use crate::cache::ResolverCache;
use crate::decision::{decide, Decision};
use crate::error::ResolverError;
use crate::score::{score_candidate, ScoringContext};
use async_trait::async_trait;
use crm_domain::interrupt::{ContactClarification, ContactDisambiguation, ScoredCandidate, UserClarification, UserDisambiguation};
use crm_domain::{Candidate, Contact, EntityType, User};
use crm_gateway::GatewayError;
use std::sync::OnceLock;

const PREFIX_LEN: usize = 4;
const FUZZY_THRESHOLD: f64 = 0.3;
const DEFAULT_SEARCH_LIMIT: usize = 20;

fn self_reference_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"(?i)^(me|myself|i)$").unwrap())
}

/// Whether `query` is a bare self-reference (§4.E: "Self-reference
/// (`me|myself|I`) routes to `resolveMe`"). Matches the whole trimmed query,
/// not a substring — "tell me" is not a self-reference.
pub fn is_self_reference(query: &str) -> bool {
    self_reference_pattern().is_match(query.trim())
}

fn contact_to_candidate(contact: &Contact) -> Candidate {
    Candidate {
        id: contact.id.clone(),
        entity_type: EntityType::Contact,
        name: contact.name.clone(),
        role: contact.title.clone(),
        company: contact.company.clone(),
        email: contact.email.clone(),
    }
}

fn user_to_candidate(user: &User) -> Candidate {
    Candidate {
        id: user.id.clone(),
        entity_type: EntityType::User,
        name: user.name.clone(),
        role: None,
        company: None,
        email: user.email.clone(),
    }
}

/// Gateway operations a resolver flavor needs. Implemented against
/// `crm_gateway::EffectRunner` in production, against a fixed candidate list
/// in tests.
#[async_trait]
pub trait ContactSearch: Send + Sync {
    async fn search_contacts(&self, query: &str, limit: usize) -> Result<Vec<Contact>, GatewayError>;
}

#[async_trait]
pub trait UserSearch: Send + Sync {
    async fn search_users(&self, query: &str, limit: usize) -> Result<Vec<User>, GatewayError>;
    async fn current_user(&self) -> Result<User, GatewayError>;
}

/// The resolved outcome of one `disambiguate` call (§4.E/§4.I.1): either a
/// single candidate, or a suspension value the caller threads onto the
/// domain's interrupt channel.
#[derive(Debug, Clone)]
pub enum ContactResolution {
    Resolved(ScoredCandidate),
    Disambiguation(ContactDisambiguation),
    Clarification(ContactClarification),
}

#[derive(Debug, Clone)]
pub enum UserResolution {
    Resolved(ScoredCandidate),
    Disambiguation(UserDisambiguation),
    Clarification(UserClarification),
    Me(User),
}

pub struct ContactResolver<'a, S: ContactSearch> {
    source: &'a S,
}

impl<'a, S: ContactSearch> ContactResolver<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    async fn search(&self, query: &str) -> Result<Vec<Candidate>, GatewayError> {
        let exact = self.source.search_contacts(query, DEFAULT_SEARCH_LIMIT).await?;
        if !exact.is_empty() {
            return Ok(exact.iter().map(contact_to_candidate).collect());
        }
        let prefix: String = query.chars().take(PREFIX_LEN).collect();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        let prefix_hits = self.source.search_contacts(&prefix, DEFAULT_SEARCH_LIMIT).await?;
        Ok(prefix_hits
            .iter()
            .map(contact_to_candidate)
            .filter(|c| crate::score::name_similarity(&c.name, query) >= FUZZY_THRESHOLD)
            .collect())
    }

    pub async fn resolve(
        &self,
        query: &str,
        context: &ScoringContext,
        cache: &mut ResolverCache,
    ) -> Result<ContactResolution, ResolverError> {
        if let Some(cached) = cache.get(query) {
            return Ok(self.decide_contact(cached, query));
        }

        let candidates = self.search(query).await?;
        let scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let score = score_candidate(&candidate, context);
                ScoredCandidate { candidate, score }
            })
            .collect();
        cache.put(query, scored.clone());
        Ok(self.decide_contact(scored, query))
    }

    fn decide_contact(&self, scored: Vec<ScoredCandidate>, query: &str) -> ContactResolution {
        match decide(scored) {
            Decision::AutoPicked(c) => ContactResolution::Resolved(c),
            Decision::NeedsDisambiguation(candidates) => ContactResolution::Disambiguation(ContactDisambiguation {
                candidates,
                original_query: query.to_string(),
            }),
            Decision::NoMatches => ContactResolution::Clarification(ContactClarification {
                suggestions: Vec::new(),
                original_query: query.to_string(),
                allow_skip: true,
            }),
        }
    }
}

pub struct UserResolver<'a, S: UserSearch> {
    source: &'a S,
}

impl<'a, S: UserSearch> UserResolver<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    async fn search(&self, query: &str) -> Result<Vec<Candidate>, GatewayError> {
        let exact = self.source.search_users(query, DEFAULT_SEARCH_LIMIT).await?;
        if !exact.is_empty() {
            return Ok(exact.iter().map(user_to_candidate).collect());
        }
        let prefix: String = query.chars().take(PREFIX_LEN).collect();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        let prefix_hits = self.source.search_users(&prefix, DEFAULT_SEARCH_LIMIT).await?;
        Ok(prefix_hits
            .iter()
            .map(user_to_candidate)
            .filter(|c| crate::score::name_similarity(&c.name, query) >= FUZZY_THRESHOLD)
            .collect())
    }

    /// §4.E: "Self-reference ... routes to `resolveMe(session)`". Call this
    /// before `resolve` whenever `is_self_reference(query)` is true.
    pub async fn resolve_me(&self) -> Result<User, ResolverError> {
        Ok(self.source.current_user().await?)
    }

    pub async fn resolve(
        &self,
        query: &str,
        context: &ScoringContext,
        cache: &mut ResolverCache,
    ) -> Result<UserResolution, ResolverError> {
        if is_self_reference(query) {
            return Ok(UserResolution::Me(self.resolve_me().await?));
        }

        if let Some(cached) = cache.get(query) {
            return Ok(self.decide_user(cached, query));
        }

        let candidates = self.search(query).await?;
        let scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let score = score_candidate(&candidate, context);
                ScoredCandidate { candidate, score }
            })
            .collect();
        cache.put(query, scored.clone());
        Ok(self.decide_user(scored, query))
    }

    fn decide_user(&self, scored: Vec<ScoredCandidate>, query: &str) -> UserResolution {
        match decide(scored) {
            Decision::AutoPicked(c) => UserResolution::Resolved(c),
            Decision::NeedsDisambiguation(candidates) => UserResolution::Disambiguation(UserDisambiguation {
                candidates,
                original_query: query.to_string(),
            }),
            Decision::NoMatches => UserResolution::Clarification(UserClarification {
                suggestions: Vec::new(),
                original_query: query.to_string(),
                allow_skip: true,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    struct FixedContacts {
        contacts: Vec<Contact>,
        prefix_calls: Mutex<u32>,
    }

    #[async_trait]
    impl ContactSearch for FixedContacts {
        async fn search_contacts(&self, query: &str, _limit: usize) -> Result<Vec<Contact>, GatewayError> {
            let exact: Vec<Contact> = self.contacts.iter().filter(|c| c.name.eq_ignore_ascii_case(query)).cloned().collect();
            if !exact.is_empty() || query.len() > PREFIX_LEN {
                return Ok(exact);
            }
            *self.prefix_calls.lock().unwrap() += 1;
            Ok(self.contacts.iter().filter(|c| c.name.to_lowercase().starts_with(&query.to_lowercase())).cloned().collect())
        }
    }

    fn contact(id: &str, name: &str) -> Contact {
        Contact {
            id: id.to_string(),
            name: name.to_string(),
            email: None,
            phone: None,
            company: None,
            title: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn exact_match_resolves_without_disambiguation() {
        let source = FixedContacts { contacts: vec![contact("c-1", "Jane Doe")], prefix_calls: Mutex::new(0) };
        let resolver = ContactResolver::new(&source);
        let mut cache = ResolverCache::new();
        let context = ScoringContext::new("Jane Doe");

        let outcome = resolver.resolve("Jane Doe", &context, &mut cache).await.unwrap();
        assert!(matches!(outcome, ContactResolution::Resolved(c) if c.candidate.id == "c-1"));
    }

    #[tokio::test]
    async fn multiple_close_matches_disambiguate() {
        let source = FixedContacts {
            contacts: vec![contact("c-1", "John Smith"), contact("c-2", "John Doe")],
            prefix_calls: Mutex::new(0),
        };
        let resolver = ContactResolver::new(&source);
        let mut cache = ResolverCache::new();
        let context = ScoringContext::new("John");

        let outcome = resolver.resolve("John", &context, &mut cache).await.unwrap();
        assert!(matches!(outcome, ContactResolution::Disambiguation(_)));
    }

    #[tokio::test]
    async fn no_matches_yields_clarification_with_skip_allowed() {
        let source = FixedContacts { contacts: vec![], prefix_calls: Mutex::new(0) };
        let resolver = ContactResolver::new(&source);
        let mut cache = ResolverCache::new();
        let context = ScoringContext::new("Zzzz");

        let outcome = resolver.resolve("Zzzz", &context, &mut cache).await.unwrap();
        match outcome {
            ContactResolution::Clarification(c) => assert!(c.allow_skip),
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_lookup_hits_cache_without_another_search() {
        let source = FixedContacts { contacts: vec![contact("c-1", "Jane Doe")], prefix_calls: Mutex::new(0) };
        let resolver = ContactResolver::new(&source);
        let mut cache = ResolverCache::new();
        let context = ScoringContext::new("Jane Doe");

        resolver.resolve("Jane Doe", &context, &mut cache).await.unwrap();
        assert!(cache.get("Jane Doe").is_some());
    }

    #[test]
    fn self_reference_matches_whole_query_only() {
        assert!(is_self_reference("me"));
        assert!(is_self_reference(" Myself "));
        assert!(!is_self_reference("tell me about John"));
    }
}
