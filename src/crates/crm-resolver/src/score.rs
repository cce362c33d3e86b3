//! Name similarity and the composite candidate score (§4.E).

use crm_domain::Candidate;
use std::collections::HashSet;

/// Name similarity per §4.E / §8:
/// - exact match (case-insensitive) = 1.0
/// - one is a substring of the other = 0.9
/// - otherwise token-overlap, with tokens ≥ 3 chars counted at half credit
///   when only a prefix/suffix overlaps rather than an exact token match
/// - either side empty = 0.0
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (a, b) = (a.to_lowercase(), b.to_lowercase());
    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.9;
    }

    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let mut credit = 0.0;
    for token in &tokens_a {
        if tokens_b.contains(token) {
            credit += 1.0;
        } else if token.len() >= 3 && tokens_b.iter().any(|t| t.len() >= 3 && (t.starts_with(*token) || token.starts_with(*t))) {
            credit += 0.5;
        }
    }
    credit / tokens_a.len() as f64
}

/// Context used to compute a candidate's recent-interaction bonus. The
/// coordinator recalls memories via `crm-memory` before planning and passes
/// their raw text through here; the resolver never calls the memory
/// interface itself (§4.H/§4.J: recall happens once, at context-load time).
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    pub query: String,
    pub recent_memory_texts: Vec<String>,
}

impl ScoringContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), recent_memory_texts: Vec::new() }
    }

    pub fn with_recent_memory_texts(mut self, texts: Vec<String>) -> Self {
        self.recent_memory_texts = texts;
        self
    }

    fn mentions(&self, candidate: &Candidate) -> bool {
        let name = candidate.name.to_lowercase();
        self.recent_memory_texts.iter().any(|text| text.to_lowercase().contains(&name))
    }
}

/// Composite score (§4.E): 40% name similarity, 30% role/company/email-domain
/// substring match against the query, 30% recent-interaction bonus. Returned
/// on a 0..=100 scale to match the spec's literal thresholds (`top ≥ 80`,
/// `second < 50`).
pub fn score_candidate(candidate: &Candidate, context: &ScoringContext) -> f64 {
    let name_score = name_similarity(&candidate.name, &context.query);

    let query_lower = context.query.to_lowercase();
    let context_score = [&candidate.role, &candidate.company, &candidate.email]
        .iter()
        .filter_map(|field| field.as_deref())
        .any(|field| query_lower.contains(&field.to_lowercase()) || field.to_lowercase().contains(&query_lower));
    let context_score = if context_score { 1.0 } else { 0.0 };

    let recency_score = if context.mentions(candidate) { 1.0 } else { 0.0 };

    (0.4 * name_score + 0.3 * context_score + 0.3 * recency_score) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_domain::EntityType;

    fn candidate(name: &str) -> Candidate {
        Candidate {
            id: "c-1".to_string(),
            entity_type: EntityType::Contact,
            name: name.to_string(),
            role: None,
            company: None,
            email: None,
        }
    }

    #[test]
    fn exact_match_is_one() {
        assert_eq!(name_similarity("John Smith", "john smith"), 1.0);
    }

    #[test]
    fn empty_query_is_zero() {
        assert_eq!(name_similarity("", "John"), 0.0);
        assert_eq!(name_similarity("John", ""), 0.0);
    }

    #[test]
    fn substring_scores_point_nine() {
        assert_eq!(name_similarity("John", "John Smith"), 0.9);
    }

    #[test]
    fn john_johnson_scores_at_least_half() {
        assert!(name_similarity("john", "johnson") >= 0.5);
    }

    #[test]
    fn recent_interaction_contributes_bonus() {
        let c = candidate("Jane Doe");
        let without = ScoringContext::new("Jane");
        let with = ScoringContext::new("Jane").with_recent_memory_texts(vec!["scheduled a call with Jane Doe".to_string()]);
        assert!(score_candidate(&c, &with) > score_candidate(&c, &without));
    }
}
