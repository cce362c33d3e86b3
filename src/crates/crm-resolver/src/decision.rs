//! The scoring → auto-pick/disambiguate decision shared by the contact and
//! user resolver flavors (§4.E), independent of which entity kind or which
//! `InterruptValue` variant wraps the result.

use crm_domain::interrupt::ScoredCandidate;

const AUTO_PICK_RATIO: f64 = 2.0;
const HIGH_CONFIDENCE_THRESHOLD: f64 = 80.0;
const LOW_CONFIDENCE_THRESHOLD: f64 = 50.0;
const DISAMBIGUATION_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub enum Decision {
    AutoPicked(ScoredCandidate),
    NeedsDisambiguation(Vec<ScoredCandidate>),
    NoMatches,
}

/// `disambiguate(candidates, context)` (§4.E), scoring decision only — the
/// caller has already computed each candidate's composite score.
pub fn decide(mut scored: Vec<ScoredCandidate>) -> Decision {
    if scored.is_empty() {
        return Decision::NoMatches;
    }
    if scored.len() == 1 {
        return Decision::AutoPicked(scored.remove(0));
    }

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let top = scored[0].score;
    let second = scored[1].score;

    let auto_pick = top > second * AUTO_PICK_RATIO || (top >= HIGH_CONFIDENCE_THRESHOLD && second < LOW_CONFIDENCE_THRESHOLD);
    if auto_pick {
        return Decision::AutoPicked(scored.remove(0));
    }

    scored.truncate(DISAMBIGUATION_LIMIT);
    Decision::NeedsDisambiguation(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_domain::{Candidate, EntityType};

    fn scored(id: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate {
                id: id.to_string(),
                entity_type: EntityType::Contact,
                name: id.to_string(),
                role: None,
                company: None,
                email: None,
            },
            score,
        }
    }

    #[test]
    fn single_candidate_auto_picks() {
        let decision = decide(vec![scored("c-1", 42.0)]);
        assert!(matches!(decision, Decision::AutoPicked(c) if c.candidate.id == "c-1"));
    }

    #[test]
    fn no_candidates_is_no_matches() {
        assert!(matches!(decide(vec![]), Decision::NoMatches));
    }

    #[test]
    fn ratio_triggers_auto_pick() {
        let decision = decide(vec![scored("c-1", 60.0), scored("c-2", 20.0)]);
        assert!(matches!(decision, Decision::AutoPicked(c) if c.candidate.id == "c-1"));
    }

    #[test]
    fn high_low_threshold_triggers_auto_pick_even_without_ratio() {
        let decision = decide(vec![scored("c-1", 85.0), scored("c-2", 45.0)]);
        assert!(matches!(decision, Decision::AutoPicked(c) if c.candidate.id == "c-1"));
    }

    #[test]
    fn close_scores_yield_disambiguation() {
        let decision = decide(vec![scored("c-1", 70.0), scored("c-2", 65.0)]);
        assert!(matches!(decision, Decision::NeedsDisambiguation(v) if v.len() == 2));
    }

    #[test]
    fn disambiguation_truncates_to_five() {
        let candidates = (0..8).map(|i| scored(&format!("c-{i}"), 70.0 - i as f64)).collect();
        let decision = decide(candidates);
        assert!(matches!(decision, Decision::NeedsDisambiguation(v) if v.len() == 5));
    }
}
