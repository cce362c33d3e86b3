//! `InterruptValue`: the tagged sum of every structured value a domain
//! subgraph can suspend with, and the candidate types the resolver scores.

use crate::approval::ApprovalRequest;
use crate::entity::EntityType;
use serde::{Deserialize, Serialize};

/// An unscored search hit from the resolver's `search` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub entity_type: EntityType,
    pub name: String,
    pub role: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
}

/// A `Candidate` annotated with its composite score, carried into a
/// disambiguation interrupt so the UI can show why each option ranked where
/// it did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactDisambiguation {
    pub candidates: Vec<ScoredCandidate>,
    pub original_query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactClarification {
    pub suggestions: Vec<String>,
    pub original_query: String,
    pub allow_skip: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDisambiguation {
    pub candidates: Vec<ScoredCandidate>,
    pub original_query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClarification {
    pub suggestions: Vec<String>,
    pub original_query: String,
    pub allow_skip: bool,
}

/// Every value a domain subgraph node may suspend a run with. Closed rather
/// than a free-form JSON blob so the coordinator's resume dispatch is a
/// compile-time-exhaustive match, and so the wire schema documents itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterruptValue {
    ApprovalRequired(ApprovalRequest),
    ContactDisambiguation(ContactDisambiguation),
    ContactClarification(ContactClarification),
    UserDisambiguation(UserDisambiguation),
    UserClarification(UserClarification),
}

impl InterruptValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            InterruptValue::ApprovalRequired(_) => "approval_required",
            InterruptValue::ContactDisambiguation(_) => "contact_disambiguation",
            InterruptValue::ContactClarification(_) => "contact_clarification",
            InterruptValue::UserDisambiguation(_) => "user_disambiguation",
            InterruptValue::UserClarification(_) => "user_clarification",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::Preview;

    #[test]
    fn type_name_matches_wire_schema() {
        let request = ApprovalRequest::new(
            "calendar",
            Preview::new("appointment", "create", "Sync"),
            serde_json::json!({}),
            "Create this appointment?",
            "thread-1",
        );
        let value = InterruptValue::ApprovalRequired(request);
        assert_eq!(value.type_name(), "approval_required");
    }

    #[test]
    fn serializes_with_internal_tag() {
        let value = InterruptValue::ContactClarification(ContactClarification {
            suggestions: vec!["Jane Doe".to_string()],
            original_query: "Zzzz".to_string(),
            allow_skip: true,
        });
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["type"], "contact_clarification");
        assert_eq!(json["allow_skip"], true);
    }
}
