//! Approval requests and the decisions that resolve them.

use crate::ids::ActionId;
use crate::preview::Preview;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub action_id: ActionId,
    pub domain: String,
    #[serde(rename = "type")]
    pub request_type: ApprovalRequestType,
    pub preview: Preview,
    pub data: serde_json::Value,
    pub message: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRequestType {
    ApprovalRequired,
}

impl ApprovalRequest {
    pub fn new(
        domain: impl Into<String>,
        preview: Preview,
        data: serde_json::Value,
        message: impl Into<String>,
        thread_id: impl Into<String>,
    ) -> Self {
        Self {
            action_id: ActionId::new(),
            domain: domain.into(),
            request_type: ApprovalRequestType::ApprovalRequired,
            preview,
            data,
            message: message.into(),
            thread_id: thread_id.into(),
        }
    }
}

/// The user's answer to an `ApprovalRequest`. `Modify` is reserved for a
/// future revision pass — not yet a producible decision, but accepted on the
/// wire so a forward-compatible client doesn't break parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approve,
    Reject,
    Modify,
}

impl ApprovalDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalDecision::Approve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_approve_is_an_approval() {
        assert!(ApprovalDecision::Approve.is_approved());
        assert!(!ApprovalDecision::Reject.is_approved());
        assert!(!ApprovalDecision::Modify.is_approved());
    }
}
