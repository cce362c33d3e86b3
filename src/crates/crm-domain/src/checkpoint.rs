//! Domain-level run checkpoints.
//!
//! Distinct from `crm_checkpoint::Checkpoint`, which is the generic engine's
//! channel-versioned snapshot type. `RunCheckpoint` is the coordinator-facing
//! shape: one suspended run, identified by `(thread_id, run_id)`, carrying
//! the domain it suspended in, the node it suspended at, and the pending
//! interrupt the caller must resolve to resume.

use crate::approval::ApprovalDecision;
use crate::interrupt::InterruptValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub run_id: String,
    pub thread_id: String,
    pub domain: String,
    pub node_id: String,
    pub channels: HashMap<String, serde_json::Value>,
    pub pending_interrupt: Option<InterruptValue>,
    pub created_at: DateTime<Utc>,
}

impl RunCheckpoint {
    pub fn new(
        run_id: impl Into<String>,
        thread_id: impl Into<String>,
        domain: impl Into<String>,
        node_id: impl Into<String>,
        channels: HashMap<String, serde_json::Value>,
        pending_interrupt: Option<InterruptValue>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            thread_id: thread_id.into(),
            domain: domain.into(),
            node_id: node_id.into(),
            channels,
            pending_interrupt,
            created_at: Utc::now(),
        }
    }
}

/// A single-candidate selection, e.g. `{"id": "c-1"}` resolving a
/// disambiguation interrupt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub id: String,
}

/// The payload a caller sends back to resume a suspended run. Closed over
/// the three shapes the wire schema allows rather than one loosely-typed
/// bag of optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResumePayload {
    Approval { decision: ApprovalDecision },
    Disambiguation { selection: Selection },
    Clarification {
        clarified_name: String,
        #[serde(default)]
        skip: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_resume_payload_round_trips() {
        let payload = ResumePayload::Approval {
            decision: ApprovalDecision::Approve,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "approval");
        assert_eq!(json["decision"], "approve");

        let back: ResumePayload = serde_json::from_value(json).unwrap();
        match back {
            ResumePayload::Approval { decision } => assert!(decision.is_approved()),
            _ => panic!("expected approval variant"),
        }
    }

    #[test]
    fn clarification_skip_defaults_to_false() {
        let json = serde_json::json!({"type": "clarification", "clarified_name": "Jane"});
        let payload: ResumePayload = serde_json::from_value(json).unwrap();
        match payload {
            ResumePayload::Clarification { skip, .. } => assert!(!skip),
            _ => panic!("expected clarification variant"),
        }
    }
}
