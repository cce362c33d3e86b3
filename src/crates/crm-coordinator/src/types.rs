//! The coordinator's public request/response shapes (§6).

use crm_domain::{ExecutionPlan, OrgId, ResumePayload, SessionId, ThreadId, UserId};
use crm_gateway::CredentialProvider;
use serde::Serialize;
use std::sync::Arc;

/// `processQuery`'s input. `credential_provider` is a live handle, not wire
/// data — it never leaves the process, which is why it has no `Serialize`
/// bound and why [`ResumeRequest`] doesn't carry one: the coordinator keeps
/// the provider captured against the checkpoint it issued instead of asking
/// the caller to hand it back in.
pub struct ProcessQueryRequest {
    pub query: String,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub thread_id: ThreadId,
    pub timezone: String,
    pub credential_provider: Arc<dyn CredentialProvider>,
}

/// `resume`'s input (§6): the checkpoint the caller was handed in a prior
/// `interrupts` entry, plus the human's decision.
pub struct ResumeRequest {
    pub checkpoint_id: String,
    pub resume_payload: ResumePayload,
}

/// One still-unresolved interrupt attached to a response (§4.J step 4/6).
#[derive(Debug, Clone, Serialize)]
pub struct PendingInterrupt {
    pub domain: String,
    pub step_id: String,
    pub checkpoint_id: String,
    pub interrupt: serde_json::Value,
}

/// `{success, response, domains, entities, interrupts?, executionPlan?,
/// checkpointId?}` (§6), returned by both `processQuery` and `resume`.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorResponse {
    pub success: bool,
    pub response: String,
    pub domains: Vec<String>,
    pub entities: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interrupts: Vec<PendingInterrupt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_plan: Option<ExecutionPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
}

impl CoordinatorResponse {
    pub(crate) fn completed(response: String, domains: Vec<String>, entities: serde_json::Value, plan: ExecutionPlan) -> Self {
        Self {
            success: true,
            response,
            domains,
            entities,
            interrupts: Vec::new(),
            execution_plan: Some(plan),
            checkpoint_id: None,
        }
    }

    pub(crate) fn suspended(
        response: String,
        domains: Vec<String>,
        entities: serde_json::Value,
        plan: ExecutionPlan,
        interrupts: Vec<PendingInterrupt>,
    ) -> Self {
        let checkpoint_id = interrupts.first().map(|i| i.checkpoint_id.clone());
        Self {
            success: false,
            response,
            domains,
            entities,
            interrupts,
            execution_plan: Some(plan),
            checkpoint_id,
        }
    }
}
