//! In-memory bookkeeping for runs parked at an interrupt, keyed by the
//! `checkpoint_id` handed back to the caller.
//!
//! The coordinator's run loop only ever suspends one domain step at a time
//! per checkpoint; a wave with several `Parallel` steps that all suspend
//! produces one [`PendingRun`] per step. Resuming one does not wait for its
//! siblings — whichever checkpoint resumes first carries the run forward
//! into the waves still queued behind it. This is a deliberate simplification
//! of true multi-interrupt synchronization (see `DESIGN.md`).

use crm_domain::{Domain, DomainStep, OrgId, SessionId, ThreadId, UserId};
use crm_gateway::CredentialProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Which resume channel a suspended interrupt's decision must be written to,
/// derived from the `InterruptValue` variant the subgraph suspended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResumeChannel {
    ApprovalDecision,
    ContactDisambiguation,
    ContactClarification,
    UserDisambiguation,
    UserClarification,
}

impl ResumeChannel {
    pub(crate) fn for_interrupt_type(type_name: &str) -> Option<Self> {
        match type_name {
            "approval_required" => Some(Self::ApprovalDecision),
            "contact_disambiguation" => Some(Self::ContactDisambiguation),
            "contact_clarification" => Some(Self::ContactClarification),
            "user_disambiguation" => Some(Self::UserDisambiguation),
            "user_clarification" => Some(Self::UserClarification),
            _ => None,
        }
    }

    pub(crate) fn channel_name(self) -> &'static str {
        match self {
            Self::ApprovalDecision => crm_subgraphs::common::APPROVAL_DECISION,
            Self::ContactDisambiguation => crm_subgraphs::common::CONTACT_DISAMBIGUATION_RESPONSE,
            Self::ContactClarification => crm_subgraphs::common::CONTACT_CLARIFICATION_RESPONSE,
            Self::UserDisambiguation => crm_subgraphs::common::USER_DISAMBIGUATION_RESPONSE,
            Self::UserClarification => crm_subgraphs::common::USER_CLARIFICATION_RESPONSE,
        }
    }
}

/// What a checkpoint resumes into: either a suspended `crm-graph` subgraph
/// (the overwhelming common case), or a bare resolver call for a `Domain::User`
/// step — those have no subgraph of their own (`Domain::is_subgraph`) so a
/// disambiguation there has nothing to re-enter except "try the resolver
/// again with the clarified/selected value".
pub(crate) enum PendingKind {
    Subgraph {
        graph_thread_id: String,
        resume_channel: ResumeChannel,
    },
    UserResolution {
        original_query: String,
    },
}

/// Everything needed to resume a suspended domain step and carry the run
/// forward: what kind of suspension it was, the run identity (so the
/// resumed step's effects and memory synthesis land in the right place),
/// and the waves still queued behind this step.
pub(crate) struct PendingRun {
    pub(crate) domain: Domain,
    pub(crate) step_id: String,
    pub(crate) kind: PendingKind,
    pub(crate) org_id: OrgId,
    pub(crate) user_id: UserId,
    pub(crate) session_id: SessionId,
    pub(crate) thread_id: ThreadId,
    pub(crate) timezone: String,
    pub(crate) credential_provider: Arc<dyn CredentialProvider>,
    pub(crate) memory_context: String,
    pub(crate) recent_memory_texts: Vec<String>,
    pub(crate) responses_so_far: Vec<(String, String)>,
    pub(crate) domains_so_far: Vec<String>,
    pub(crate) remaining_waves: Vec<Vec<DomainStep>>,
}

#[derive(Default)]
pub(crate) struct PendingRuns {
    by_checkpoint: Mutex<HashMap<String, PendingRun>>,
}

impl PendingRuns {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert(&self, checkpoint_id: String, run: PendingRun) {
        self.by_checkpoint.lock().await.insert(checkpoint_id, run);
    }

    pub(crate) async fn take(&self, checkpoint_id: &str) -> Option<PendingRun> {
        self.by_checkpoint.lock().await.remove(checkpoint_id)
    }
}
