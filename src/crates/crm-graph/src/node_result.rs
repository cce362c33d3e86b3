//! The shape a node returns when it runs.
//!
//! The source this engine is modeled on raises suspension through an exception
//! channel. Here a node's outcome is always an explicit value: either it
//! produced channel updates and the graph moves on (`NodeResult::Update` /
//! `NodeResult::Command`), or it wants the run paused and later resumed with a
//! human decision (`NodeResult::Suspend`). The executor inspects the variant;
//! there is no special control-flow exception type anywhere in this crate.

use std::collections::HashMap;

/// A batch of channel writes a node produces in one step.
///
/// Keys are channel names; values are JSON because channel merge semantics
/// (last-wins, append, custom reducer) are defined generically over
/// `serde_json::Value` by `crm_checkpoint::Channel`.
pub type ChannelUpdates = HashMap<String, serde_json::Value>;

/// What a node returns after running.
#[derive(Debug, Clone)]
pub enum NodeResult {
    /// Apply these channel updates and follow the graph's static or
    /// conditional edge out of the current node.
    Update(ChannelUpdates),

    /// Apply updates and/or explicitly override which node runs next,
    /// bypassing the static/conditional edge for this step only.
    Command(Command),

    /// Apply updates, persist a checkpoint, and return control to the caller.
    /// The run resumes at the node that suspended, not at the entry node.
    Suspend(Suspend),
}

impl NodeResult {
    pub fn update(updates: ChannelUpdates) -> Self {
        Self::Update(updates)
    }

    pub fn goto(node: impl Into<String>) -> Self {
        Self::Command(Command {
            update: None,
            goto: Some(node.into()),
        })
    }

    pub fn suspend(interrupt: serde_json::Value, updates: ChannelUpdates) -> Self {
        Self::Suspend(Suspend {
            interrupt,
            update: updates,
        })
    }

    /// The updates carried by this result, if any, regardless of variant.
    pub fn updates(&self) -> Option<&ChannelUpdates> {
        match self {
            NodeResult::Update(u) => Some(u),
            NodeResult::Command(c) => c.update.as_ref(),
            NodeResult::Suspend(s) => Some(&s.update),
        }
    }
}

/// An explicit redirect, optionally carrying an update.
///
/// Grounded on the teacher's `Command` primitive for overriding routing
/// without a conditional edge (used by nodes that branch into error handling,
/// e.g. `{error}` routes unconditionally to `format_response`).
#[derive(Debug, Clone, Default)]
pub struct Command {
    pub update: Option<ChannelUpdates>,
    pub goto: Option<String>,
}

impl Command {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_update(mut self, update: ChannelUpdates) -> Self {
        self.update = Some(update);
        self
    }

    pub fn with_goto(mut self, node: impl Into<String>) -> Self {
        self.goto = Some(node.into());
        self
    }
}

/// A node's request to suspend the run.
///
/// `interrupt` is the wire-stable JSON payload (`ApprovalRequest`,
/// `ContactDisambiguation`, ...); the coordinator is responsible for
/// interpreting its `type` tag. The engine itself treats it opaquely.
#[derive(Debug, Clone)]
pub struct Suspend {
    pub interrupt: serde_json::Value,
    pub update: ChannelUpdates,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_constructor_roundtrips() {
        let mut updates = ChannelUpdates::new();
        updates.insert("response".into(), json!("ok"));
        let result = NodeResult::update(updates.clone());
        assert_eq!(result.updates(), Some(&updates));
    }

    #[test]
    fn goto_carries_no_update() {
        let result = NodeResult::goto("format_response");
        match result {
            NodeResult::Command(Command { update, goto }) => {
                assert!(update.is_none());
                assert_eq!(goto.as_deref(), Some("format_response"));
            }
            _ => panic!("expected Command"),
        }
    }

    #[test]
    fn suspend_carries_interrupt_and_update() {
        let mut updates = ChannelUpdates::new();
        updates.insert("requiresApproval".into(), json!(true));
        let result = NodeResult::suspend(json!({"type": "approval_required"}), updates.clone());
        assert_eq!(result.updates(), Some(&updates));
        match result {
            NodeResult::Suspend(Suspend { interrupt, .. }) => {
                assert_eq!(interrupt["type"], json!("approval_required"));
            }
            _ => panic!("expected Suspend"),
        }
    }
}
