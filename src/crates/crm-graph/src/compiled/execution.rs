//! Stepping a `CompiledGraph` through nodes, including suspend/resume.
//!
//! This is a single-threaded cooperative interpreter, not a Pregel/BSP
//! engine: exactly one node runs per step, its updates are applied, and the
//! next node is whatever its edge (static, conditional, or an explicit
//! `Command::goto`) says. Fan-out across sibling domains is the
//! coordinator's job (`crm-coordinator` runs independent domain graphs
//! concurrently for `parallel` plan groups); within one graph, execution is
//! always linear.

use super::structure::CompiledGraph;
use crate::channel_store::ChannelStore;
use crate::error::{GraphError, Result};
use crate::node_result::{ChannelUpdates, NodeResult};
use crm_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointSource,
};
use std::collections::HashMap;

/// The result of running (or resuming) a graph to either completion or the
/// next suspension point.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Completed {
        channels: HashMap<String, serde_json::Value>,
    },
    Suspended {
        checkpoint_id: String,
        node: String,
        interrupt: serde_json::Value,
    },
}

impl CompiledGraph {
    fn fresh_store(&self) -> ChannelStore {
        let mut store = ChannelStore::new();
        for (name, kind) in &self.channel_specs {
            store.register(name.clone(), kind.instantiate());
        }
        store
    }

    /// Run from the entry node with the given initial channel values.
    pub async fn execute(
        &self,
        initial: HashMap<String, serde_json::Value>,
        saver: &dyn CheckpointSaver,
        thread_id: &str,
    ) -> Result<ExecutionOutcome> {
        let mut store = self.fresh_store();
        store.restore(&initial)?;
        self.run_from(self.entry.clone(), &mut store, saver, thread_id)
            .await
    }

    /// Resume a previously-suspended run. `decision` is merged into the
    /// restored channel state (e.g. `approval_decision: "approve"`) before
    /// execution continues from the edge leaving the node that suspended —
    /// the suspended node itself does not re-run.
    pub async fn resume(
        &self,
        decision: ChannelUpdates,
        saver: &dyn CheckpointSaver,
        thread_id: &str,
    ) -> Result<ExecutionOutcome> {
        let config = CheckpointConfig::new().with_thread_id(thread_id.to_string());
        let tuple = saver
            .get_tuple(&config)
            .await?
            .ok_or_else(|| GraphError::NoCheckpointToResume(thread_id.to_string()))?;

        let suspended_node = tuple
            .metadata
            .extra
            .get("suspended_node")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                GraphError::InvalidResume("checkpoint missing suspended_node metadata".to_string())
            })?
            .to_string();

        let mut store = self.fresh_store();
        store.restore(&tuple.checkpoint.channel_values)?;
        store.apply(&decision)?;

        let next = self.route_from(&suspended_node, &store)?;
        self.run_from(next, &mut store, saver, thread_id).await
    }

    fn route_from(&self, node: &str, store: &ChannelStore) -> Result<String> {
        self.edges
            .get(node)
            .map(|edge| edge.route(store))
            .ok_or_else(|| GraphError::NoEdge(node.to_string()))
    }

    async fn run_from(
        &self,
        start: String,
        store: &mut ChannelStore,
        saver: &dyn CheckpointSaver,
        thread_id: &str,
    ) -> Result<ExecutionOutcome> {
        let mut current = start;
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > self.max_steps {
                return Err(GraphError::Execution(format!(
                    "exceeded max steps ({}) starting at node {}",
                    self.max_steps, current
                )));
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::NodeNotFound(current.clone()))?;

            tracing::debug!(node = %current, step = steps, "executing graph node");
            let result = node.run(store).await?;

            if let Some(updates) = result.updates() {
                store.apply(updates)?;
            }

            match result {
                NodeResult::Suspend(suspend) => {
                    tracing::info!(node = %current, "graph suspended, persisting checkpoint");
                    let checkpoint_id = self
                        .persist_suspend(&current, &suspend.interrupt, store, saver, thread_id)
                        .await?;
                    return Ok(ExecutionOutcome::Suspended {
                        checkpoint_id,
                        node: current,
                        interrupt: suspend.interrupt,
                    });
                }
                NodeResult::Command(command) if command.goto.is_some() => {
                    current = command.goto.unwrap();
                }
                _ => {
                    if self.is_terminal(&current) {
                        tracing::info!(node = %current, "graph reached terminal node");
                        return Ok(ExecutionOutcome::Completed {
                            channels: store.snapshot()?,
                        });
                    }
                    current = self.route_from(&current, store)?;
                }
            }
        }
    }

    async fn persist_suspend(
        &self,
        node: &str,
        interrupt: &serde_json::Value,
        store: &ChannelStore,
        saver: &dyn CheckpointSaver,
        thread_id: &str,
    ) -> Result<String> {
        let channel_values = store.snapshot()?;
        let versions = store.versions().clone();
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Loop)
            .with_extra("suspended_node".to_string(), serde_json::json!(node))
            .with_extra("interrupt".to_string(), interrupt.clone());

        let checkpoint = Checkpoint::new(
            uuid::Uuid::new_v4().to_string(),
            channel_values,
            versions.clone(),
            HashMap::new(),
        );
        let config = CheckpointConfig::new().with_thread_id(thread_id.to_string());
        let saved = saver.put(&config, checkpoint, metadata, versions).await?;
        Ok(saved.checkpoint_id.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{ChannelKind, StateGraph};
    use crate::node_result::{ChannelUpdates, NodeResult};
    use crm_checkpoint::InMemoryCheckpointSaver;
    use serde_json::json;

    fn build_approval_graph() -> crate::compiled::CompiledGraph {
        StateGraph::new()
            .add_channel("response", ChannelKind::LastValue)
            .add_channel("approval_decision", ChannelKind::LastValue)
            .add_sync_node("generate_preview", |_| {
                Ok(NodeResult::update(ChannelUpdates::new()))
            })
            .add_sync_node("approval", |_| {
                Ok(NodeResult::suspend(
                    json!({"type": "approval_required"}),
                    ChannelUpdates::new(),
                ))
            })
            .add_sync_node("create", |channels| {
                let mut u = ChannelUpdates::new();
                let decision = channels.try_get_json("approval_decision");
                u.insert(
                    "response".into(),
                    json!(format!("decision was {:?}", decision)),
                );
                Ok(NodeResult::update(u))
            })
            .add_sync_node("format_response", |_| {
                Ok(NodeResult::update(ChannelUpdates::new()))
            })
            .set_entry_point("generate_preview")
            .add_edge("generate_preview", "approval")
            .add_edge("approval", "create")
            .add_edge("create", "format_response")
            .set_terminal("format_response")
            .compile()
            .unwrap()
    }

    #[tokio::test]
    async fn execute_suspends_at_approval_node() {
        let compiled = build_approval_graph();
        let saver = InMemoryCheckpointSaver::new();

        let outcome = compiled
            .execute(std::collections::HashMap::new(), &saver, "thread-1")
            .await
            .unwrap();

        match outcome {
            super::ExecutionOutcome::Suspended { node, .. } => assert_eq!(node, "approval"),
            _ => panic!("expected suspension"),
        }
    }

    #[tokio::test]
    async fn resume_continues_past_suspended_node() {
        let compiled = build_approval_graph();
        let saver = InMemoryCheckpointSaver::new();

        compiled
            .execute(std::collections::HashMap::new(), &saver, "thread-2")
            .await
            .unwrap();

        let mut decision = ChannelUpdates::new();
        decision.insert("approval_decision".into(), json!("approve"));

        let outcome = compiled.resume(decision, &saver, "thread-2").await.unwrap();
        match outcome {
            super::ExecutionOutcome::Completed { channels } => {
                let response = channels.get("response").unwrap().as_str().unwrap().to_string();
                assert!(response.contains("approve"));
            }
            _ => panic!("expected completion"),
        }
    }
}
