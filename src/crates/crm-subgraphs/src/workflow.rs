//! The workflow domain subgraph (§4.I.3).
//!
//! `generate_workflow -> validate -> {error|generate_preview} ->
//! wait_approval -> create_workflow -> format_response`. Unlike calendar and
//! task, this domain has no resolver step and no `link_*`/`synthesize_memory`
//! node of its own — the coordinator's run loop covers memory synthesis for
//! domains that don't do it inline. Grounded on the same
//! `StateGraph`/`Command` shape as `calendar.rs`, simplified to a single
//! linear happy path.

use crate::common::*;
use async_trait::async_trait;
use crm_domain::{ApprovalDecision, ApprovalRequest, EntityRef, InterruptValue, Preview, Workflow};
use crm_gateway::gateway::WorkflowStepSpec;
use crm_graph::node_result::{ChannelUpdates, Command, NodeResult};
use crm_graph::{ChannelKind, ChannelStore, GraphNode, StateGraph};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const WORKFLOW_SPEC: &str = "workflow_spec";
const STEP_FAILURES: &str = "step_failures";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeneratedStep {
    name: String,
    description: String,
    step_type: String,
    assignee: String,
    day_offset: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeneratedWorkflow {
    name: String,
    description: String,
    steps: Vec<GeneratedStep>,
}

fn extract_workflow_name(instruction: &str) -> String {
    let re = regex::Regex::new(r"(?i)\bworkflow\s+(?:called|named|titled)\s+(.+?)(?:[.!?]|$)").unwrap();
    if let Some(cap) = re.captures(instruction) {
        return cap[1].trim().to_string();
    }
    let re = regex::Regex::new(r"(?i)\b(?:called|named|titled)\s+(.+?)(?:[.!?]|$)").unwrap();
    if let Some(cap) = re.captures(instruction) {
        return cap[1].trim().to_string();
    }
    "New workflow".to_string()
}

/// Splits an instruction into a sequence of step sketches: numbered list
/// items (`1. ...`) if present, otherwise clauses separated by `then`,
/// `after that`, or semicolons.
fn split_steps(instruction: &str) -> Vec<String> {
    let numbered = regex::Regex::new(r"(?m)^\s*\d+[.)]\s*").unwrap();
    if numbered.is_match(instruction) {
        return numbered
            .split(instruction)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    let splitter = regex::Regex::new(r"(?i)\s*(?:,\s*then\s+|;\s*|\bthen\b\s*|\bafter that\b\s*)").unwrap();
    splitter
        .split(instruction)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn day_offset_for(text: &str, index: usize) -> i64 {
    let re = regex::Regex::new(r"(?i)(?:after|in)\s+(\d+)\s+days?").unwrap();
    re.captures(text)
        .and_then(|c| c[1].parse::<i64>().ok())
        .unwrap_or(index as i64)
}

fn step_type_for(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if regex::Regex::new(r"\b(call|meet|meeting|appointment|sync)\b").unwrap().is_match(&lower) {
        "appointment"
    } else {
        "task"
    }
}

fn assignee_for(text: &str) -> &'static str {
    if text.to_lowercase().contains("assistant") {
        "Assistant"
    } else {
        "Advisor"
    }
}

fn generate_workflow(instruction: &str) -> GeneratedWorkflow {
    let name = extract_workflow_name(instruction);
    let clauses = split_steps(instruction);
    let steps = clauses
        .iter()
        .enumerate()
        .map(|(i, clause)| GeneratedStep {
            name: clause.clone(),
            description: clause.clone(),
            step_type: step_type_for(clause).to_string(),
            assignee: assignee_for(clause).to_string(),
            day_offset: day_offset_for(clause, i),
        })
        .collect();

    GeneratedWorkflow { name, description: instruction.trim().to_string(), steps }
}

/// §4.I.3 validation invariants: `1 <= steps.len() <= 22`, each step has a
/// non-empty name and a `type` of `task` or `appointment`.
fn validate_spec(spec: &GeneratedWorkflow) -> Result<(), String> {
    if spec.steps.is_empty() || spec.steps.len() > 22 {
        return Err(format!("Validation: a workflow must have between 1 and 22 steps, got {}.", spec.steps.len()));
    }
    for step in &spec.steps {
        if step.name.trim().is_empty() {
            return Err("Validation: every workflow step needs a name.".to_string());
        }
        if step.step_type != "task" && step.step_type != "appointment" {
            return Err(format!("Validation: unknown step type \"{}\".", step.step_type));
        }
    }
    Ok(())
}

pub fn register_channels(graph: StateGraph) -> StateGraph {
    register_common_channels(graph)
        .add_channel(WORKFLOW_SPEC, ChannelKind::LastValue)
        .add_channel(STEP_FAILURES, ChannelKind::LastValue)
}

fn generate_workflow_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let instruction = get_string(channels, INSTRUCTION).unwrap_or_default();
        let spec = generate_workflow(&instruction);
        let mut updates = ChannelUpdates::new();
        set(&mut updates, WORKFLOW_SPEC, &spec);
        Ok(NodeResult::update(updates))
    }
}

fn validate_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let spec: GeneratedWorkflow = get(channels, WORKFLOW_SPEC).expect("generate_workflow always sets workflow_spec");
        match validate_spec(&spec) {
            Ok(()) => Ok(NodeResult::update(ChannelUpdates::new())),
            Err(message) => Ok(error_command(message)),
        }
    }
}

fn validate_router(channels: &ChannelStore) -> String {
    if get_string(channels, ERROR).is_some() {
        "error".to_string()
    } else {
        "generate_preview".to_string()
    }
}

fn generate_preview_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let spec: GeneratedWorkflow = get(channels, WORKFLOW_SPEC).expect("validate already checked workflow_spec");
        let thread_id = get_string(channels, THREAD_ID).unwrap_or_default();

        let mut preview = Preview::new("workflow", "create", spec.name.clone())
            .with_detail("name", spec.name.clone())
            .with_detail("steps", spec.steps.len().to_string());
        for (i, step) in spec.steps.iter().enumerate() {
            preview = preview.with_detail(format!("step_{i}"), format!("{} ({}, day {})", step.name, step.step_type, step.day_offset));
        }

        let request = ApprovalRequest::new(
            "workflow",
            preview,
            serde_json::to_value(&spec).unwrap(),
            format!("Create the \"{}\" workflow with {} step(s)?", spec.name, spec.steps.len()),
            thread_id,
        );

        let mut updates = ChannelUpdates::new();
        set(&mut updates, REQUIRES_APPROVAL, true);
        set(&mut updates, APPROVAL_REQUEST, &request);
        Ok(NodeResult::update(updates))
    }
}

fn wait_approval_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let request: ApprovalRequest = get(channels, APPROVAL_REQUEST).expect("generate_preview always sets approvalRequest");
        let interrupt = InterruptValue::ApprovalRequired(request);
        Ok(NodeResult::suspend(
            serde_json::to_value(&interrupt).expect("interrupt values serialize"),
            ChannelUpdates::new(),
        ))
    }
}

struct CreateWorkflow {
    deps: Arc<SubgraphDeps>,
}

#[async_trait]
impl GraphNode for CreateWorkflow {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let decision: Option<ApprovalDecision> = get(channels, APPROVAL_DECISION);
        if !decision.map(|d| d.is_approved()).unwrap_or(false) {
            let mut updates = ChannelUpdates::new();
            set(&mut updates, RESPONSE, "The request was not approved; no workflow was created.");
            return Ok(NodeResult::update(updates));
        }

        let spec: GeneratedWorkflow = get(channels, WORKFLOW_SPEC).expect("validate already checked workflow_spec");

        let create_payload = serde_json::json!({"name": spec.name, "description": spec.description});
        let shell = self
            .deps
            .effects
            .write("workflows.create", "bsa_workflow", create_payload, || {
                let name = spec.name.clone();
                let description = spec.description.clone();
                async move { self.deps.effects.gateway().create_workflow(&name, &description).await.map(Some) }
            })
            .await
            .map(|outcome| outcome.into_executed().flatten());

        let shell: Workflow = match shell {
            Ok(Some(workflow)) => workflow,
            Ok(None) => {
                let mut updates = ChannelUpdates::new();
                set(&mut updates, RESPONSE, format!("Duplicate request to create workflow \"{}\" was skipped.", spec.name));
                return Ok(NodeResult::update(updates));
            }
            Err(err) => return Ok(error_command(format!("Could not create the workflow: {err}"))),
        };

        // Steps are added sequentially, in declared order; a failed step is
        // collected as a warning and does not abort the remaining steps.
        let mut summaries = Vec::new();
        let mut failures = Vec::new();
        for step in &spec.steps {
            let step_spec = WorkflowStepSpec {
                name: step.name.clone(),
                description: step.description.clone(),
                step_type: step.step_type.clone(),
                assignee: step.assignee.clone(),
                day_offset: step.day_offset,
            };
            let payload = serde_json::to_value(&step_spec).unwrap();
            let workflow_id = shell.id.clone();
            let result = self
                .deps
                .effects
                .write("workflows.add_step", "bsa_workflow", payload, || {
                    let step_spec = step_spec.clone();
                    let workflow_id = workflow_id.clone();
                    async move { self.deps.effects.gateway().add_workflow_step(&workflow_id, step_spec).await.map(Some) }
                })
                .await
                .map(|outcome| outcome.into_executed().flatten());

            match result {
                Ok(Some(summary)) => summaries.push(summary),
                Ok(None) => {}
                Err(err) => failures.push(format!("Could not add step \"{}\": {err}", step.name)),
            }
        }

        let workflow = Workflow {
            id: shell.id,
            name: shell.name.clone(),
            step_count: summaries.len(),
            steps: summaries,
            created_at: shell.created_at,
        };

        let mut response = format!("Created workflow \"{}\" with {} step(s).", workflow.name, workflow.step_count);
        if !failures.is_empty() {
            response = format!("{response} ({})", failures.join("; "));
        }

        let mut updates = ChannelUpdates::new();
        set(&mut updates, ENTITIES, crate::calendar::entity_update(&EntityRef::Workflow(workflow)));
        set(&mut updates, RESPONSE, response);
        set(&mut updates, STEP_FAILURES, failures);
        Ok(NodeResult::update(updates))
    }
}

fn format_response_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let body = render_response(channels);
        let mut updates = ChannelUpdates::new();
        set(&mut updates, RESPONSE, body);
        Ok(NodeResult::update(updates))
    }
}

fn error_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |_channels| Ok(NodeResult::goto("format_response"))
}

pub fn build(deps: Arc<SubgraphDeps>) -> crm_graph::error::Result<crm_graph::compiled::CompiledGraph> {
    register_channels(StateGraph::new())
        .add_sync_node("generate_workflow", generate_workflow_node())
        .add_sync_node("validate", validate_node())
        .add_sync_node("generate_preview", generate_preview_node())
        .add_sync_node("wait_approval", wait_approval_node())
        .add_node("create_workflow", Arc::new(CreateWorkflow { deps }))
        .add_sync_node("format_response", format_response_node())
        .add_sync_node("error", error_node())
        .set_entry_point("generate_workflow")
        .add_edge("generate_workflow", "validate")
        .add_conditional_edge("validate", validate_router)
        .add_edge("generate_preview", "wait_approval")
        .add_edge("wait_approval", "create_workflow")
        .add_edge("create_workflow", "format_response")
        .add_edge("error", "format_response")
        .set_terminal("format_response")
        .compile()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, step_type: &str) -> GeneratedStep {
        GeneratedStep { name: name.to_string(), description: name.to_string(), step_type: step_type.to_string(), assignee: "Advisor".to_string(), day_offset: 0 }
    }

    fn spec_with(n: usize) -> GeneratedWorkflow {
        GeneratedWorkflow {
            name: "Onboarding".to_string(),
            description: "Onboarding".to_string(),
            steps: (0..n).map(|i| step(&format!("Step {i}"), "task")).collect(),
        }
    }

    #[test]
    fn zero_steps_fails_validation() {
        assert!(validate_spec(&spec_with(0)).is_err());
    }

    #[test]
    fn one_step_passes_validation() {
        assert!(validate_spec(&spec_with(1)).is_ok());
    }

    #[test]
    fn twenty_two_steps_passes_validation() {
        assert!(validate_spec(&spec_with(22)).is_ok());
    }

    #[test]
    fn twenty_three_steps_fails_validation() {
        assert!(validate_spec(&spec_with(23)).is_err());
    }

    #[test]
    fn empty_step_name_fails_validation() {
        let mut spec = spec_with(1);
        spec.steps[0].name = "   ".to_string();
        assert!(validate_spec(&spec).is_err());
    }

    #[test]
    fn unknown_step_type_fails_validation() {
        let mut spec = spec_with(1);
        spec.steps[0].step_type = "email".to_string();
        assert!(validate_spec(&spec).is_err());
    }

    #[test]
    fn numbered_instruction_splits_into_steps() {
        let spec = generate_workflow("1. Call the client\n2. Send welcome email\n3. Schedule a meeting after 7 days");
        assert_eq!(spec.steps.len(), 3);
        assert_eq!(spec.steps[0].step_type, "appointment");
        assert_eq!(spec.steps[2].day_offset, 7);
    }

    #[test]
    fn then_separated_instruction_splits_into_steps() {
        let spec = generate_workflow("send the intake form, then schedule a call");
        assert_eq!(spec.steps.len(), 2);
    }
}
