//! The task domain subgraph (§4.I.2).
//!
//! `parse_request -> set_priority -> resolve_assignee ->
//! apply_assignee_resolution -> fetch_tasks -> check_duplicates ->
//! generate_preview -> approval -> create_update_or_complete ->
//! link_contacts -> synthesize_memory -> format_response`. The
//! resolve/apply split mirrors `calendar.rs`'s (a suspending resolver step
//! followed by a statically-edged node that reads the resume channel);
//! unlike the calendar domain, one node covers both a contact and a user
//! assignee since the task state list names a single `resolve_assignee`
//! step rather than splitting it by entity kind.

use crate::calendar::entity_update;
use crate::common::*;
use crate::date::parse_date_query;
use async_trait::async_trait;
use chrono::Utc;
use crm_domain::link::{ActivityType, LinkRequest};
use crm_domain::{
    ApprovalDecision, ApprovalRequest, EntityRef, InterruptValue, Message, OrgId, Preview,
    Priority, Task, TaskStatus, UserId,
};
use crm_gateway::gateway::{TaskFilter, TaskSpec};
use crm_graph::node_result::{ChannelUpdates, Command, NodeResult};
use crm_graph::{ChannelKind, ChannelStore, GraphNode, StateGraph};
use crm_planner::entities::extract_persons;
use crm_resolver::{ContactResolution, ContactResolver, ScoringContext, UserResolution, UserResolver};
use std::sync::Arc;

const INTENT: &str = "intent";
const SUBJECT: &str = "subject";
const PRIORITY: &str = "priority";
const DUE_DATE: &str = "due_date";
const ASSIGNEE_NAME: &str = "assignee_name";
const NEEDS_USER_ASSIGNEE: &str = "needs_user_assignee";
const PENDING_ASSIGNEE_ID: &str = "pending_assignee_id";
const PENDING_ASSIGNEE_IS_USER: &str = "pending_assignee_is_user";
const EXISTING_TASKS: &str = "existing_tasks";
const DUPLICATE_WARNING: &str = "duplicate_warning";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Create,
    Update,
    Complete,
    Unsupported,
}

impl Intent {
    fn as_str(self) -> &'static str {
        match self {
            Intent::Create => "create",
            Intent::Update => "update",
            Intent::Complete => "complete",
            Intent::Unsupported => "unsupported",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "update" => Intent::Update,
            "complete" => Intent::Complete,
            "unsupported" => Intent::Unsupported,
            _ => Intent::Create,
        }
    }
}

fn classify_intent(instruction: &str) -> Intent {
    let lower = instruction.to_lowercase();
    if regex::Regex::new(r"\b(cancel|delete|remove)\b").unwrap().is_match(&lower) {
        Intent::Unsupported
    } else if regex::Regex::new(r"\b(complete|finish|done|mark.*done)\b").unwrap().is_match(&lower) {
        Intent::Complete
    } else if regex::Regex::new(r"\b(update|change|reschedule|edit)\b").unwrap().is_match(&lower) {
        Intent::Update
    } else {
        Intent::Create
    }
}

/// Priority rules, applied in the fixed order §4.I.2 describes: urgency
/// keywords first, then due-date proximity overrides whatever the keyword
/// pass produced (the later rule wins when both fire).
fn compute_priority(instruction: &str, due_date: Option<chrono::DateTime<Utc>>, now: chrono::DateTime<Utc>) -> Priority {
    let lower = instruction.to_lowercase();
    let mut priority = Priority::Normal;

    if regex::Regex::new(r"\b(urgent|asap)\b").unwrap().is_match(&lower) {
        priority = Priority::Urgent;
    } else if regex::Regex::new(r"\b(important|today)\b").unwrap().is_match(&lower) {
        priority = Priority::High;
    } else if lower.contains("whenever") {
        priority = Priority::Low;
    }

    if let Some(due) = due_date {
        let days = (due - now).num_days();
        if days <= 1 {
            priority = Priority::Urgent;
        } else if days <= 3 {
            priority = Priority::High;
        }
    }

    priority
}

fn extract_subject(instruction: &str) -> String {
    let re = regex::Regex::new(r"(?i)\b(?:about|regarding|to discuss)\s+(.+?)(?:[.!?]|$)").unwrap();
    re.captures(instruction)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| instruction.trim().to_string())
}

pub fn register_channels(graph: StateGraph) -> StateGraph {
    register_resolution_channels(register_common_channels(graph))
        .add_channel(INTENT, ChannelKind::LastValue)
        .add_channel(SUBJECT, ChannelKind::LastValue)
        .add_channel(PRIORITY, ChannelKind::LastValue)
        .add_channel(DUE_DATE, ChannelKind::LastValue)
        .add_channel(ASSIGNEE_NAME, ChannelKind::LastValue)
        .add_channel(NEEDS_USER_ASSIGNEE, ChannelKind::LastValue)
        .add_channel(PENDING_ASSIGNEE_ID, ChannelKind::LastValue)
        .add_channel(PENDING_ASSIGNEE_IS_USER, ChannelKind::LastValue)
        .add_channel(EXISTING_TASKS, ChannelKind::LastValue)
        .add_channel(DUPLICATE_WARNING, ChannelKind::LastValue)
}

fn parse_request_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let instruction = get_string(channels, INSTRUCTION).unwrap_or_default();
        let intent = classify_intent(&instruction);
        let subject = extract_subject(&instruction);
        let persons = extract_persons(&instruction);
        let due = parse_date_query(&instruction, Utc::now()).map(|q| q.start);

        let mut updates = ChannelUpdates::new();
        set(&mut updates, INTENT, intent.as_str());
        set(&mut updates, SUBJECT, subject);
        if let Some(due) = due {
            set(&mut updates, DUE_DATE, due);
        }

        if let Some(first) = persons.first() {
            if first.eq_ignore_ascii_case("me") {
                set(&mut updates, NEEDS_USER_ASSIGNEE, true);
            } else {
                set(&mut updates, ASSIGNEE_NAME, first.clone());
            }
        }

        if intent == Intent::Unsupported {
            set(&mut updates, ERROR, "Validation: action is not supported for tasks.");
        } else if matches!(intent, Intent::Update | Intent::Complete)
            && channels.try_get_json(ENTITIES).and_then(|v| v.get("task").cloned()).is_none()
        {
            set(&mut updates, ERROR, format!("No task found to {}.", intent.as_str()));
        }

        Ok(NodeResult::update(updates))
    }
}

fn parse_request_router(channels: &ChannelStore) -> String {
    if get_string(channels, ERROR).is_some() {
        "error".to_string()
    } else {
        "set_priority".to_string()
    }
}

fn set_priority_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let instruction = get_string(channels, INSTRUCTION).unwrap_or_default();
        let due: Option<chrono::DateTime<Utc>> = get(channels, DUE_DATE);
        let priority = compute_priority(&instruction, due, Utc::now());
        let mut updates = ChannelUpdates::new();
        set(&mut updates, PRIORITY, priority);
        Ok(NodeResult::update(updates))
    }
}

struct ResolveAssignee {
    deps: Arc<SubgraphDeps>,
}

#[async_trait]
impl GraphNode for ResolveAssignee {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let needs_user = get_bool(channels, NEEDS_USER_ASSIGNEE);
        let name = get_string(channels, ASSIGNEE_NAME);
        let session_id = get_string(channels, SESSION_ID).unwrap_or_default();

        if needs_user {
            let resolver = UserResolver::new(self.deps.users.as_ref());
            match resolver.resolve_me().await {
                Ok(user) => {
                    let mut updates = ChannelUpdates::new();
                    set(&mut updates, PENDING_ASSIGNEE_ID, user.id.clone());
                    set(&mut updates, PENDING_ASSIGNEE_IS_USER, true);
                    set(&mut updates, ENTITIES, entity_update(&EntityRef::User(user)));
                    return Ok(NodeResult::update(updates));
                }
                Err(err) => return Ok(error_command(format!("Could not resolve the current user: {err}"))),
            }
        }

        let Some(name) = name else {
            return Ok(NodeResult::update(ChannelUpdates::new()));
        };

        let resolver = ContactResolver::new(self.deps.contacts.as_ref());
        let context = ScoringContext::new(name.clone());
        let mut caches = self.deps.caches.lock().await;
        let cache = caches.cache_for(&session_id);

        let resolution = resolver
            .resolve(&name, &context, cache)
            .await
            .map_err(|err| crm_graph::error::GraphError::Execution(err.to_string()))?;

        match resolution {
            ContactResolution::Resolved(scored) => {
                let mut updates = ChannelUpdates::new();
                set(&mut updates, PENDING_ASSIGNEE_ID, scored.candidate.id.clone());
                set(&mut updates, PENDING_ASSIGNEE_IS_USER, false);
                Ok(NodeResult::update(updates))
            }
            ContactResolution::Disambiguation(disambiguation) => {
                let interrupt = InterruptValue::ContactDisambiguation(disambiguation);
                Ok(NodeResult::suspend(serde_json::to_value(&interrupt).expect("interrupt values serialize"), ChannelUpdates::new()))
            }
            ContactResolution::Clarification(clarification) => {
                let interrupt = InterruptValue::ContactClarification(clarification);
                Ok(NodeResult::suspend(serde_json::to_value(&interrupt).expect("interrupt values serialize"), ChannelUpdates::new()))
            }
        }
    }
}

struct ApplyAssigneeResolution {
    deps: Arc<SubgraphDeps>,
}

#[async_trait]
impl GraphNode for ApplyAssigneeResolution {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let mut updates = ChannelUpdates::new();

        if channels.try_get_json(ENTITIES).and_then(|v| v.get("contact").cloned()).is_some()
            || channels.try_get_json(ENTITIES).and_then(|v| v.get("user").cloned()).is_some()
        {
            return Ok(NodeResult::update(updates));
        }

        let id = if let Some(id) = get_string(channels, PENDING_ASSIGNEE_ID) {
            Some(id)
        } else {
            get::<crm_domain::Selection>(channels, CONTACT_DISAMBIGUATION_RESPONSE).map(|s| s.id)
        };

        if let Some(id) = id {
            match self.deps.effects.read("contacts.get", "contact_get", || self.deps.effects.gateway().get_contact(&id)).await {
                Ok(contact) => set(&mut updates, ENTITIES, entity_update(&EntityRef::Contact(contact))),
                Err(_) => set(&mut updates, DUPLICATE_WARNING, serde_json::Value::Null),
            }
        }

        Ok(NodeResult::update(updates))
    }
}

fn after_resolution_router(channels: &ChannelStore) -> String {
    if get_string(channels, ERROR).is_some() {
        "error".to_string()
    } else {
        "fetch_tasks".to_string()
    }
}

struct FetchTasks {
    deps: Arc<SubgraphDeps>,
}

#[async_trait]
impl GraphNode for FetchTasks {
    async fn run(&self, _channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        match self.deps.effects.read("tasks.list", "tasks_list", || self.deps.effects.gateway().list_tasks(TaskFilter::default())).await {
            Ok(tasks) => {
                let mut updates = ChannelUpdates::new();
                set(&mut updates, EXISTING_TASKS, &tasks);
                Ok(NodeResult::update(updates))
            }
            Err(err) => Ok(error_command(format!("Could not load existing tasks: {err}"))),
        }
    }
}

fn check_duplicates_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let subject = get_string(channels, SUBJECT).unwrap_or_default();
        let existing: Vec<Task> = get(channels, EXISTING_TASKS).unwrap_or_default();
        let lower_subject = subject.to_lowercase();

        let duplicate = existing.iter().find(|t| {
            let existing_lower = t.subject.to_lowercase();
            existing_lower.contains(&lower_subject) || lower_subject.contains(&existing_lower)
        });

        let mut updates = ChannelUpdates::new();
        if let Some(task) = duplicate {
            set(&mut updates, DUPLICATE_WARNING, format!("A similar open task already exists: \"{}\".", task.subject));
        }
        Ok(NodeResult::update(updates))
    }
}

fn generate_preview_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let intent = Intent::from_str(&get_string(channels, INTENT).unwrap_or_default());
        let subject = get_string(channels, SUBJECT).unwrap_or_else(|| "(untitled)".to_string());
        let priority: Priority = get(channels, PRIORITY).unwrap_or(Priority::Normal);
        let thread_id = get_string(channels, THREAD_ID).unwrap_or_default();

        let mut preview = Preview::new("task", intent.as_str(), subject.clone())
            .with_detail("subject", subject.clone())
            .with_detail("priority", format!("{priority:?}"));

        if let Some(due) = get::<chrono::DateTime<Utc>>(channels, DUE_DATE) {
            preview = preview.with_detail("due", due.to_rfc3339());
        }
        if let Some(warning) = get_string(channels, DUPLICATE_WARNING) {
            preview = preview.with_warning(warning);
        }

        let request = ApprovalRequest::new(
            "task",
            preview,
            serde_json::json!({"intent": intent.as_str(), "subject": subject}),
            format!("{} this task?", match intent { Intent::Complete => "Complete", Intent::Update => "Update", _ => "Create" }),
            thread_id,
        );

        let mut updates = ChannelUpdates::new();
        set(&mut updates, REQUIRES_APPROVAL, true);
        set(&mut updates, APPROVAL_REQUEST, &request);
        Ok(NodeResult::update(updates))
    }
}

fn approval_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let request: ApprovalRequest = get(channels, APPROVAL_REQUEST).expect("generate_preview always sets approvalRequest");
        let interrupt = InterruptValue::ApprovalRequired(request);
        Ok(NodeResult::suspend(serde_json::to_value(&interrupt).expect("interrupt values serialize"), ChannelUpdates::new()))
    }
}

struct CreateUpdateOrComplete {
    deps: Arc<SubgraphDeps>,
}

#[async_trait]
impl GraphNode for CreateUpdateOrComplete {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let decision: Option<ApprovalDecision> = get(channels, APPROVAL_DECISION);
        if !decision.map(|d| d.is_approved()).unwrap_or(false) {
            let mut updates = ChannelUpdates::new();
            set(&mut updates, RESPONSE, "The request was not approved; no changes were made.");
            return Ok(NodeResult::Command(Command::new().with_update(updates).with_goto("format_response")));
        }

        let intent = Intent::from_str(&get_string(channels, INTENT).unwrap_or_default());
        let subject = get_string(channels, SUBJECT).unwrap_or_else(|| "(untitled)".to_string());
        let priority: Priority = get(channels, PRIORITY).unwrap_or(Priority::Normal);
        let due: Option<chrono::DateTime<Utc>> = get(channels, DUE_DATE);

        let existing_id = || {
            channels
                .try_get_json(ENTITIES)
                .and_then(|v| v.get("task").cloned())
                .and_then(|v| v.get("id").and_then(|id| id.as_str().map(str::to_string)))
                .unwrap_or_default()
        };

        let result = match intent {
            Intent::Complete => {
                let id = existing_id();
                let payload = serde_json::json!({"op": "complete_task", "id": id});
                self.deps
                    .effects
                    .write("tasks.complete", "tasks_write", payload, || {
                        let id = id.clone();
                        async move { self.deps.effects.gateway().complete_task(&id).await }
                    })
                    .await
            }
            Intent::Update => {
                let id = existing_id();
                let spec = TaskSpec { subject: subject.clone(), priority, due_date: due };
                let payload = serde_json::to_value(&spec).unwrap();
                self.deps
                    .effects
                    .write("tasks.update", "tasks_write", payload, || {
                        let spec = spec.clone();
                        let id = id.clone();
                        async move { self.deps.effects.gateway().update_task(&id, spec).await }
                    })
                    .await
            }
            _ => {
                let spec = TaskSpec { subject: subject.clone(), priority, due_date: due };
                let payload = serde_json::to_value(&spec).unwrap();
                self.deps
                    .effects
                    .write("tasks.create", "tasks_write", payload, || {
                        let spec = spec.clone();
                        async move { self.deps.effects.gateway().create_task(spec).await }
                    })
                    .await
            }
        };

        match result.map(|outcome| outcome.into_executed()) {
            Ok(Some(task)) => {
                let mut updates = ChannelUpdates::new();
                set(&mut updates, ENTITIES, entity_update(&EntityRef::Task(task)));
                set(&mut updates, RESPONSE, format!("{} task \"{}\".", verb(intent), subject));
                Ok(NodeResult::Command(Command::new().with_update(updates).with_goto("link_contacts")))
            }
            Ok(None) => {
                let mut updates = ChannelUpdates::new();
                set(&mut updates, RESPONSE, format!("Duplicate request for task \"{subject}\" was skipped."));
                Ok(NodeResult::Command(Command::new().with_update(updates).with_goto("synthesize_memory")))
            }
            Err(err) => Ok(error_command(format!("Could not {} the task: {err}", intent.as_str()))),
        }
    }
}

fn verb(intent: Intent) -> &'static str {
    match intent {
        Intent::Create => "Created",
        Intent::Update => "Updated",
        Intent::Complete => "Completed",
        Intent::Unsupported => "Skipped",
    }
}

struct LinkContacts {
    deps: Arc<SubgraphDeps>,
}

#[async_trait]
impl GraphNode for LinkContacts {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let task_id = channels
            .try_get_json(ENTITIES)
            .and_then(|v| v.get("task").cloned())
            .and_then(|v| v.get("id").and_then(|id| id.as_str().map(str::to_string)))
            .unwrap_or_default();

        let mut warnings = Vec::new();
        if let Some(entities) = channels.try_get_json(ENTITIES) {
            for (key, is_user) in [("contact", false), ("user", true)] {
                if let Some(entity) = entities.get(key) {
                    if let Some(id) = entity.get("id").and_then(|v| v.as_str()) {
                        let request = LinkRequest::new(ActivityType::Task, task_id.clone(), is_user, id);
                        let payload = serde_json::to_value(&request).unwrap();
                        let result = self
                            .deps
                            .effects
                            .write("relations.link", "contact_linking", payload, || {
                                let request = request.clone();
                                async move { self.deps.effects.gateway().link_relation(&request).await }
                            })
                            .await;
                        if result.is_err() {
                            warnings.push(format!("Could not link {key} to the task."));
                        }
                    }
                }
            }
        }

        let mut updates = ChannelUpdates::new();
        if !warnings.is_empty() {
            let response = get_string(channels, RESPONSE).unwrap_or_default();
            set(&mut updates, RESPONSE, format!("{response} ({})", warnings.join("; ")));
        }
        Ok(NodeResult::update(updates))
    }
}

struct SynthesizeMemory {
    deps: Arc<SubgraphDeps>,
}

#[async_trait]
impl GraphNode for SynthesizeMemory {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let org_id = OrgId::from(get_string(channels, ORG_ID).unwrap_or_default());
        let user_id = UserId::from(get_string(channels, USER_ID).unwrap_or_default());
        let response = get_string(channels, RESPONSE).unwrap_or_default();
        let messages = vec![Message::assistant(response)];
        crm_memory::synthesize(self.deps.memory.as_ref(), &messages, &org_id, &user_id, Some(serde_json::json!({"domain": "task"}))).await;
        Ok(NodeResult::update(ChannelUpdates::new()))
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
    let graph = register_channels(StateGraph::new())
        .add_sync_node("parse_request", parse_request_node())
        .add_sync_node("set_priority", set_priority_node())
        .add_node("resolve_assignee", Arc::new(ResolveAssignee { deps: deps.clone() }))
        .add_node("apply_assignee_resolution", Arc::new(ApplyAssigneeResolution { deps: deps.clone() }))
        .add_node("fetch_tasks", Arc::new(FetchTasks { deps: deps.clone() }))
        .add_sync_node("check_duplicates", check_duplicates_node())
        .add_sync_node("generate_preview", generate_preview_node())
        .add_sync_node("approval", approval_node())
        .add_node("create_update_or_complete", Arc::new(CreateUpdateOrComplete { deps: deps.clone() }))
        .add_node("link_contacts", Arc::new(LinkContacts { deps: deps.clone() }))
        .add_node("synthesize_memory", Arc::new(SynthesizeMemory { deps }))
        .add_sync_node("format_response", format_response_node())
        .add_sync_node("error", error_node())
        .set_entry_point("parse_request")
        .add_conditional_edge("parse_request", parse_request_router)
        .add_edge("set_priority", "resolve_assignee")
        .add_edge("resolve_assignee", "apply_assignee_resolution")
        .add_conditional_edge("apply_assignee_resolution", after_resolution_router)
        .add_edge("check_duplicates", "generate_preview")
        .add_edge("generate_preview", "approval")
        .add_edge("approval", "create_update_or_complete")
        .add_edge("link_contacts", "synthesize_memory")
        .add_edge("synthesize_memory", "format_response")
        .add_edge("error", "format_response")
        .set_terminal("format_response");

    // `create_update_or_complete` always overrides its destination via
    // `Command::goto`; it needs a registered edge only to satisfy
    // `StateGraph::compile`'s "every non-terminal node has an edge" check.
    let graph = graph.add_edge("fetch_tasks", "check_duplicates").add_edge("create_update_or_complete", "link_contacts");

    graph.compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn classifies_intents_in_fixed_order() {
        assert_eq!(classify_intent("cancel this task"), Intent::Unsupported);
        assert_eq!(classify_intent("mark it done"), Intent::Complete);
        assert_eq!(classify_intent("update the due date"), Intent::Update);
        assert_eq!(classify_intent("create a follow-up task"), Intent::Create);
    }

    #[test]
    fn urgent_keyword_sets_urgent_priority() {
        let now = Utc::now();
        assert_eq!(compute_priority("follow up asap", None, now), Priority::Urgent);
        assert_eq!(compute_priority("send the whenever you can", None, now), Priority::Low);
    }

    #[test]
    fn due_date_proximity_overrides_keyword_priority() {
        let now = Utc::now();
        let due_soon = now + Duration::hours(12);
        // "whenever" alone would be Low, but a due date tomorrow-or-sooner wins.
        assert_eq!(compute_priority("whenever you get a chance", Some(due_soon), now), Priority::Urgent);
    }

    #[test]
    fn duplicate_detection_is_case_insensitive_substring() {
        let existing = vec![Task {
            id: "t-1".to_string(),
            subject: "Follow up with Jane".to_string(),
            priority: Priority::Normal,
            due_date: None,
            status: TaskStatus::Open,
            created_at: Utc::now(),
        }];
        let lower_new = "follow up".to_string();
        assert!(existing.iter().any(|t| t.subject.to_lowercase().contains(&lower_new)));
    }
}
