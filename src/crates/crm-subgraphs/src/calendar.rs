//! The calendar domain subgraph (§4.I.1).
//!
//! `parse_request -> {resolve_contacts|resolve_users|fetch_appointments|error}
//! -> check_conflicts -> generate_preview -> approval -> create_or_update ->
//! link_attendees -> synthesize_memory -> format_response`. Grounded on
//! `crm-graph`'s own `StateGraph`/`Command` usage in
//! `langgraph-core/examples/conditional_routing.rs` and
//! `inline_interrupt_demo.rs` — a resolver step that may suspend, followed by
//! a static-edged node that finishes applying whatever the suspend left
//! half-done, is exactly that demo's shape generalized to contacts/users.

use crate::common::*;
use crate::date::parse_date_query;
use async_trait::async_trait;
use chrono::Utc;
use crm_domain::link::{ActivityType, LinkRequest};
use crm_domain::{
    ApprovalDecision, ApprovalRequest, Appointment, EntityRef, InterruptValue, Message, OrgId,
    Preview, UserId,
};
use crm_gateway::gateway::{AppointmentFilter, AppointmentSpec};
use crm_graph::node_result::{ChannelUpdates, Command, NodeResult};
use crm_graph::{ChannelKind, ChannelStore, GraphNode, StateGraph};
use crm_resolver::{ContactResolution, ContactResolver, ScoringContext, UserSearch};
use std::sync::Arc;

const PENDING_CONTACTS: &str = "pending_contact_names";
const PENDING_CONTACT_ID: &str = "pending_contact_id";
const RESOLVED_CONTACTS: &str = "resolved_contacts";
const SUBJECT: &str = "subject";
const PARTICIPANT_NAMES: &str = "participant_names";
const NEEDS_USER: &str = "needs_user";
const DATE_QUERY: &str = "date_query";
const EXISTING_APPOINTMENTS: &str = "existing_appointments";
const CONFLICTS: &str = "conflicts";
const UNRESOLVED_PARTICIPANTS: &str = "unresolved_participants";
const INTENT: &str = "intent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    View,
    Create,
    Update,
    Delete,
    /// A short follow-up to a prior turn whose recalled memory shows a
    /// failed resolution (§4.I.1: "Detects 'correction' by inspecting
    /// recent memory for `Could not find …` and short follow-ups"). Routes
    /// through the same resolve/approval/create path as `Create` — the
    /// only difference is how `parse_request` extracts the attendee name
    /// (the whole follow-up, since it rarely carries a `with`/`for` clause).
    Correction,
}

impl Intent {
    fn as_str(self) -> &'static str {
        match self {
            Intent::View => "view",
            Intent::Create => "create",
            Intent::Update => "update",
            Intent::Delete => "delete",
            Intent::Correction => "correction",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "update" => Intent::Update,
            "delete" => Intent::Delete,
            "view" => Intent::View,
            "correction" => Intent::Correction,
            _ => Intent::Create,
        }
    }
}

/// A short follow-up (≤4 words) arriving while recalled memory still shows
/// a failed resolution reads as a correction of that failure rather than a
/// new request.
fn looks_like_correction(instruction: &str, memory_context: &str) -> bool {
    let word_count = instruction.split_whitespace().count();
    word_count > 0 && word_count <= 4 && memory_context.to_lowercase().contains("could not find")
}

fn classify_intent(instruction: &str, memory_context: &str) -> Intent {
    if looks_like_correction(instruction, memory_context) {
        return Intent::Correction;
    }
    let lower = instruction.to_lowercase();
    if regex::Regex::new(r"\b(cancel|delete|remove)\b").unwrap().is_match(&lower) {
        Intent::Delete
    } else if regex::Regex::new(r"\b(reschedule|move|update|change)\b").unwrap().is_match(&lower) {
        Intent::Update
    } else if regex::Regex::new(r"\b(what's|whats|show|list|view)\b").unwrap().is_match(&lower) {
        Intent::View
    } else {
        Intent::Create
    }
}

/// The corrected attendee name for a short follow-up that carries no
/// explicit `with`/`for` clause — the whole instruction, punctuation
/// trimmed, is the name itself (e.g. "Jane Doe" after "Could not find Jon").
fn extract_correction_name(instruction: &str) -> Option<String> {
    let cleaned = instruction.trim().trim_end_matches(['.', '!', '?']).trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Every `with`/`for` person mention, split into the contact names to
/// resolve and whether a self-reference ("me"/"myself") was also present.
/// Shares `crm_planner::entities::extract_persons`'s conjunction-aware
/// extraction so "with John and Jane" resolves (and links) both attendees,
/// not just the first.
fn extract_participants(instruction: &str) -> (Vec<String>, bool) {
    let mut names = Vec::new();
    let mut needs_user = false;
    for name in crm_planner::entities::extract_persons(instruction) {
        if crm_resolver::is_self_reference(&name) {
            needs_user = true;
        } else {
            names.push(name);
        }
    }
    (names, needs_user)
}

fn extract_subject(instruction: &str) -> String {
    let re = regex::Regex::new(r"(?i)\b(?:about|regarding|called|titled)\s+(.+?)(?:[.!?]|$)").unwrap();
    re.captures(instruction)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| instruction.trim().to_string())
}

pub fn register_channels(graph: StateGraph) -> StateGraph {
    register_resolution_channels(register_common_channels(graph))
        .add_channel(INTENT, ChannelKind::LastValue)
        .add_channel(SUBJECT, ChannelKind::LastValue)
        .add_channel(PARTICIPANT_NAMES, ChannelKind::LastValue)
        .add_channel(NEEDS_USER, ChannelKind::LastValue)
        .add_channel(PENDING_CONTACTS, ChannelKind::LastValue)
        .add_channel(PENDING_CONTACT_ID, ChannelKind::LastValue)
        .add_channel(RESOLVED_CONTACTS, ChannelKind::LastValue)
        .add_channel(DATE_QUERY, ChannelKind::LastValue)
        .add_channel(EXISTING_APPOINTMENTS, ChannelKind::LastValue)
        .add_channel(CONFLICTS, ChannelKind::LastValue)
        .add_channel(UNRESOLVED_PARTICIPANTS, ChannelKind::LastValue)
}

fn parse_request_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let instruction = get_string(channels, INSTRUCTION).unwrap_or_default();
        let memory_context = get_string(channels, MEMORY_CONTEXT).unwrap_or_default();
        let intent = classify_intent(&instruction, &memory_context);
        let (mut participants, mut needs_user) = extract_participants(&instruction);
        if intent == Intent::Correction && participants.is_empty() && !needs_user {
            if let Some(name) = extract_correction_name(&instruction) {
                if crm_resolver::is_self_reference(&name) {
                    needs_user = true;
                } else {
                    participants.push(name);
                }
            }
        }
        let subject = extract_subject(&instruction);
        let date_query = parse_date_query(&instruction, Utc::now());

        let mut updates = ChannelUpdates::new();
        set(&mut updates, INTENT, intent.as_str());
        set(&mut updates, SUBJECT, subject);
        set(&mut updates, PARTICIPANT_NAMES, participants.clone());
        set(&mut updates, NEEDS_USER, needs_user);
        if let Some(dq) = date_query {
            set(
                &mut updates,
                DATE_QUERY,
                serde_json::json!({"start": dq.start, "end": dq.end, "has_time": dq.has_time}),
            );
        }

        let needs_existing = matches!(intent, Intent::Update | Intent::Delete);
        if needs_existing && channels.try_get_json(ENTITIES).and_then(|v| v.get("appointment").cloned()).is_none() {
            set(&mut updates, ERROR, "No appointment found to modify.");
        } else if !participants.is_empty() {
            set(&mut updates, PENDING_CONTACTS, participants);
        }

        Ok(NodeResult::update(updates))
    }
}

fn parse_request_router(channels: &ChannelStore) -> String {
    if get_string(channels, ERROR).is_some() {
        return "error".to_string();
    }
    let needs_user = get_bool(channels, NEEDS_USER);
    let has_user_entity = channels.try_get_json(ENTITIES).and_then(|v| v.get("user").cloned()).is_some();
    if needs_user && !has_user_entity {
        return "resolve_users".to_string();
    }
    let pending: Vec<String> = get(channels, PENDING_CONTACTS).unwrap_or_default();
    if !pending.is_empty() {
        return "resolve_contacts".to_string();
    }
    "fetch_appointments".to_string()
}

struct ResolveContacts {
    deps: Arc<SubgraphDeps>,
}

#[async_trait]
impl GraphNode for ResolveContacts {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let queue: Vec<String> = get(channels, PENDING_CONTACTS).unwrap_or_default();
        let name = queue.first().cloned().unwrap_or_default();
        let session_id = get_string(channels, SESSION_ID).unwrap_or_default();
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
                set(&mut updates, PENDING_CONTACT_ID, scored.candidate.id.clone());
                Ok(NodeResult::update(updates))
            }
            ContactResolution::Disambiguation(disambiguation) => {
                let interrupt = InterruptValue::ContactDisambiguation(disambiguation);
                Ok(NodeResult::suspend(
                    serde_json::to_value(&interrupt).expect("interrupt values serialize"),
                    ChannelUpdates::new(),
                ))
            }
            ContactResolution::Clarification(clarification) => {
                let interrupt = InterruptValue::ContactClarification(clarification);
                Ok(NodeResult::suspend(
                    serde_json::to_value(&interrupt).expect("interrupt values serialize"),
                    ChannelUpdates::new(),
                ))
            }
        }
    }
}

struct ApplyContactResolution {
    deps: Arc<SubgraphDeps>,
}

/// Records a contact resolved for one name in the participant queue: folds
/// it into the shared `entities.contact` latest-pointer (last one applied
/// wins, per §3's single-latest-per-type semantics) and appends it to the
/// `resolved_contacts` accumulator that `create_or_update`/`link_attendees`
/// read from to reach every attendee, not just the most recent one.
fn record_resolved_contact(channels: &ChannelStore, updates: &mut ChannelUpdates, contact: crm_domain::Contact) {
    set(updates, ENTITIES, entity_update(&EntityRef::Contact(contact.clone())));
    let mut resolved: Vec<crm_domain::Contact> = get(channels, RESOLVED_CONTACTS).unwrap_or_default();
    resolved.push(contact);
    set(updates, RESOLVED_CONTACTS, resolved);
}

/// Pops the name at the front of the pending-contacts queue (the one this
/// resolution cycle just handled) and writes the remainder back so the next
/// pass through `resolve_contacts` picks up the next participant, or the
/// graph moves on once the queue is empty.
fn pop_pending_contact(channels: &ChannelStore, updates: &mut ChannelUpdates) -> String {
    let mut queue: Vec<String> = get(channels, PENDING_CONTACTS).unwrap_or_default();
    let current = if queue.is_empty() { String::new() } else { queue.remove(0) };
    set(updates, PENDING_CONTACTS, queue);
    current
}

#[async_trait]
impl GraphNode for ApplyContactResolution {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let mut updates = ChannelUpdates::new();
        let current_name = pop_pending_contact(channels, &mut updates);

        let contact_id: Option<String> = if let Some(id) = get_string(channels, PENDING_CONTACT_ID) {
            Some(id)
        } else if let Some(selection) = get::<crm_domain::Selection>(channels, CONTACT_DISAMBIGUATION_RESPONSE) {
            Some(selection.id)
        } else {
            None
        };

        if let Some(id) = contact_id {
            match self
                .deps
                .effects
                .read("contacts.get", "contact_get", || self.deps.effects.gateway().get_contact(&id))
                .await
            {
                Ok(contact) => record_resolved_contact(channels, &mut updates, contact),
                Err(_) => {
                    let mut unresolved: Vec<String> = get(channels, UNRESOLVED_PARTICIPANTS).unwrap_or_default();
                    unresolved.push(current_name);
                    set(&mut updates, UNRESOLVED_PARTICIPANTS, unresolved);
                }
            }
        } else if let Some(clarification) = get::<ClarificationResume>(channels, CONTACT_CLARIFICATION_RESPONSE) {
            if clarification.skip {
                let mut unresolved: Vec<String> = get(channels, UNRESOLVED_PARTICIPANTS).unwrap_or_default();
                unresolved.push(current_name);
                set(&mut updates, UNRESOLVED_PARTICIPANTS, unresolved);
            } else {
                let session_id = get_string(channels, SESSION_ID).unwrap_or_default();
                let resolver = ContactResolver::new(self.deps.contacts.as_ref());
                let context = ScoringContext::new(clarification.clarified_name.clone());
                let mut caches = self.deps.caches.lock().await;
                let cache = caches.cache_for(&session_id);
                if let Ok(ContactResolution::Resolved(scored)) =
                    resolver.resolve(&clarification.clarified_name, &context, cache).await
                {
                    if let Ok(contact) = self
                        .deps
                        .effects
                        .read("contacts.get", "contact_get", || self.deps.effects.gateway().get_contact(&scored.candidate.id))
                        .await
                    {
                        record_resolved_contact(channels, &mut updates, contact);
                    }
                }
            }
        }

        Ok(NodeResult::update(updates))
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct ClarificationResume {
    clarified_name: String,
    #[serde(default)]
    skip: bool,
}

struct ResolveUsers {
    deps: Arc<SubgraphDeps>,
}

#[async_trait]
impl GraphNode for ResolveUsers {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let _ = channels;
        match self.deps.users.current_user().await {
            Ok(user) => {
                let mut updates = ChannelUpdates::new();
                set(&mut updates, ENTITIES, entity_update(&EntityRef::User(user)));
                Ok(NodeResult::update(updates))
            }
            Err(_) => Ok(error_command("Could not resolve the current user.")),
        }
    }
}

struct ApplyUserResolution;

#[async_trait]
impl GraphNode for ApplyUserResolution {
    async fn run(&self, _channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        Ok(NodeResult::update(ChannelUpdates::new()))
    }
}

/// Routes onward after either resolver finishes applying one name. Loops
/// back to `resolve_contacts` while the participant queue still has names
/// left (so "with John and Jane" resolves and links both, one suspend/
/// resume cycle per name), otherwise proceeds to `fetch_appointments`.
fn after_resolution_router(channels: &ChannelStore) -> String {
    if get_string(channels, ERROR).is_some() {
        return "error".to_string();
    }
    let pending: Vec<String> = get(channels, PENDING_CONTACTS).unwrap_or_default();
    if !pending.is_empty() {
        return "resolve_contacts".to_string();
    }
    "fetch_appointments".to_string()
}

struct FetchAppointments {
    deps: Arc<SubgraphDeps>,
}

#[async_trait]
impl GraphNode for FetchAppointments {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let intent = Intent::from_str(&get_string(channels, INTENT).unwrap_or_else(|| "create".to_string()));

        let (from, to) = match get::<serde_json::Value>(channels, DATE_QUERY) {
            Some(value) => (
                serde_json::from_value(value["start"].clone()).unwrap_or_else(|_| Utc::now()),
                serde_json::from_value(value["end"].clone()).unwrap_or_else(|_| Utc::now() + chrono::Duration::days(1)),
            ),
            None => (Utc::now(), Utc::now() + chrono::Duration::days(1)),
        };

        let filter = AppointmentFilter { from, to, include_attendees: true, include_extended: false };
        match self
            .deps
            .effects
            .read("appointments.list", "appointments_list", || self.deps.effects.gateway().list_appointments(filter.clone()))
            .await
        {
            Ok(appointments) => {
                let mut updates = ChannelUpdates::new();
                set(&mut updates, EXISTING_APPOINTMENTS, &appointments);
                if intent == Intent::View {
                    let body = if appointments.is_empty() {
                        "You have no appointments in that window.".to_string()
                    } else {
                        let lines: Vec<String> = appointments.iter().map(|a| format!("- {} at {}", a.subject, a.start_time)).collect();
                        format!("Here is what's on the calendar:\n{}", lines.join("\n"))
                    };
                    set(&mut updates, RESPONSE, body);
                    return Ok(NodeResult::Command(Command::new().with_update(updates).with_goto("format_response")));
                }
                Ok(NodeResult::update(updates))
            }
            Err(err) => Ok(error_command(format!("Could not load existing appointments: {err}"))),
        }
    }
}

fn overlaps(new_start: chrono::DateTime<Utc>, new_end: chrono::DateTime<Utc>, existing: &Appointment) -> bool {
    new_start < existing.end_time && new_end > existing.start_time
}

fn check_conflicts_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let existing: Vec<Appointment> = get(channels, EXISTING_APPOINTMENTS).unwrap_or_default();
        let (start, end) = match get::<serde_json::Value>(channels, DATE_QUERY) {
            Some(value) => (
                serde_json::from_value(value["start"].clone()).unwrap_or_else(|_| Utc::now()),
                serde_json::from_value(value["end"].clone()).unwrap_or_else(|_| Utc::now() + chrono::Duration::hours(1)),
            ),
            None => (Utc::now(), Utc::now() + chrono::Duration::hours(1)),
        };

        let conflicts: Vec<String> = existing
            .iter()
            .filter(|a| overlaps(start, end, a))
            .map(|a| format!("{} ({} - {})", a.subject, a.start_time, a.end_time))
            .collect();

        let mut updates = ChannelUpdates::new();
        set(&mut updates, CONFLICTS, conflicts);
        Ok(NodeResult::update(updates))
    }
}

fn generate_preview_node() -> impl Fn(&ChannelStore) -> crm_graph::error::Result<NodeResult> {
    |channels| {
        let intent = Intent::from_str(&get_string(channels, INTENT).unwrap_or_default());
        let subject = get_string(channels, SUBJECT).unwrap_or_else(|| "(untitled)".to_string());
        let thread_id = get_string(channels, THREAD_ID).unwrap_or_default();
        let conflicts: Vec<String> = get(channels, CONFLICTS).unwrap_or_default();
        let unresolved: Vec<String> = get(channels, UNRESOLVED_PARTICIPANTS).unwrap_or_default();

        let mut preview = Preview::new("appointment", intent.as_str(), subject.clone()).with_detail("subject", subject.clone());
        if let Some(value) = get::<serde_json::Value>(channels, DATE_QUERY) {
            preview = preview.with_detail("when", value["start"].as_str().unwrap_or_default());
        }
        for conflict in &conflicts {
            preview = preview.with_warning(format!("Conflicts with existing appointment: {conflict}"));
        }
        for name in &unresolved {
            preview = preview.with_warning(format!("Could not resolve attendee: {name}"));
        }

        let request = ApprovalRequest::new(
            "calendar",
            preview,
            serde_json::json!({"intent": intent.as_str(), "subject": subject}),
            format!("{} this appointment?", match intent { Intent::Delete => "Cancel", Intent::Update => "Update", _ => "Create" }),
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
        Ok(NodeResult::suspend(
            serde_json::to_value(&interrupt).expect("interrupt values serialize"),
            ChannelUpdates::new(),
        ))
    }
}

struct CreateOrUpdate {
    deps: Arc<SubgraphDeps>,
}

/// Every resolved attendee's display name — all contacts resolved off the
/// participant queue, plus the resolved user, not just the single most
/// recent contact the `entities` channel's latest-pointer holds.
fn resolved_participants(channels: &ChannelStore) -> Vec<String> {
    let mut names: Vec<String> = get::<Vec<crm_domain::Contact>>(channels, RESOLVED_CONTACTS)
        .unwrap_or_default()
        .into_iter()
        .map(|c| c.name)
        .collect();
    if let Some(entities) = channels.try_get_json(ENTITIES) {
        if let Some(user) = entities.get("user") {
            if let Some(name) = user.get("name").and_then(|v| v.as_str()) {
                names.push(name.to_string());
            }
        }
    }
    names
}

#[async_trait]
impl GraphNode for CreateOrUpdate {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let decision: Option<ApprovalDecision> = get(channels, APPROVAL_DECISION);
        if !decision.map(|d| d.is_approved()).unwrap_or(false) {
            let mut updates = ChannelUpdates::new();
            set(&mut updates, RESPONSE, "The request was not approved; no changes were made.");
            return Ok(NodeResult::Command(Command::new().with_update(updates).with_goto("format_response")));
        }

        let intent = Intent::from_str(&get_string(channels, INTENT).unwrap_or_default());
        let subject = get_string(channels, SUBJECT).unwrap_or_else(|| "(untitled)".to_string());
        let participants = resolved_participants(channels);
        let (start, end) = match get::<serde_json::Value>(channels, DATE_QUERY) {
            Some(value) => (
                serde_json::from_value(value["start"].clone()).unwrap_or_else(|_| Utc::now()),
                serde_json::from_value(value["end"].clone()).unwrap_or_else(|_| Utc::now() + chrono::Duration::hours(1)),
            ),
            None => (Utc::now(), Utc::now() + chrono::Duration::hours(1)),
        };

        let spec = AppointmentSpec { subject: subject.clone(), start_time: start, end_time: end, location: None, participants: participants.clone() };

        let result = match intent {
            Intent::Delete => {
                let existing = channels.try_get_json(ENTITIES).and_then(|v| v.get("appointment").cloned());
                let id = existing.and_then(|v| v.get("id").and_then(|id| id.as_str().map(str::to_string))).unwrap_or_default();
                let payload = serde_json::json!({"op": "delete_appointment", "id": id});
                self.deps
                    .effects
                    .write("appointments.delete", "appointments_write", payload, || {
                        let id = id.clone();
                        async move { self.deps.effects.gateway().delete_appointment(&id).await.map(|_| None) }
                    })
                    .await
                    .map(|outcome| outcome.into_executed().flatten())
            }
            Intent::Update => {
                let existing = channels.try_get_json(ENTITIES).and_then(|v| v.get("appointment").cloned());
                let id = existing.and_then(|v| v.get("id").and_then(|id| id.as_str().map(str::to_string))).unwrap_or_default();
                let payload = serde_json::to_value(&spec).unwrap();
                self.deps
                    .effects
                    .write("appointments.update", "appointments_write", payload, || {
                        let spec = spec.clone();
                        let id = id.clone();
                        async move { self.deps.effects.gateway().update_appointment(&id, spec).await.map(Some) }
                    })
                    .await
                    .map(|outcome| outcome.into_executed().flatten())
            }
            _ => {
                let payload = serde_json::to_value(&spec).unwrap();
                self.deps
                    .effects
                    .write("appointments.create", "appointments_write", payload, || {
                        let spec = spec.clone();
                        async move { self.deps.effects.gateway().create_appointment(spec).await.map(Some) }
                    })
                    .await
                    .map(|outcome| outcome.into_executed().flatten())
            }
        };

        match result {
            Ok(Some(appointment)) => {
                let mut updates = ChannelUpdates::new();
                set(&mut updates, ENTITIES, entity_update(&EntityRef::Appointment(appointment)));
                set(&mut updates, RESPONSE, format!("{} appointment \"{}\".", verb(intent), subject));
                let goto = if intent == Intent::Delete { "synthesize_memory" } else { "link_attendees" };
                Ok(NodeResult::Command(Command::new().with_update(updates).with_goto(goto)))
            }
            Ok(None) => {
                let mut updates = ChannelUpdates::new();
                set(&mut updates, RESPONSE, format!("Cancelled appointment \"{subject}\"."));
                Ok(NodeResult::Command(Command::new().with_update(updates).with_goto("synthesize_memory")))
            }
            Err(err) => Ok(error_command(format!("Could not {} the appointment: {err}", intent.as_str()))),
        }
    }
}

fn verb(intent: Intent) -> &'static str {
    match intent {
        Intent::Create => "Created",
        Intent::Update => "Updated",
        Intent::Delete => "Cancelled",
        Intent::View => "Viewed",
    }
}

struct LinkAttendees {
    deps: Arc<SubgraphDeps>,
}

impl LinkAttendees {
    async fn link_one(&self, appointment_id: &str, is_user: bool, id: &str) -> Result<(), crm_gateway::EnhancedError> {
        let request = LinkRequest::new(ActivityType::Appointment, appointment_id, is_user, id);
        let payload = serde_json::to_value(&request).unwrap();
        self.deps
            .effects
            .write("relations.link", "contact_linking", payload, || {
                let request = request.clone();
                async move { self.deps.effects.gateway().link_relation(&request).await }
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl GraphNode for LinkAttendees {
    async fn run(&self, channels: &ChannelStore) -> crm_graph::error::Result<NodeResult> {
        let appointment_id = channels
            .try_get_json(ENTITIES)
            .and_then(|v| v.get("appointment").cloned())
            .and_then(|v| v.get("id").and_then(|id| id.as_str().map(str::to_string)))
            .unwrap_or_default();

        // Link every resolved contact off the participant queue, not just
        // the single most recent one the `entities` channel's latest-
        // pointer holds, plus the resolved user (§4.I.1: "link each
        // resolved contact and user through the appropriate link
        // relation").
        let contact_ids: Vec<String> = get::<Vec<crm_domain::Contact>>(channels, RESOLVED_CONTACTS)
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.id)
            .collect();
        let user_id = channels
            .try_get_json(ENTITIES)
            .and_then(|v| v.get("user").cloned())
            .and_then(|v| v.get("id").and_then(|id| id.as_str().map(str::to_string)));

        let mut link_warnings = Vec::new();
        for id in &contact_ids {
            if self.link_one(&appointment_id, false, id).await.is_err() {
                link_warnings.push("Could not link a contact to the appointment.".to_string());
            }
        }
        if let Some(id) = &user_id {
            if self.link_one(&appointment_id, true, id).await.is_err() {
                link_warnings.push("Could not link the user to the appointment.".to_string());
            }
        }

        let mut updates = ChannelUpdates::new();
        if !link_warnings.is_empty() {
            let response = get_string(channels, RESPONSE).unwrap_or_default();
            set(&mut updates, RESPONSE, format!("{response} ({})", link_warnings.join("; ")));
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
        crm_memory::synthesize(self.deps.memory.as_ref(), &messages, &org_id, &user_id, Some(serde_json::json!({"domain": "calendar"}))).await;
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

/// Helper exposed for tests and for `contact`/`task` modules that also need
/// to fold an `EntityRef` into the shared `entities` channel.
pub(crate) fn entity_update(entity: &EntityRef) -> serde_json::Value {
    let key = match entity {
        EntityRef::Contact(_) => "contact",
        EntityRef::User(_) => "user",
        EntityRef::Appointment(_) => "appointment",
        EntityRef::Task(_) => "task",
        EntityRef::Workflow(_) => "workflow",
    };
    serde_json::json!({ key: entity })
}

pub fn build(deps: Arc<SubgraphDeps>) -> crm_graph::error::Result<crm_graph::compiled::CompiledGraph> {
    let graph = register_channels(StateGraph::new())
        .add_sync_node("parse_request", parse_request_node())
        .add_node("resolve_contacts", Arc::new(ResolveContacts { deps: deps.clone() }))
        .add_node("apply_contact_resolution", Arc::new(ApplyContactResolution { deps: deps.clone() }))
        .add_node("resolve_users", Arc::new(ResolveUsers { deps: deps.clone() }))
        .add_node("apply_user_resolution", Arc::new(ApplyUserResolution))
        .add_node("fetch_appointments", Arc::new(FetchAppointments { deps: deps.clone() }))
        .add_sync_node("check_conflicts", check_conflicts_node())
        .add_sync_node("generate_preview", generate_preview_node())
        .add_sync_node("approval", approval_node())
        .add_node("create_or_update", Arc::new(CreateOrUpdate { deps: deps.clone() }))
        .add_node("link_attendees", Arc::new(LinkAttendees { deps: deps.clone() }))
        .add_node("synthesize_memory", Arc::new(SynthesizeMemory { deps }))
        .add_sync_node("format_response", format_response_node())
        .add_sync_node("error", error_node())
        .set_entry_point("parse_request")
        .add_conditional_edge("parse_request", parse_request_router)
        .add_edge("resolve_contacts", "apply_contact_resolution")
        .add_conditional_edge("apply_contact_resolution", after_resolution_router)
        .add_edge("resolve_users", "apply_user_resolution")
        .add_conditional_edge("apply_user_resolution", after_resolution_router)
        .add_edge("check_conflicts", "generate_preview")
        .add_edge("generate_preview", "approval")
        .add_edge("approval", "create_or_update")
        .add_edge("link_attendees", "synthesize_memory")
        .add_edge("synthesize_memory", "format_response")
        .add_edge("error", "format_response")
        .set_terminal("format_response");

    // `fetch_appointments` and `create_or_update` route via explicit
    // `Command::goto` for every outcome (view short-circuit, rejection,
    // gateway failure), so they need no edge of their own here — but
    // `StateGraph::compile` still requires *a* registered edge for non-
    // terminal nodes reached only through `Command`, so give them a default
    // that is never actually taken in practice (every live path overrides it).
    let graph = graph.add_edge("fetch_appointments", "check_conflicts").add_edge("create_or_update", "link_attendees");

    graph.compile()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_intents() {
        assert_eq!(classify_intent("cancel my 3pm meeting", ""), Intent::Delete);
        assert_eq!(classify_intent("reschedule the sync", ""), Intent::Update);
        assert_eq!(classify_intent("what's on my calendar today", ""), Intent::View);
        assert_eq!(classify_intent("schedule a meeting with John", ""), Intent::Create);
    }

    #[test]
    fn classifies_correction_from_memory() {
        let memory = "user: find John\nassistant: Could not find a contact named John";
        assert_eq!(classify_intent("John Smith", memory), Intent::Correction);
        assert_eq!(
            classify_intent("schedule a meeting with John", memory),
            Intent::Create
        );
    }

    #[test]
    fn extracts_participants_and_self_reference() {
        let (names, needs_user) = extract_participants("schedule a meeting with John for me tomorrow");
        assert_eq!(names, vec!["John".to_string()]);
        assert!(needs_user);
    }

    #[test]
    fn extracts_multiple_participants() {
        let (names, needs_user) = extract_participants("schedule a meeting with John and Jane tomorrow");
        assert_eq!(names, vec!["John".to_string(), "Jane".to_string()]);
        assert!(!needs_user);
    }

    #[test]
    fn conflict_rule_does_not_flag_touching_boundaries() {
        let existing = Appointment {
            id: "a-1".to_string(),
            subject: "Standup".to_string(),
            start_time: Utc::now(),
            end_time: Utc::now() + chrono::Duration::hours(1),
            location: None,
            participants: Vec::new(),
            created_at: Utc::now(),
        };
        let new_start = existing.end_time;
        let new_end = new_start + chrono::Duration::hours(1);
        assert!(!overlaps(new_start, new_end, &existing));

        let overlapping_end = existing.start_time + chrono::Duration::minutes(30);
        assert!(overlaps(existing.start_time, overlapping_end, &existing));
    }
}
