//! `plan(query, context) → ExecutionPlan` (§4.H).

use crate::annotator::QueryAnnotation;
use crate::domains::detect_domains;
use crate::entities::{extract_entities, extract_persons, ExtractedEntity};
use crm_domain::{Domain, DomainStep, ExecutionPlan, StepKind};
use tracing::warn;

/// Everything `plan()` needs besides the raw query text. `annotation` is the
/// (already-computed) output of an optional [`crate::QueryAnnotator`]; leave
/// it `None` for keyword-only planning.
#[derive(Debug, Clone, Default)]
pub struct PlanningContext {
    pub annotation: Option<QueryAnnotation>,
}

impl PlanningContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_annotation(annotation: QueryAnnotation) -> Self {
        Self {
            annotation: Some(annotation),
        }
    }
}

fn step_id(index: usize) -> String {
    format!("step-{}", index + 1)
}

/// Matches a referring term ("it", "this", "that") back to something
/// mentioned earlier in the same query — used to detect anaphora like
/// "schedule a meeting to discuss it" referring to a workflow created in
/// the same request.
fn anaphora_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)\b(it|this|that)\b").expect("valid regex"))
}

/// Produce a validated execution plan from a free-text query.
///
/// Pure and synchronous: no I/O, no gateway calls. Domain detection is
/// keyword-based, optionally widened by a pre-computed [`QueryAnnotation`].
/// When a person is mentioned inside a `calendar`/`task`/`workflow` query, a
/// `contact` (or `user`, for a self-reference) step is inserted ahead of it
/// in the dependency graph so the domain step can consume the resolved
/// entity. Domains with no dependency between them run in the same
/// `parallel` wave; dependent steps are `sequential`.
pub fn plan(query: &str, context: &PlanningContext) -> ExecutionPlan {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return ExecutionPlan::empty();
    }

    let mut domains = detect_domains(trimmed);
    let mut entities: Vec<ExtractedEntity> = extract_entities(trimmed);

    if let Some(annotation) = &context.annotation {
        for domain in &annotation.domains {
            if !domains.contains(domain) {
                domains.push(*domain);
            }
        }
        for entity in &annotation.entities {
            if !entities.contains(entity) {
                entities.push(entity.clone());
            }
        }
    }

    if domains.is_empty() {
        return ExecutionPlan::general(trimmed);
    }

    let persons = extract_persons(trimmed);
    let mut steps = Vec::new();
    let mut next_index = 0usize;

    // Dependency steps (contact/user resolution) come first so their ids
    // exist by the time dependent domain steps reference them.
    let mut dependency_ids: Vec<String> = Vec::new();
    let needs_dependency = domains
        .iter()
        .any(|d| matches!(d, Domain::Calendar | Domain::Task | Domain::Workflow));

    if needs_dependency {
        for person in &persons {
            let domain = if person == "me" { Domain::User } else { Domain::Contact };
            let id = step_id(next_index);
            next_index += 1;
            steps.push(DomainStep {
                id: id.clone(),
                domain,
                kind: StepKind::Sequential,
                instruction: format!("resolve {person}"),
                depends_on: Vec::new(),
            });
            dependency_ids.push(id);
        }
    }

    // Domains that are explicitly present as their own plan steps (not
    // `user`, which has no subgraph and is only ever a dependency step).
    let domain_steps: Vec<Domain> = domains.into_iter().filter(|d| *d != Domain::User).collect();
    let parallel_eligible = domain_steps.len() > 1 && dependency_ids.is_empty();

    // Pre-assign ids before building steps so a calendar clause referring
    // back to a workflow step ("schedule a meeting to discuss it") can
    // depend on that step's id even though workflow may not be first in
    // `domain_steps`'s iteration order.
    let step_ids: Vec<String> = (0..domain_steps.len())
        .map(|i| step_id(next_index + i))
        .collect();
    let workflow_id = domain_steps
        .iter()
        .position(|d| *d == Domain::Workflow)
        .map(|i| step_ids[i].clone());
    let refers_to_workflow = workflow_id.is_some() && anaphora_regex().is_match(trimmed);

    for (i, domain) in domain_steps.into_iter().enumerate() {
        let id = step_ids[i].clone();
        next_index += 1;
        let mut depends_on = if matches!(domain, Domain::Calendar | Domain::Task | Domain::Workflow) {
            dependency_ids.clone()
        } else {
            Vec::new()
        };
        // Anaphora rule (§2E scenario 3): a calendar clause referring to
        // "it"/"this" alongside a workflow step in the same plan means the
        // meeting is about the workflow just created, so it must run after
        // the workflow step merges its entity into the entity graph.
        if domain == Domain::Calendar && refers_to_workflow {
            if let Some(wf_id) = &workflow_id {
                if !depends_on.contains(wf_id) {
                    depends_on.push(wf_id.clone());
                }
            }
        }
        let kind = if depends_on.is_empty() && parallel_eligible {
            StepKind::Parallel
        } else {
            StepKind::Sequential
        };
        steps.push(DomainStep {
            id,
            domain,
            kind,
            instruction: trimmed.to_string(),
            depends_on,
        });
    }

    let planned = ExecutionPlan::new(steps);
    match planned.validate() {
        Ok(()) => planned,
        Err(err) => {
            warn!(error = %err, query = trimmed, "planner produced an invalid plan, falling back to general");
            ExecutionPlan::general(trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_yields_empty_plan() {
        let result = plan("", &PlanningContext::new());
        assert!(result.is_empty());
    }

    #[test]
    fn unrecognized_query_falls_back_to_general() {
        let result = plan("hello there", &PlanningContext::new());
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].domain, Domain::General);
    }

    #[test]
    fn simple_view_query_is_single_calendar_step() {
        let result = plan("What's on my calendar today?", &PlanningContext::new());
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].domain, Domain::Calendar);
    }

    #[test]
    fn person_mention_inserts_contact_dependency() {
        let result = plan("create an appointment with John for 8am tomorrow", &PlanningContext::new());
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[0].domain, Domain::Contact);
        assert_eq!(result.steps[1].domain, Domain::Calendar);
        assert_eq!(result.steps[1].depends_on, vec![result.steps[0].id.clone()]);
        result.validate().expect("plan must validate");
    }

    #[test]
    fn self_reference_inserts_user_dependency() {
        let result = plan("schedule a meeting for me tomorrow", &PlanningContext::new());
        assert_eq!(result.steps[0].domain, Domain::User);
        assert_eq!(result.steps[1].domain, Domain::Calendar);
    }

    #[test]
    fn independent_domains_run_in_parallel() {
        let result = plan(
            "Create a planning workflow and add a task for the budget review",
            &PlanningContext::new(),
        );
        assert_eq!(result.steps.len(), 2);
        assert!(result.steps.iter().all(|s| s.kind == StepKind::Parallel));
        assert_eq!(result.waves().len(), 1);
    }

    #[test]
    fn calendar_clause_referring_to_workflow_depends_on_it() {
        let result = plan(
            "Create a planning workflow and schedule a meeting to discuss it",
            &PlanningContext::new(),
        );
        assert_eq!(result.steps.len(), 2);
        let workflow_step = result
            .steps
            .iter()
            .find(|s| s.domain == Domain::Workflow)
            .expect("workflow step");
        let calendar_step = result
            .steps
            .iter()
            .find(|s| s.domain == Domain::Calendar)
            .expect("calendar step");
        assert_eq!(calendar_step.depends_on, vec![workflow_step.id.clone()]);
        assert_eq!(calendar_step.kind, StepKind::Sequential);
        assert_eq!(result.waves().len(), 2);
        result.validate().expect("plan must validate");
    }
}
