//! Execution plans: the ordered, dependency-validated sequence of domain
//! steps the planner produces from a query and the coordinator executes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The domains a query can be routed to. Closed rather than a free string so
/// an unrecognized domain name is a compile-time-checked planner bug, not a
/// runtime surprise surfacing three layers down in the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Calendar,
    Task,
    Workflow,
    Contact,
    /// Self/internal-user reference resolution (`me`, `myself`, an internal
    /// teammate's name). Shares the resolver contract with `Contact` (§4.E)
    /// but has no node-graph subgraph of its own — the coordinator dispatches
    /// it straight to the user resolver rather than compiling a `StateGraph`.
    User,
    General,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Calendar => "calendar",
            Domain::Task => "task",
            Domain::Workflow => "workflow",
            Domain::Contact => "contact",
            Domain::User => "user",
            Domain::General => "general",
        }
    }

    /// Whether this domain is dispatched through a compiled `StateGraph`
    /// subgraph (`crm-subgraphs`) or handled inline by the coordinator via a
    /// resolver call. Only `User` steps take the latter path.
    pub fn is_subgraph(&self) -> bool {
        !matches!(self, Domain::User)
    }
}

/// How a step relates to its predecessors in the plan DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Must run before any step that depends on it.
    Sequential,
    /// May run concurrently with sibling steps sharing the same group.
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainStep {
    pub id: String,
    pub domain: Domain,
    pub kind: StepKind,
    /// Free-text slice of the original query this step addresses, passed to
    /// the domain subgraph as its working instruction.
    pub instruction: String,
    /// Ids of steps that must complete (their entity-graph writes visible)
    /// before this step runs.
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionPlan {
    pub steps: Vec<DomainStep>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("step {0} depends on unknown step {1}")]
    UnknownDependency(String, String),
    #[error("plan contains a dependency cycle involving step {0}")]
    Cycle(String),
    #[error("duplicate step id {0}")]
    DuplicateStepId(String),
}

impl ExecutionPlan {
    pub fn new(steps: Vec<DomainStep>) -> Self {
        Self { steps }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// A one-step plan routing the whole query to the general handler — the
    /// fallback when extraction finds no recognizable domain in a non-empty
    /// query.
    pub fn general(query: impl Into<String>) -> Self {
        Self::new(vec![DomainStep {
            id: "step-1".to_string(),
            domain: Domain::General,
            kind: StepKind::Sequential,
            instruction: query.into(),
            depends_on: Vec::new(),
        }])
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Validate dependency references and absence of cycles. Duplicate ids
    /// and dangling `depends_on` references are planner bugs; cycles are as
    /// well, but are cheap enough to catch here rather than trust upstream.
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.clone()) {
                return Err(PlanError::DuplicateStepId(step.id.clone()));
            }
        }
        for step in &self.steps {
            for dep in &step.depends_on {
                if !seen.contains(dep) {
                    return Err(PlanError::UnknownDependency(step.id.clone(), dep.clone()));
                }
            }
        }
        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<(), PlanError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Visiting,
            Done,
        }

        let mut marks: std::collections::HashMap<&str, Mark> = self
            .steps
            .iter()
            .map(|s| (s.id.as_str(), Mark::Unvisited))
            .collect();

        fn visit<'a>(
            id: &'a str,
            steps_by_id: &std::collections::HashMap<&'a str, &'a DomainStep>,
            marks: &mut std::collections::HashMap<&'a str, Mark>,
        ) -> Result<(), PlanError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(PlanError::Cycle(id.to_string())),
                _ => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(step) = steps_by_id.get(id) {
                for dep in &step.depends_on {
                    visit(dep, steps_by_id, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        let steps_by_id: std::collections::HashMap<&str, &DomainStep> =
            self.steps.iter().map(|s| (s.id.as_str(), s)).collect();

        for step in &self.steps {
            visit(&step.id, &steps_by_id, &mut marks)?;
        }
        Ok(())
    }

    /// Steps grouped into ordered "waves": every step in a wave has all of
    /// its dependencies satisfied by earlier waves, and steps within a wave
    /// with `StepKind::Parallel` may run concurrently.
    pub fn waves(&self) -> Vec<Vec<&DomainStep>> {
        let mut remaining: Vec<&DomainStep> = self.steps.iter().collect();
        let mut completed = std::collections::HashSet::new();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let (ready, not_ready): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|s| s.depends_on.iter().all(|d| completed.contains(d.as_str())));

            if ready.is_empty() {
                break;
            }
            for step in &ready {
                completed.insert(step.id.as_str());
            }
            waves.push(ready);
            remaining = not_ready;
        }
        waves
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, depends_on: &[&str]) -> DomainStep {
        DomainStep {
            id: id.to_string(),
            domain: Domain::Calendar,
            kind: StepKind::Sequential,
            instruction: "do it".to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn general_fallback_is_single_step() {
        let plan = ExecutionPlan::general("hello");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].domain, Domain::General);
    }

    #[test]
    fn validate_rejects_unknown_dependency() {
        let plan = ExecutionPlan::new(vec![step("a", &["ghost"])]);
        assert_eq!(
            plan.validate(),
            Err(PlanError::UnknownDependency("a".to_string(), "ghost".to_string()))
        );
    }

    #[test]
    fn validate_rejects_cycle() {
        let plan = ExecutionPlan::new(vec![step("a", &["b"]), step("b", &["a"])]);
        assert!(matches!(plan.validate(), Err(PlanError::Cycle(_))));
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let plan = ExecutionPlan::new(vec![step("a", &[]), step("a", &[])]);
        assert_eq!(
            plan.validate(),
            Err(PlanError::DuplicateStepId("a".to_string()))
        );
    }

    #[test]
    fn waves_respect_dependency_order() {
        let plan = ExecutionPlan::new(vec![step("a", &[]), step("b", &["a"]), step("c", &["a"])]);
        let waves = plan.waves();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].len(), 1);
        assert_eq!(waves[1].len(), 2);
    }
}
