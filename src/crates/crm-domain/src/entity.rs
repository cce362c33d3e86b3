//! `EntityRef`: the tagged sum of every CRM entity the coordinator and
//! domain subgraphs pass between each other through the entity graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of entity, used as the key into `EntityGraph`'s per-type maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Contact,
    User,
    Appointment,
    Task,
    Workflow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub subject: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Open,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub subject: String,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepSummary {
    pub name: String,
    pub step_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub step_count: usize,
    pub steps: Vec<WorkflowStepSummary>,
    pub created_at: DateTime<Utc>,
}

/// Tagged sum of every entity kind the entity graph stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntityRef {
    Contact(Contact),
    User(User),
    Appointment(Appointment),
    Task(Task),
    Workflow(Workflow),
}

impl EntityRef {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityRef::Contact(_) => EntityType::Contact,
            EntityRef::User(_) => EntityType::User,
            EntityRef::Appointment(_) => EntityType::Appointment,
            EntityRef::Task(_) => EntityType::Task,
            EntityRef::Workflow(_) => EntityType::Workflow,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRef::Contact(c) => &c.id,
            EntityRef::User(u) => &u.id,
            EntityRef::Appointment(a) => &a.id,
            EntityRef::Task(t) => &t.id,
            EntityRef::Workflow(w) => &w.id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            EntityRef::Contact(c) => c.created_at,
            EntityRef::User(u) => u.created_at,
            EntityRef::Appointment(a) => a.created_at,
            EntityRef::Task(t) => t.created_at,
            EntityRef::Workflow(w) => w.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(id: &str) -> EntityRef {
        EntityRef::Contact(Contact {
            id: id.to_string(),
            name: "Jane".to_string(),
            email: None,
            phone: None,
            company: None,
            title: None,
            created_at: Utc::now(),
        })
    }

    #[test]
    fn entity_type_and_id_match_variant() {
        let c = contact("c-1");
        assert_eq!(c.entity_type(), EntityType::Contact);
        assert_eq!(c.id(), "c-1");
    }
}
