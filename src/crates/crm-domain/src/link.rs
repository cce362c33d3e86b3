//! Closed link-relation map between CRM activities and the contacts/users
//! linked to them.
//!
//! The relation name between an appointment and its attendees is not the
//! same as between a task and its assignee, and both differ depending on
//! whether the other side is a `Contact` or a `User`. A string-keyed lookup
//! table admits relation names that don't correspond to any real activity;
//! this closed, exhaustively-matched sum cannot.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Appointment,
    Task,
    Workflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkRelation {
    AppointmentAttendeeContact,
    AppointmentAttendeeUser,
    TaskAssigneeContact,
    TaskAssigneeUser,
    WorkflowParticipantContact,
    WorkflowParticipantUser,
}

impl LinkRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkRelation::AppointmentAttendeeContact => "appointment_attendee_contact",
            LinkRelation::AppointmentAttendeeUser => "appointment_attendee_user",
            LinkRelation::TaskAssigneeContact => "task_assignee_contact",
            LinkRelation::TaskAssigneeUser => "task_assignee_user",
            LinkRelation::WorkflowParticipantContact => "workflow_participant_contact",
            LinkRelation::WorkflowParticipantUser => "workflow_participant_user",
        }
    }

    /// The relation linking an activity of `activity` to a participant who
    /// is a contact rather than an internal user, or vice versa.
    pub fn for_activity(activity: ActivityType, participant_is_user: bool) -> LinkRelation {
        match (activity, participant_is_user) {
            (ActivityType::Appointment, false) => LinkRelation::AppointmentAttendeeContact,
            (ActivityType::Appointment, true) => LinkRelation::AppointmentAttendeeUser,
            (ActivityType::Task, false) => LinkRelation::TaskAssigneeContact,
            (ActivityType::Task, true) => LinkRelation::TaskAssigneeUser,
            (ActivityType::Workflow, false) => LinkRelation::WorkflowParticipantContact,
            (ActivityType::Workflow, true) => LinkRelation::WorkflowParticipantUser,
        }
    }
}

/// One `linkRelation(leftType, leftId, relationName, rightType, rightId)`
/// request the gateway issues against the CRM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRequest {
    pub left_type: ActivityType,
    pub left_id: String,
    pub relation: LinkRelation,
    pub right_type_is_user: bool,
    pub right_id: String,
}

impl LinkRequest {
    pub fn new(
        left_type: ActivityType,
        left_id: impl Into<String>,
        right_type_is_user: bool,
        right_id: impl Into<String>,
    ) -> Self {
        Self {
            left_type,
            left_id: left_id.into(),
            relation: LinkRelation::for_activity(left_type, right_type_is_user),
            right_type_is_user,
            right_id: right_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appointment_contact_and_user_relations_differ() {
        let contact = LinkRelation::for_activity(ActivityType::Appointment, false);
        let user = LinkRelation::for_activity(ActivityType::Appointment, true);
        assert_ne!(contact, user);
        assert_eq!(contact.as_str(), "appointment_attendee_contact");
        assert_eq!(user.as_str(), "appointment_attendee_user");
    }

    #[test]
    fn link_request_derives_relation_from_activity() {
        let request = LinkRequest::new(ActivityType::Task, "t-1", false, "c-1");
        assert_eq!(request.relation, LinkRelation::TaskAssigneeContact);
    }
}
