//! `CrmGateway` (§4.A, §6): envelope building, response normalization, and
//! the abstract operation surface the rest of the workspace calls instead of
//! touching the wire format directly.

use crate::credential::CredentialProvider;
use crate::error::GatewayError;
use crate::transport::CrmTransport;
use chrono::{DateTime, Utc};
use crm_domain::link::LinkRequest;
use crm_domain::{Appointment, Contact, OrgId, Priority, Task, TaskStatus, User, Workflow, WorkflowStepSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Per-call timeout (§4.A: "Timeout: 10s per call").
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentSpec {
    pub subject: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentFilter {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub include_attendees: bool,
    pub include_extended: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSpec {
    pub subject: String,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStepSpec {
    pub name: String,
    pub description: String,
    pub step_type: String,
    pub assignee: String,
    pub day_offset: i64,
}

/// The gateway: one per `(org, credential provider, transport)`. Every
/// outbound call is `envelope(payload) -> transport.send() -> normalize()`;
/// the gateway itself never retries (§4.A: "The gateway never retries on its
/// own — retry is D's responsibility").
pub struct CrmGateway {
    transport: Arc<dyn CrmTransport>,
    credentials: Arc<dyn CredentialProvider>,
    org_id: OrgId,
    timeout: Duration,
}

impl CrmGateway {
    pub fn new(transport: Arc<dyn CrmTransport>, credentials: Arc<dyn CredentialProvider>, org_id: OrgId) -> Self {
        Self {
            transport,
            credentials,
            org_id,
            timeout: CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `post(endpoint, payload)` (§4.A): build the envelope, call the
    /// transport under the configured timeout, and normalize the response.
    pub async fn post(&self, endpoint: &str, payload: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
        let envelope = self.envelope(payload).await?;
        let transport = &self.transport;
        let timeout = self.timeout;
        let raw = tooling::logging::timed(endpoint, async move {
            tokio::time::timeout(timeout, transport.send(endpoint, envelope))
                .await
                .map_err(|_| GatewayError::Timeout)?
                .map_err(GatewayError::from)
        })
        .await?;
        normalize(raw)
    }

    /// `postTyped(operation, params)` (§4.A): `post` plus a typed
    /// deserialization of the normalized body.
    async fn post_typed<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        payload: serde_json::Value,
    ) -> Result<T, GatewayError> {
        let body = self.post(endpoint, payload).await?;
        serde_json::from_value(body).map_err(|err| GatewayError::InvalidResponse {
            message: format!("response did not match expected shape: {err}"),
        })
    }

    async fn envelope(&self, mut payload: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
        let credential = self
            .credentials
            .get_credential()
            .await
            .map_err(GatewayError::Credential)?;

        let object = payload
            .as_object_mut()
            .ok_or_else(|| GatewayError::InvalidResponse { message: "payload must be a JSON object".to_string() })?;
        object.insert("OrganizationId".to_string(), serde_json::json!(self.org_id.as_str()));
        object.insert("credential".to_string(), serde_json::json!(credential_placeholder(&credential)));
        Ok(payload)
    }

    // --- Appointments -----------------------------------------------------

    pub async fn list_appointments(&self, filter: AppointmentFilter) -> Result<Vec<Appointment>, GatewayError> {
        self.post_typed("appointments/list", serde_json::json!({
            "from": filter.from,
            "to": filter.to,
            "includeAttendees": filter.include_attendees,
            "includeExtended": filter.include_extended,
        }))
        .await
    }

    pub async fn create_appointment(&self, spec: AppointmentSpec) -> Result<Appointment, GatewayError> {
        self.post_typed("appointments/create", serde_json::to_value(&spec).unwrap()).await
    }

    pub async fn update_appointment(&self, id: &str, spec: AppointmentSpec) -> Result<Appointment, GatewayError> {
        let mut payload = serde_json::to_value(&spec).unwrap();
        payload.as_object_mut().unwrap().insert("id".to_string(), serde_json::json!(id));
        self.post_typed("appointments/update", payload).await
    }

    pub async fn delete_appointment(&self, id: &str) -> Result<(), GatewayError> {
        self.post("appointments/delete", serde_json::json!({"id": id})).await?;
        Ok(())
    }

    pub async fn get_appointment_by_id(&self, id: &str) -> Result<Appointment, GatewayError> {
        self.post_typed("appointments/get", serde_json::json!({"id": id})).await
    }

    // --- Tasks --------------------------------------------------------------

    pub async fn create_task(&self, spec: TaskSpec) -> Result<Task, GatewayError> {
        self.post_typed("tasks/create", serde_json::to_value(&spec).unwrap()).await
    }

    pub async fn update_task(&self, id: &str, spec: TaskSpec) -> Result<Task, GatewayError> {
        let mut payload = serde_json::to_value(&spec).unwrap();
        payload.as_object_mut().unwrap().insert("id".to_string(), serde_json::json!(id));
        self.post_typed("tasks/update", payload).await
    }

    pub async fn complete_task(&self, id: &str) -> Result<Task, GatewayError> {
        self.post_typed("tasks/complete", serde_json::json!({"id": id})).await
    }

    pub async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, GatewayError> {
        self.post_typed("tasks/list", serde_json::to_value(&filter).unwrap()).await
    }

    // --- Workflows ------------------------------------------------------------

    pub async fn create_workflow(&self, name: &str, description: &str) -> Result<Workflow, GatewayError> {
        self.post_typed("workflows/create", serde_json::json!({"name": name, "description": description})).await
    }

    pub async fn add_workflow_step(&self, workflow_id: &str, step: WorkflowStepSpec) -> Result<WorkflowStepSummary, GatewayError> {
        let mut payload = serde_json::to_value(&step).unwrap();
        payload.as_object_mut().unwrap().insert("workflowId".to_string(), serde_json::json!(workflow_id));
        self.post_typed("workflows/add_step", payload).await
    }

    // --- Contacts / users -----------------------------------------------------

    pub async fn search_contacts(&self, query: &str, limit: usize) -> Result<Vec<Contact>, GatewayError> {
        self.post_typed("contacts/search", serde_json::json!({"query": query, "limit": limit})).await
    }

    pub async fn get_contact(&self, id: &str) -> Result<Contact, GatewayError> {
        self.post_typed("contacts/get", serde_json::json!({"id": id})).await
    }

    pub async fn search_users(&self, query: &str, limit: usize) -> Result<Vec<User>, GatewayError> {
        self.post_typed("users/search", serde_json::json!({"query": query, "limit": limit})).await
    }

    pub async fn get_current_user(&self) -> Result<User, GatewayError> {
        self.post_typed("users/current", serde_json::json!({})).await
    }

    pub async fn link_relation(&self, request: &LinkRequest) -> Result<(), GatewayError> {
        self.post(
            "relations/link",
            serde_json::json!({
                "leftType": request.left_type,
                "leftId": request.left_id,
                "relationName": request.relation.as_str(),
                "rightTypeIsUser": request.right_type_is_user,
                "rightId": request.right_id,
            }),
        )
        .await?;
        Ok(())
    }
}

/// Never logs or stores the revealed token; exists only so the envelope
/// builder has something JSON-serializable to insert. A production
/// transport receives this same string and forwards it as whatever header
/// or field its wire protocol expects.
fn credential_placeholder(token: &crate::credential::OpaqueToken) -> String {
    token.reveal().to_string()
}

/// Normalize a raw transport response (§4.A): unwrap a single-element array,
/// then inspect `Valid`.
fn normalize(raw: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
    let body = match raw {
        serde_json::Value::Array(mut items) => {
            if items.is_empty() {
                serde_json::Value::Null
            } else {
                items.swap_remove(0)
            }
        }
        other => other,
    };

    let valid = body.get("Valid").and_then(|v| v.as_bool()).unwrap_or(true);
    if !valid {
        let message = body
            .get("ResponseMessage")
            .and_then(|v| v.as_str())
            .or_else(|| body.get("StackMessage").and_then(|v| v.as_str()))
            .unwrap_or("CRM reported an invalid response")
            .to_string();
        return Err(GatewayError::InvalidResponse { message });
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticCredentialProvider;
    use crate::error::TransportError;
    use crate::transport::RecordingTransport;

    fn gateway_with(transport: Arc<RecordingTransport>) -> CrmGateway {
        CrmGateway::new(
            transport,
            Arc::new(StaticCredentialProvider::new("tok")),
            OrgId::from("org-1"),
        )
    }

    #[test]
    fn normalize_unwraps_single_element_array() {
        let raw = serde_json::json!([{"Valid": true, "Id": "a-1"}]);
        let body = normalize(raw).unwrap();
        assert_eq!(body["Id"], "a-1");
    }

    #[test]
    fn normalize_surfaces_invalid_response() {
        let raw = serde_json::json!({"Valid": false, "ResponseMessage": "bad spec"});
        let err = normalize(raw).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse { message } if message == "bad spec"));
    }

    #[test]
    fn normalize_falls_back_to_stack_message() {
        let raw = serde_json::json!({"Valid": false, "StackMessage": "stack trace"});
        let err = normalize(raw).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse { message } if message == "stack trace"));
    }

    #[tokio::test]
    async fn envelope_carries_org_id_and_credential() {
        let transport = Arc::new(RecordingTransport::new());
        transport.push_response(Ok(serde_json::json!({"Valid": true})));
        let gateway = gateway_with(transport.clone());

        gateway.post("ping", serde_json::json!({"x": 1})).await.unwrap();

        let calls = transport.calls.lock().unwrap();
        let (_, payload) = &calls[0];
        assert_eq!(payload["OrganizationId"], "org-1");
        assert_eq!(payload["credential"], "tok");
    }

    #[tokio::test]
    async fn network_failure_surfaces_as_network_error() {
        let transport = Arc::new(RecordingTransport::new());
        transport.push_response(Err(TransportError::Network { code: "ECONNRESET".to_string() }));
        let gateway = gateway_with(transport);

        let err = gateway.post("ping", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::Network { code } if code == "ECONNRESET"));
    }
}
