use super::Validate;
use crate::domain::entities::ApprovalRequest;
use crate::domain::value_objects::{ApprovalStatus, Decision, EntityKind, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitEditRequest {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub fields: Row,
}

impl Validate for SubmitEditRequest {
    fn validate(&self) -> Result<(), String> {
        validate_target(&self.entity_type, &self.entity_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitDeleteRequest {
    pub entity_type: String,
    pub entity_id: String,
}

impl Validate for SubmitDeleteRequest {
    fn validate(&self) -> Result<(), String> {
        validate_target(&self.entity_type, &self.entity_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideRequest {
    pub request_id: String,
    pub decision: String,
}

impl Validate for DecideRequest {
    fn validate(&self) -> Result<(), String> {
        if self.request_id.trim().is_empty() {
            return Err("Request ID is required".to_string());
        }
        if Decision::from_str(&self.decision).is_none() {
            return Err(format!("Unknown decision: {}", self.decision));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListApprovalRequestsRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub requester_id: Option<String>,
}

impl Validate for ListApprovalRequestsRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(status) = &self.status {
            if ApprovalStatus::from_str(status).is_none() {
                return Err(format!("Unknown status: {status}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequestResponse {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub requester_id: String,
    pub action: String,
    pub payload: Option<Row>,
    pub status: String,
    pub created_at: String,
    pub reviewed_at: Option<String>,
}

impl From<ApprovalRequest> for ApprovalRequestResponse {
    fn from(request: ApprovalRequest) -> Self {
        Self {
            id: request.id.to_string(),
            entity_type: request.entity_type.as_str().to_string(),
            entity_id: request.entity_id.to_string(),
            requester_id: request.requester_id.to_string(),
            action: request.action.as_str().to_string(),
            payload: request.payload,
            status: request.status.as_str().to_string(),
            created_at: request.created_at.to_rfc3339(),
            reviewed_at: request.reviewed_at.map(|at| at.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCountResponse {
    pub count: usize,
}

fn validate_target(entity_type: &str, entity_id: &str) -> Result<(), String> {
    if EntityKind::from_str(entity_type).is_none() {
        return Err(format!("Unknown entity type: {entity_type}"));
    }
    if entity_id.trim().is_empty() {
        return Err("Entity ID is required".to_string());
    }
    Ok(())
}
