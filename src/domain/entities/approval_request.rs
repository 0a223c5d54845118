use crate::domain::value_objects::{
    ApprovalAction, ApprovalStatus, EntityId, EntityKind, RequestId, Row,
};
use crate::shared::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub entity_type: EntityKind,
    pub entity_id: EntityId,
    /// 申請した講師の instructors.id
    #[serde(rename = "instructor_id")]
    pub requester_id: EntityId,
    pub action: ApprovalAction,
    #[serde(default)]
    pub payload: Option<Row>,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn from_row(row: Row) -> Result<Self, AppError> {
        let request: ApprovalRequest = serde_json::from_value(Value::Object(row))
            .map_err(|err| AppError::DeserializationError(err.to_string()))?;
        request.check_payload_shape()?;
        Ok(request)
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    pub fn ensure_pending(&self) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::already_reviewed());
        }
        Ok(())
    }

    fn check_payload_shape(&self) -> Result<(), AppError> {
        match (self.action, self.payload.is_some()) {
            (ApprovalAction::Update, true) | (ApprovalAction::Delete, false) => Ok(()),
            (ApprovalAction::Update, false) => Err(AppError::DeserializationError(format!(
                "Approval request {} is an update without payload",
                self.id
            ))),
            (ApprovalAction::Delete, true) => Err(AppError::DeserializationError(format!(
                "Approval request {} is a delete with payload",
                self.id
            ))),
        }
    }
}

/// 新規申請。payload は update のときだけ持つ。
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalDraft {
    entity_type: EntityKind,
    entity_id: EntityId,
    requester_id: EntityId,
    action: ApprovalAction,
    payload: Option<Row>,
}

impl ApprovalDraft {
    pub fn update(
        entity_type: EntityKind,
        entity_id: EntityId,
        requester_id: EntityId,
        payload: Row,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            requester_id,
            action: ApprovalAction::Update,
            payload: Some(payload),
        }
    }

    pub fn delete(entity_type: EntityKind, entity_id: EntityId, requester_id: EntityId) -> Self {
        Self {
            entity_type,
            entity_id,
            requester_id,
            action: ApprovalAction::Delete,
            payload: None,
        }
    }

    pub fn action(&self) -> ApprovalAction {
        self.action
    }

    pub fn into_row(self, created_at: DateTime<Utc>) -> Row {
        let mut row = Row::new();
        row.insert(
            "entity_type".into(),
            Value::String(self.entity_type.as_str().into()),
        );
        row.insert("entity_id".into(), self.entity_id.to_value());
        row.insert("instructor_id".into(), self.requester_id.to_value());
        row.insert("action".into(), Value::String(self.action.as_str().into()));
        row.insert(
            "payload".into(),
            self.payload.map(Value::Object).unwrap_or(Value::Null),
        );
        row.insert(
            "status".into(),
            Value::String(ApprovalStatus::Pending.as_str().into()),
        );
        row.insert("created_at".into(), Value::String(created_at.to_rfc3339()));
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_backend_row_with_join_columns() {
        let request = ApprovalRequest::from_row(row(json!({
            "id": 7,
            "entity_type": "student",
            "entity_id": "s-1",
            "instructor_id": "i-1",
            "action": "update",
            "payload": { "contact_number": "555" },
            "status": "pending",
            "created_at": "2024-05-01T10:00:00+00:00",
            "reviewed_at": null,
            "instructors": { "first_name": "Asha", "last_name": "Rao" }
        })))
        .unwrap();

        assert_eq!(request.id.as_str(), "7");
        assert!(request.is_pending());
        assert!(request.ensure_pending().is_ok());
    }

    #[test]
    fn delete_with_payload_is_malformed() {
        let err = ApprovalRequest::from_row(row(json!({
            "id": "r-1",
            "entity_type": "student",
            "entity_id": "s-1",
            "instructor_id": "i-1",
            "action": "delete",
            "payload": { "first_name": "x" },
            "status": "pending",
            "created_at": "2024-05-01T10:00:00Z"
        })))
        .unwrap_err();
        assert!(matches!(err, AppError::DeserializationError(_)));
    }

    #[test]
    fn reviewed_request_is_conflict() {
        let request = ApprovalRequest::from_row(row(json!({
            "id": "r-2",
            "entity_type": "instructor",
            "entity_id": "i-1",
            "instructor_id": "i-1",
            "action": "delete",
            "payload": null,
            "status": "rejected",
            "created_at": "2024-05-01T10:00:00Z",
            "reviewed_at": "2024-05-02T10:00:00Z"
        })))
        .unwrap();
        assert!(matches!(request.ensure_pending(), Err(AppError::Conflict(_))));
    }

    #[test]
    fn delete_draft_has_null_payload() {
        let draft = ApprovalDraft::delete(
            EntityKind::Student,
            EntityId::new("s-9").unwrap(),
            EntityId::new("i-1").unwrap(),
        );
        let row = draft.into_row(Utc::now());
        assert_eq!(row["payload"], Value::Null);
        assert_eq!(row["action"], json!("delete"));
        assert_eq!(row["status"], json!("pending"));
    }
}
