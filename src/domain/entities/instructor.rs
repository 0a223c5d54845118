use crate::domain::value_objects::{BranchId, EntityId, PrincipalId, Row};
use crate::shared::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const INSTRUCTORS_TABLE: &str = "instructors";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorRecord {
    pub id: EntityId,
    #[serde(default)]
    pub auth_id: Option<PrincipalId>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub branch_id: Option<BranchId>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl InstructorRecord {
    pub fn from_row(row: Row) -> Result<Self, AppError> {
        serde_json::from_value(Value::Object(row))
            .map_err(|err| AppError::DeserializationError(err.to_string()))
    }

    pub fn has_full_name(&self) -> bool {
        non_blank(&self.first_name) && non_blank(&self.last_name)
    }

    pub fn is_profile_complete(&self) -> bool {
        self.has_full_name() && self.branch_id.is_some()
    }
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// プロフィール補完フォームの入力。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileInput {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub belt_level_id: Option<i64>,
}
