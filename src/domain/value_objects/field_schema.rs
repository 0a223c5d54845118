use super::approval::EntityKind;
use crate::shared::{AppError, ValidationFailureKind};
use serde_json::{Map, Value};

/// バックエンドの 1 行。カラム名 → JSON 値。
pub type Row = Map<String, Value>;

/// 承認フロー経由で書き換え可能なフィールドの宣言。
///
/// 提出時と承認時の両方でこのスキーマを通す。料金・監査系のカラムは含めない。
#[derive(Debug)]
pub struct EntitySchema {
    kind: EntityKind,
    table: &'static str,
    editable: &'static [&'static str],
    required_text: &'static [&'static str],
}

static STUDENT_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Student,
    table: "students",
    editable: &[
        "first_name",
        "last_name",
        "email_address",
        "gender",
        "contact_number",
        "father_name",
        "mother_name",
        "branch_id",
        "date_of_birth",
        "belt_id",
        "is_active",
    ],
    required_text: &["first_name", "last_name"],
};

// email と branch_id はこの経路では変更不可
static INSTRUCTOR_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Instructor,
    table: "instructors",
    editable: &["first_name", "last_name", "phone", "belt_level_id"],
    required_text: &["first_name", "last_name"],
};

impl EntitySchema {
    pub fn for_kind(kind: EntityKind) -> &'static EntitySchema {
        match kind {
            EntityKind::Student => &STUDENT_SCHEMA,
            EntityKind::Instructor => &INSTRUCTOR_SCHEMA,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn editable_fields(&self) -> &'static [&'static str] {
        self.editable
    }

    pub fn allows(&self, field: &str) -> bool {
        self.editable.contains(&field)
    }

    /// 許可リスト外のキーを落とし、文字列はトリムする。
    /// 任意項目の空文字は null に正規化する。
    pub fn project(&self, fields: &Row) -> Row {
        fields
            .iter()
            .filter(|(key, _)| self.allows(key))
            .map(|(key, value)| (key.clone(), self.normalize(key, value)))
            .collect()
    }

    /// 射影後のペイロードを検証する。必須項目は存在するなら空であってはならない。
    pub fn validate(&self, projected: &Row) -> Result<(), AppError> {
        if projected.is_empty() {
            return Err(AppError::validation(
                ValidationFailureKind::EmptyProjection,
                format!("No editable {} fields were provided", self.kind),
            ));
        }
        for field in self.required_text {
            if let Some(value) = projected.get(*field) {
                let blank = match value {
                    Value::String(s) => s.trim().is_empty(),
                    Value::Null => true,
                    _ => false,
                };
                if blank {
                    return Err(AppError::required_field(field));
                }
            }
        }
        Ok(())
    }

    pub fn project_and_validate(&self, fields: &Row) -> Result<Row, AppError> {
        let projected = self.project(fields);
        self.validate(&projected)?;
        Ok(projected)
    }

    fn normalize(&self, key: &str, value: &Value) -> Value {
        match value {
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() && !self.required_text.contains(&key) {
                    Value::Null
                } else {
                    Value::String(trimmed.to_string())
                }
            }
            other => other.clone(),
        }
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
    fn instructor_projection_drops_email_and_branch() {
        let schema = EntitySchema::for_kind(EntityKind::Instructor);
        let projected = schema.project(&row(json!({
            "first_name": " Asha ",
            "email": "asha@example.com",
            "branch_id": 3,
            "phone": "+1 555 0100",
            "updated_at": "2024-01-01T00:00:00Z"
        })));

        assert_eq!(projected.len(), 2);
        assert_eq!(projected["first_name"], json!("Asha"));
        assert_eq!(projected["phone"], json!("+1 555 0100"));
    }

    #[test]
    fn student_projection_excludes_financial_fields() {
        let schema = EntitySchema::for_kind(EntityKind::Student);
        let projected = schema.project(&row(json!({
            "contact_number": "555",
            "fee_balance": 1200,
            "membership_id": "M-1",
            "created_at": "2024-01-01T00:00:00Z"
        })));
        assert_eq!(projected.keys().collect::<Vec<_>>(), vec!["contact_number"]);
    }

    #[test]
    fn blank_required_name_is_rejected() {
        let schema = EntitySchema::for_kind(EntityKind::Student);
        let err = schema
            .project_and_validate(&row(json!({ "first_name": "Ravi", "last_name": "   " })))
            .unwrap_err();
        match err {
            AppError::ValidationError { field, kind, .. } => {
                assert_eq!(field.as_deref(), Some("last_name"));
                assert_eq!(kind, ValidationFailureKind::RequiredField);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn optional_blank_becomes_null() {
        let schema = EntitySchema::for_kind(EntityKind::Instructor);
        let projected = schema
            .project_and_validate(&row(json!({ "first_name": "Asha", "phone": "  " })))
            .unwrap();
        assert_eq!(projected["phone"], Value::Null);
    }

    #[test]
    fn nothing_editable_is_rejected() {
        let schema = EntitySchema::for_kind(EntityKind::Instructor);
        let err = schema
            .project_and_validate(&row(json!({ "email": "x@example.com" })))
            .unwrap_err();
        assert_eq!(
            err.validation_kind(),
            Some(ValidationFailureKind::EmptyProjection)
        );
    }
}
