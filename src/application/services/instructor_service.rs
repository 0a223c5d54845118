use crate::application::ports::row_store::{Filter, Query, RowStore};
use crate::domain::entities::instructor::INSTRUCTORS_TABLE;
use crate::domain::entities::{InstructorRecord, Principal, ProfileInput, Role};
use crate::domain::value_objects::{EntityId, PrincipalId, Row};
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub struct InstructorService {
    rows: Arc<dyn RowStore>,
}

impl InstructorService {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }

    pub async fn find_by_principal(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<InstructorRecord>, AppError> {
        self.find_one(Filter::new().eq("auth_id", principal_id.to_value()))
            .await
    }

    pub async fn find_by_id(&self, id: &EntityId) -> Result<Option<InstructorRecord>, AppError> {
        self.find_one(Filter::new().eq("id", id.to_value())).await
    }

    /// 有効なインストラクターの認証 ID 一覧。未リンクの行は除く。
    pub async fn active_principals(&self) -> Result<Vec<PrincipalId>, AppError> {
        let rows = self
            .rows
            .select(
                INSTRUCTORS_TABLE,
                &Query::filtered(Filter::new().eq("is_active", true)),
            )
            .await?;
        let mut principals = Vec::new();
        for row in rows {
            let record = InstructorRecord::from_row(row)?;
            if let Some(auth_id) = record.auth_id {
                principals.push(auth_id);
            }
        }
        Ok(principals)
    }

    /// インストラクターのクレームを持つのに行が無ければ空のスタブを作る。
    /// 作成した場合だけ Some を返す。
    pub async fn ensure_for_auth(
        &self,
        principal: &Principal,
    ) -> Result<Option<InstructorRecord>, AppError> {
        let claimed_instructor = principal
            .claim_role()
            .map(Role::from_claim)
            .is_some_and(|role| role == Role::Instructor);
        if !claimed_instructor {
            return Ok(None);
        }
        if self.find_by_principal(&principal.id).await?.is_some() {
            return Ok(None);
        }

        let mut row = Row::new();
        row.insert("auth_id".into(), principal.id.to_value());
        row.insert(
            "email".into(),
            principal
                .email
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        row.insert("first_name".into(), Value::String(String::new()));
        row.insert("last_name".into(), Value::String(String::new()));
        row.insert("is_active".into(), Value::Bool(true));

        let created = self.rows.insert(INSTRUCTORS_TABLE, row).await?;
        let record = InstructorRecord::from_row(created)?;
        info!(principal = %principal.id, instructor = %record.id, "created instructor stub");
        Ok(Some(record))
    }

    /// 氏名などを登録する。branch_id は管理者が割り当てるのでここでは触らない。
    pub async fn complete_profile(
        &self,
        principal: &Principal,
        input: ProfileInput,
    ) -> Result<InstructorRecord, AppError> {
        let first_name = input.first_name.trim();
        let last_name = input.last_name.trim();
        if first_name.is_empty() {
            return Err(AppError::required_field("first_name"));
        }
        if last_name.is_empty() {
            return Err(AppError::required_field("last_name"));
        }

        let email = input
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .or_else(|| principal.email.clone());
        let phone = input
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let mut row = Row::new();
        row.insert("auth_id".into(), principal.id.to_value());
        row.insert("first_name".into(), Value::String(first_name.to_string()));
        row.insert("last_name".into(), Value::String(last_name.to_string()));
        row.insert(
            "email".into(),
            email.map(Value::String).unwrap_or(Value::Null),
        );
        row.insert(
            "phone".into(),
            phone.map(Value::String).unwrap_or(Value::Null),
        );
        row.insert(
            "belt_level_id".into(),
            input.belt_level_id.map(Value::from).unwrap_or(Value::Null),
        );
        row.insert("is_active".into(), Value::Bool(true));
        row.insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));

        let saved = self.rows.upsert(INSTRUCTORS_TABLE, row, "auth_id").await?;
        let record = InstructorRecord::from_row(saved)?;
        debug!(principal = %principal.id, "instructor profile completed");
        Ok(record)
    }

    async fn find_one(&self, filter: Filter) -> Result<Option<InstructorRecord>, AppError> {
        let mut rows = self
            .rows
            .select(INSTRUCTORS_TABLE, &Query::filtered(filter).limit(1))
            .await?;
        match rows.pop() {
            Some(row) => Ok(Some(InstructorRecord::from_row(row)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::RoleClaims;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;

    mock! {
        pub Rows {}

        #[async_trait]
        impl RowStore for Rows {
            async fn insert(&self, table: &str, row: Row) -> Result<Row, AppError>;
            async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, AppError>;
            async fn update(&self, table: &str, filter: &Filter, patch: Row) -> Result<Vec<Row>, AppError>;
            async fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, AppError>;
            async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, AppError>;
        }
    }

    fn principal(role: &str) -> Principal {
        let mut principal = Principal::new(
            PrincipalId::new("auth-1").unwrap(),
            RoleClaims {
                role: Some(role.into()),
                branch_id: None,
            },
        );
        principal.email = Some("asha@example.com".into());
        principal
    }

    #[tokio::test]
    async fn ensure_for_auth_creates_stub_once() {
        let mut rows = MockRows::new();
        rows.expect_select().times(1).returning(|_, _| Ok(vec![]));
        rows.expect_insert()
            .withf(|table, row| {
                table == INSTRUCTORS_TABLE
                    && row["auth_id"] == json!("auth-1")
                    && row["first_name"] == json!("")
                    && row["is_active"] == json!(true)
            })
            .times(1)
            .returning(|_, mut row| {
                row.insert("id".into(), json!(11));
                Ok(row)
            });

        let service = InstructorService::new(Arc::new(rows));
        let created = service
            .ensure_for_auth(&principal("instructor"))
            .await
            .unwrap()
            .expect("stub created");
        assert_eq!(created.id.as_str(), "11");
        assert!(!created.has_full_name());
    }

    #[tokio::test]
    async fn ensure_for_auth_ignores_admins() {
        let rows = MockRows::new();
        let service = InstructorService::new(Arc::new(rows));
        assert!(service
            .ensure_for_auth(&principal("admin"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn complete_profile_requires_trimmed_names() {
        let rows = MockRows::new();
        let service = InstructorService::new(Arc::new(rows));
        let err = service
            .complete_profile(
                &principal("instructor"),
                ProfileInput {
                    first_name: "Asha".into(),
                    last_name: "   ".into(),
                    ..ProfileInput::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Last name is required");
    }

    #[tokio::test]
    async fn complete_profile_upserts_by_auth_id() {
        let mut rows = MockRows::new();
        rows.expect_upsert()
            .withf(|table, row, conflict| {
                table == INSTRUCTORS_TABLE
                    && conflict == "auth_id"
                    && row["first_name"] == json!("Asha")
                    && row["email"] == json!("asha@example.com")
                    && row["phone"].is_null()
            })
            .times(1)
            .returning(|_, mut row, _| {
                row.insert("id".into(), json!(11));
                Ok(row)
            });

        let service = InstructorService::new(Arc::new(rows));
        let record = service
            .complete_profile(
                &principal("instructor"),
                ProfileInput {
                    first_name: " Asha ".into(),
                    last_name: "Rao".into(),
                    phone: Some("  ".into()),
                    ..ProfileInput::default()
                },
            )
            .await
            .unwrap();
        assert!(record.has_full_name());
    }
}
