#![allow(dead_code)]

use ganesha_lib::domain::entities::{Principal, RoleClaims};
use ganesha_lib::domain::value_objects::BranchId;
use ganesha_lib::infrastructure::gateway::InMemoryBackend;
use ganesha_lib::shared::config::AppConfig;
use ganesha_lib::AppState;
use serde_json::json;
use std::sync::Arc;

pub const ADMIN_EMAIL: &str = "admin@ganesha.test";
pub const INSTRUCTOR_EMAIL: &str = "asha@ganesha.test";
pub const PASSWORD: &str = "correct-horse";

/// 同じバックエンドを共有する端末を何台でも作れる。
pub struct Academy {
    pub backend: Arc<InMemoryBackend>,
    pub admin: Principal,
    pub instructor: Principal,
}

impl Academy {
    /// 支部 2 に講師 1 名と生徒 2 名、支部 3 に生徒 1 名。
    pub fn seeded() -> Self {
        let backend = Arc::new(InMemoryBackend::new());
        let admin = backend.register_user(
            ADMIN_EMAIL,
            PASSWORD,
            RoleClaims {
                role: Some("admin".into()),
                branch_id: None,
            },
        );
        let instructor = backend.register_user(
            INSTRUCTOR_EMAIL,
            PASSWORD,
            RoleClaims {
                role: Some("instructor".into()),
                branch_id: Some(BranchId::new("2").unwrap()),
            },
        );

        backend.seed(
            "instructors",
            vec![json!({
                "id": 11,
                "auth_id": instructor.id.as_str(),
                "first_name": "Asha",
                "last_name": "Rao",
                "email": INSTRUCTOR_EMAIL,
                "branch_id": 2,
                "is_active": true
            })],
        );
        backend.seed(
            "students",
            vec![
                json!({
                    "id": 42,
                    "first_name": "Kiran",
                    "last_name": "Shah",
                    "contact_number": "555-0000",
                    "branch_id": 2,
                    "is_active": true,
                    "fee_balance": 1200
                }),
                json!({
                    "id": 43,
                    "first_name": "Meera",
                    "last_name": "Iyer",
                    "branch_id": 2,
                    "is_active": true
                }),
                json!({
                    "id": 77,
                    "first_name": "Dev",
                    "last_name": "Patel",
                    "branch_id": 3,
                    "is_active": true
                }),
            ],
        );

        Self {
            backend,
            admin,
            instructor,
        }
    }

    /// 新しい端末の状態。テスト用に待ち時間を短くしてある。
    pub async fn device(&self) -> AppState {
        let mut config = AppConfig::default();
        config.realtime.init_delay_ms = 10;
        config.realtime.retry_delay_ms = 50;
        config.realtime.subscribe_timeout_ms = 200;
        config.realtime.poll_interval_ms = 100;
        config.realtime.recovery_delay_ms = 10;
        AppState::in_memory(config, self.backend.clone())
            .await
            .expect("in-memory app state")
    }

    pub async fn signed_in(&self, email: &str) -> AppState {
        let device = self.device().await;
        device
            .auth_service
            .sign_in(email, PASSWORD)
            .await
            .expect("sign in");
        device
    }

    pub fn student(&self, id: i64) -> serde_json::Map<String, serde_json::Value> {
        self.backend
            .rows("students")
            .into_iter()
            .find(|row| row.get("id").and_then(|v| v.as_i64()) == Some(id))
            .expect("student row")
    }

    pub fn approval_rows(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.backend.rows("approval_requests")
    }
}
