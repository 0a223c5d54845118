use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// バックエンドの主キーは uuid 文字列と整数が混在しているため、両方を受け付ける。
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(value) => value,
            RawId::Number(value) => value.to_string(),
        }
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, String> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(format!("{} cannot be empty", $label));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn to_value(&self) -> Value {
                Value::String(self.0.clone())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = RawId::deserialize(deserializer)?;
                Self::new(raw.into_string()).map_err(de::Error::custom)
            }
        }
    };
}

string_id!(
    /// 認証基盤が発行するユーザー ID（auth.users.id）。
    PrincipalId,
    "Principal ID"
);
string_id!(
    /// students / instructors など業務テーブルの行 ID。
    EntityId,
    "Entity ID"
);
string_id!(RequestId, "Approval request ID");
string_id!(NotificationId, "Notification ID");
string_id!(BranchId, "Branch ID");

impl PrincipalId {
    /// ローカル発行用。uuid v4 なので空にはならない。
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
