use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// アプリケーションレベルのバリデーション失敗理由。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValidationFailureKind {
    /// 汎用的なバリデーションエラー。
    Generic,
    /// 必須フィールドが欠落、またはトリム後に空。
    RequiredField,
    /// 許可リストで射影した結果、更新するフィールドが残らなかった。
    EmptyProjection,
    /// エンティティ種別に対してサポートされない操作。
    UnsupportedAction,
    /// ペイロードの形式が不正。
    InvalidPayload,
}

impl ValidationFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationFailureKind::Generic => "generic",
            ValidationFailureKind::RequiredField => "required_field",
            ValidationFailureKind::EmptyProjection => "empty_projection",
            ValidationFailureKind::UnsupportedAction => "unsupported_action",
            ValidationFailureKind::InvalidPayload => "invalid_payload",
        }
    }
}

impl fmt::Display for ValidationFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationFailureKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generic" => Ok(ValidationFailureKind::Generic),
            "required_field" => Ok(ValidationFailureKind::RequiredField),
            "empty_projection" => Ok(ValidationFailureKind::EmptyProjection),
            "unsupported_action" => Ok(ValidationFailureKind::UnsupportedAction),
            "invalid_payload" => Ok(ValidationFailureKind::InvalidPayload),
            _ => Err(()),
        }
    }
}
