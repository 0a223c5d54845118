use crate::domain::value_objects::{BranchId, EntityId, PrincipalId};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_INSTRUCTOR: &str = "instructor";

/// 認証トークンに載っているユーザーメタデータ由来のクレーム。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleClaims {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub branch_id: Option<BranchId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub claims: RoleClaims,
}

impl Principal {
    pub fn new(id: PrincipalId, claims: RoleClaims) -> Self {
        Self {
            id,
            email: None,
            claims,
        }
    }

    pub fn claim_role(&self) -> Option<&str> {
        self.claims
            .role
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Instructor,
    Other(String),
}

impl Role {
    pub fn from_claim(claim: &str) -> Self {
        match claim {
            ROLE_ADMIN => Role::Admin,
            ROLE_INSTRUCTOR => Role::Instructor,
            other => Role::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => ROLE_ADMIN,
            Role::Instructor => ROLE_INSTRUCTOR,
            Role::Other(value) => value.as_str(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Role::from_claim(&value))
    }
}

/// ダッシュボードの機能単位。ルート単位のガードに対応する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Dashboard,
    Students,
    Attendance,
    Fees,
    Orders,
    Notifications,
    Branches,
    Instructors,
    Inventory,
    Announcements,
    Shop,
}

impl Feature {
    pub const ALL: [Feature; 11] = [
        Feature::Dashboard,
        Feature::Students,
        Feature::Attendance,
        Feature::Fees,
        Feature::Orders,
        Feature::Notifications,
        Feature::Branches,
        Feature::Instructors,
        Feature::Inventory,
        Feature::Announcements,
        Feature::Shop,
    ];

    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Feature::Branches | Feature::Instructors | Feature::Inventory | Feature::Announcements
        )
    }

    /// ナビゲーション上は講師にだけ出す機能。
    pub fn is_instructor_only(&self) -> bool {
        matches!(self, Feature::Shop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub principal_id: PrincipalId,
    pub role: Option<Role>,
    pub branch_id: Option<BranchId>,
    pub instructor_id: Option<EntityId>,
    pub profile_complete: bool,
}

impl SessionContext {
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }

    pub fn is_instructor(&self) -> bool {
        self.role == Some(Role::Instructor)
    }

    /// ナビゲーションに出す機能。管理者にはショップを出さない。
    pub fn accessible_features(&self) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|feature| self.can_access(*feature))
            .filter(|feature| !(self.is_admin() && feature.is_instructor_only()))
            .collect()
    }

    pub fn can_access(&self, feature: Feature) -> bool {
        if !self.profile_complete {
            return false;
        }
        match &self.role {
            Some(Role::Admin) => true,
            Some(Role::Instructor) => !feature.is_admin_only(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(role: Option<Role>, complete: bool) -> SessionContext {
        SessionContext {
            principal_id: PrincipalId::new("u-1").unwrap(),
            role,
            branch_id: None,
            instructor_id: None,
            profile_complete: complete,
        }
    }

    #[test]
    fn admin_can_open_every_feature_but_shop_stays_out_of_navigation() {
        let ctx = context(Some(Role::Admin), true);
        assert!(ctx.can_access(Feature::Branches));
        assert!(ctx.can_access(Feature::Announcements));
        assert!(ctx.can_access(Feature::Shop));
        let navigation = ctx.accessible_features();
        assert!(!navigation.contains(&Feature::Shop));
        assert_eq!(navigation.len(), Feature::ALL.len() - 1);
    }

    #[test]
    fn instructor_is_kept_out_of_admin_features() {
        let ctx = context(Some(Role::Instructor), true);
        assert!(ctx.can_access(Feature::Students));
        assert!(ctx.can_access(Feature::Shop));
        assert!(!ctx.can_access(Feature::Inventory));
    }

    #[test]
    fn incomplete_profile_blocks_everything() {
        let ctx = context(Some(Role::Instructor), false);
        assert!(!ctx.can_access(Feature::Dashboard));
    }

    #[test]
    fn unknown_role_round_trips_as_claim() {
        assert_eq!(Role::from_claim("staff"), Role::Other("staff".into()));
        assert_eq!(Role::from_claim("admin"), Role::Admin);
    }
}
