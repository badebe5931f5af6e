//! # Models
//!
//! Records kept by the store and the JSON shapes handed back to the frontend.
//!
//! - Account: registered user, owns tracked users, keeps its claim history in creation order
//! - TrackedEntity: leaderboard user owned by one account, point total only ever grows
//! - ClaimEvent: one award of 1 to 10 points, never changed once written
//!
//! Field names go out as camelCase to match what the frontend already reads.
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_type!(AccountId);
id_type!(EntityId);
id_type!(ClaimId);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Carried for the frontend, claims never touch it.
    pub points: i64,
    pub history: Vec<ClaimId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    pub id: EntityId,
    pub user_id: AccountId,
    pub name: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimEvent {
    pub id: ClaimId,
    pub to: EntityId,
    pub points_claimed: i64,
    pub created_at: DateTime<Utc>,
}

/// Name and total of a tracked user as they are now, not as they were at claim time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySummary {
    pub name: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AugmentedClaimEvent {
    pub id: ClaimId,
    pub points_claimed: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_user: Option<EntitySummary>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddUserRequest {
    pub name: Option<String>,
    pub points: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClaimQuery {
    pub to: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_parse_their_own_display() {
        let id = EntityId::new();

        assert_eq!(id.to_string().parse::<EntityId>().unwrap(), id);
        assert!("not-a-uuid".parse::<EntityId>().is_err());
    }

    #[test]
    fn test_account_hides_password_hash() {
        let account = Account {
            id: AccountId::new(),
            name: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$2b$04$secret".to_string(),
            points: 0,
            history: Vec::new(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&account).unwrap();

        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["email"], "alice@example.com");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_history_row_omits_missing_entity() {
        let row = AugmentedClaimEvent {
            id: ClaimId::new(),
            points_claimed: 4,
            created_at: Utc::now(),
            to_user: None,
        };

        let json = serde_json::to_value(&row).unwrap();

        assert_eq!(json["pointsClaimed"], 4);
        assert!(json.get("toUser").is_none());
    }
}
