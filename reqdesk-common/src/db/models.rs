//! Database models
//!
//! Row types for the request pipeline tables. Enumerations carry their
//! storage strings; parsing an unknown string is an error rather than a
//! silent default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Fixed confidence recorded for oracle-assigned tags (0-100)
///
/// Not derived from any model score.
pub const AI_TAG_CONFIDENCE: i64 = 80;

macro_rules! storage_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// String stored in the database column
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "Unknown {} value: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

/// Request routing kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// Eligible for automatic clustering
    #[serde(rename = "public_request")]
    Public,
    /// Routed individually to staff, never clustered
    #[serde(rename = "direct_request")]
    Direct,
}

storage_enum!(RequestKind {
    Public => "public_request",
    Direct => "direct_request",
});

/// Request lifecycle status
///
/// `Pending → Analyzing → Grouped → Responded` on the happy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Analyzing,
    Grouped,
    Responded,
}

storage_enum!(RequestStatus {
    Pending => "pending",
    Analyzing => "analyzing",
    Grouped => "grouped",
    Responded => "responded",
});

/// Who created a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagOrigin {
    #[serde(rename = "ai")]
    Oracle,
    #[serde(rename = "admin")]
    Staff,
}

storage_enum!(TagOrigin {
    Oracle => "ai",
    Staff => "admin",
});

/// Caller role, supplied by the authenticating gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    BasicUser,
    YouthLeader,
    MinistryStaff,
}

storage_enum!(UserRole {
    Admin => "admin",
    BasicUser => "basic_user",
    YouthLeader => "youth_leader",
    MinistryStaff => "ministry_staff",
});

impl UserRole {
    /// Ministry staff and admins may respond, group, and trigger clustering
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::MinistryStaff)
    }

    /// Only youth leaders and admins may send direct requests
    pub fn may_send_direct(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::YouthLeader)
    }
}

/// A constituent request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: RequestKind,
    pub title: String,
    pub body: String,
    pub status: RequestStatus,
    pub group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Semantic tag vocabulary entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    /// Canonical (English) name, case-insensitively unique
    pub name: String,
    pub localized_name: String,
    pub description: Option<String>,
    pub origin: TagOrigin,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Uniqueness key for a canonical name: trimmed, Unicode lowercase
    pub fn name_key(name: &str) -> String {
        name.trim().to_lowercase()
    }
}

/// Request ↔ tag association
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTagLink {
    pub id: Uuid,
    pub request_id: Uuid,
    pub tag_id: Uuid,
    /// 0-100
    pub confidence: i64,
    pub created_at: DateTime<Utc>,
}

/// Staff-facing aggregate of similar public requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestGroup {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub primary_tag_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Staff-authored response to one request or one group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    pub request_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub responder_id: Uuid,
    pub body: String,
    pub is_group_response: bool,
    pub created_at: DateTime<Utc>,
}

/// What a staff response answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTarget {
    /// One request, answered directly
    Request(Uuid),
    /// Every member of a group, via fan-out
    Group(Uuid),
}

impl ResponseTarget {
    pub fn is_group(&self) -> bool {
        matches!(self, ResponseTarget::Group(_))
    }
}

/// Oracle-personalized variant of a group response for one member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizedResponse {
    pub id: Uuid,
    pub request_id: Uuid,
    pub response_id: Uuid,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Raw tag-link count for one tag over a set of requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagCount {
    pub tag_id: Uuid,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_storage_strings() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Analyzing,
            RequestStatus::Grouped,
            RequestStatus::Responded,
        ] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_kind_serde_matches_storage() {
        let json = serde_json::to_string(&RequestKind::Public).unwrap();
        assert_eq!(json, "\"public_request\"");
        assert_eq!(RequestKind::Direct.as_str(), "direct_request");
    }

    #[test]
    fn test_origin_uses_legacy_strings() {
        assert_eq!(TagOrigin::Oracle.as_str(), "ai");
        assert_eq!("admin".parse::<TagOrigin>().unwrap(), TagOrigin::Staff);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!("archived".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_role_permissions() {
        assert!(UserRole::MinistryStaff.is_staff());
        assert!(!UserRole::YouthLeader.is_staff());
        assert!(UserRole::YouthLeader.may_send_direct());
        assert!(!UserRole::BasicUser.may_send_direct());
    }
}
