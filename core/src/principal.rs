//! Resolved caller identity.
//!
//! A [`Principal`] is produced by the identity gate for every request or
//! connection and dropped with it. End users also own a personal room on the
//! connection gateway, named deterministically from their identifier.

use serde::{Deserialize, Serialize};

/// Prefix of personal rooms.
pub const USER_ROOM_PREFIX: &str = "user:";

/// Personal room of a user: `user:<id>`.
#[must_use]
pub fn user_room(user_id: &str) -> String {
    format!("{USER_ROOM_PREFIX}{user_id}")
}

/// A trusted internal service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    /// Name announced by the calling service.
    pub service_name: String,
}

/// An end user with a verified session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPrincipal {
    /// User identifier.
    pub user_id: String,
    /// Role claim, e.g. `usuario` or `admin-general`.
    pub role: String,
    /// Company the user belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    /// Platform-wide administrator flag.
    #[serde(default)]
    pub is_global_admin: bool,
}

impl UserPrincipal {
    /// Personal room of this user.
    #[must_use]
    pub fn room(&self) -> String {
        user_room(&self.user_id)
    }
}

/// Identity attached to a request or connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Principal {
    /// Inter-service call authenticated by the shared secret.
    Service(ServicePrincipal),
    /// End-user session authenticated by a signed token.
    User(UserPrincipal),
}

impl Principal {
    /// Personal room, for users only.
    #[must_use]
    pub fn personal_room(&self) -> Option<String> {
        match self {
            Self::User(user) => Some(user.room()),
            Self::Service(_) => None,
        }
    }

    /// Short label for logs. Never contains credentials.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Service(service) => format!("service:{}", service.service_name),
            Self::User(user) => user_room(&user.user_id),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    fn user(id: &str) -> UserPrincipal {
        UserPrincipal {
            user_id: id.to_string(),
            role: "usuario".to_string(),
            company_id: None,
            is_global_admin: false,
        }
    }

    #[test]
    fn test_room_is_derived_from_user_id() {
        assert_eq!(user_room("u42"), "user:u42");
        assert_eq!(user("u42").room(), "user:u42");
        assert_eq!(
            Principal::User(user("u7")).personal_room().as_deref(),
            Some("user:u7")
        );
    }

    #[test]
    fn test_services_have_no_personal_room() {
        let principal = Principal::Service(ServicePrincipal {
            service_name: "chat-svc".to_string(),
        });
        assert_eq!(principal.personal_room(), None);
        assert_eq!(principal.label(), "service:chat-svc");
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(Principal::User(user("u1"))).unwrap();
        assert_eq!(json["kind"], "user");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["role"], "usuario");
        assert!(json.get("companyId").is_none());
    }
}
