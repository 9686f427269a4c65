// src/entity/user.rs
use serde::{Deserialize, Serialize};

fn default_active() -> bool {
    true
}

/// A user as stored, including the password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(rename = "password")]
    pub password_hash: String,
    pub roles: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// A user as returned to callers; the password hash never leaves the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub roles: Vec<String>,
    pub active: bool,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            roles: user.roles,
            active: user.active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_reads_stored_password_key() {
        let user: User = serde_json::from_value(json!({
            "id": "u1",
            "username": "alice",
            "password": "$2b$10$hash",
            "roles": ["Employee"],
        }))
        .unwrap();

        assert_eq!(user.password_hash, "$2b$10$hash");
        assert!(user.active);
    }

    #[test]
    fn test_summary_has_no_password() {
        let user = User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            password_hash: "secret".to_string(),
            roles: vec!["Admin".to_string()],
            active: false,
        };

        let json = serde_json::to_value(UserSummary::from(user)).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["username"], "alice");
        assert_eq!(json["active"], false);
    }
}
