use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// An account as returned by `users/` and `users/me/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    /// School class the user belongs to
    #[serde(default)]
    pub turma: Option<String>,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from_flags(self.is_staff, self.is_superuser)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turma: Option<String>,
    pub is_staff: bool,
}

/// Full replacement of a user's editable fields (`PUT users/{id}/`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserUpdate {
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turma: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
    /// Left out of the payload unless the password is being changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl From<&User> for UserUpdate {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            turma: user.turma.clone(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            password: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role() {
        let user: User = serde_json::from_str(
            r#"{"id": 9, "username": "dona.marta", "is_staff": true, "turma": null}"#,
        )
        .unwrap();
        assert_eq!(user.role(), Role::Admin);
        assert_eq!(user.email, "");
    }

    #[test]
    fn test_new_user_omits_empty_fields() {
        let payload = serde_json::to_value(NewUser {
            username: "joao".to_string(),
            password: "s3nha".to_string(),
            turma: Some("7B".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(payload["turma"], "7B");
        assert!(payload.get("email").is_none());
        assert_eq!(payload["is_staff"], false);
    }

    #[test]
    fn test_update_from_user_keeps_password_out() {
        let user = User {
            id: 1,
            username: "ana".to_string(),
            email: "ana@escola.example".to_string(),
            is_staff: false,
            is_superuser: false,
            turma: Some("8A".to_string()),
        };
        let payload = serde_json::to_value(UserUpdate::from(&user)).unwrap();
        assert!(payload.get("password").is_none());
        assert_eq!(payload["username"], "ana");
    }
}
