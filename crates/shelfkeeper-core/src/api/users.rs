use crate::auth::manager::CURRENT_USER_ENDPOINT;
use crate::models::{NewUser, User, UserUpdate};

use super::pagination::fetch_all;
use super::{to_json, ApiError, Gateway, RequestOptions};

const USERS_ENDPOINT: &str = "users/";

/// Account management. Listing and changing other users is restricted to
/// staff server-side.
#[derive(Clone)]
pub struct UsersClient {
    gateway: Gateway,
}

impl UsersClient {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn list(&self) -> Result<Vec<User>, ApiError> {
        fetch_all(&self.gateway, USERS_ENDPOINT).await
    }

    /// The signed-in user's own record
    pub async fn me(&self) -> Result<User, ApiError> {
        self.gateway.get_json(CURRENT_USER_ENDPOINT).await
    }

    pub async fn create(&self, user: &NewUser) -> Result<User, ApiError> {
        self.gateway
            .send_json(USERS_ENDPOINT, RequestOptions::post_json(to_json(user)?))
            .await
    }

    pub async fn update(&self, id: i64, user: &UserUpdate) -> Result<User, ApiError> {
        self.gateway
            .send_json(&user_endpoint(id), RequestOptions::put_json(to_json(user)?))
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.gateway
            .send_empty(&user_endpoint(id), RequestOptions::delete())
            .await
    }
}

fn user_endpoint(id: i64) -> String {
    format!("{}{}/", USERS_ENDPOINT, id)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::api::transport::RequestBody;
    use crate::auth::{MemoryTokenStore, SessionManager};
    use crate::testutil::{Reply, ScriptedTransport, BASE_URL};

    fn client(transport: &Arc<ScriptedTransport>) -> UsersClient {
        let manager = SessionManager::new(BASE_URL, transport.clone(), Arc::new(MemoryTokenStore::new()));
        UsersClient::new(manager.gateway())
    }

    #[tokio::test]
    async fn test_list_and_me() {
        let transport = ScriptedTransport::new();
        transport.route(Method::GET, "users/", |_| {
            Reply::json(200, json!([{ "id": 1, "username": "ana" }, { "id": 2, "username": "bia", "is_staff": true }]))
        });
        transport.route(Method::GET, "users/me/", |_| Reply::json(200, json!({ "id": 2, "username": "bia" })));

        let users = client(&transport);
        let all = users.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[1].is_staff);
        assert_eq!(users.me().await.unwrap().username, "bia");
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let transport = ScriptedTransport::new();
        transport.route(Method::POST, "users/", |_| Reply::json(201, json!({ "id": 3, "username": "caio" })));
        transport.route(Method::PUT, "users/3/", |_| {
            Reply::json(200, json!({ "id": 3, "username": "caio", "turma": "9A" }))
        });
        transport.route(Method::DELETE, "users/3/", |_| Reply::Respond(204, String::new()));

        let users = client(&transport);
        let created = users
            .create(&NewUser {
                username: "caio".to_string(),
                password: "pw".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut update = UserUpdate::from(&created);
        update.turma = Some("9A".to_string());
        let updated = users.update(created.id, &update).await.unwrap();
        assert_eq!(updated.turma.as_deref(), Some("9A"));
        users.delete(created.id).await.unwrap();

        let sent = transport.requests_to(&Method::PUT, "users/3/");
        assert!(matches!(&sent[0].body, RequestBody::Json(body) if body["turma"] == "9A"));
    }

    #[tokio::test]
    async fn test_delete_forbidden_is_surfaced() {
        let transport = ScriptedTransport::new();
        transport.route(Method::DELETE, "users/1/", |_| {
            Reply::json(403, json!({ "detail": "You do not have permission to perform this action." }))
        });

        let err = client(&transport).delete(1).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
    }
}
