use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub nickname: String,
    pub email: String,
    pub phone: String,
}

impl User {
    fn sample(nickname: &str) -> Self {
        Self {
            nickname: nickname.to_string(),
            email: format!("{}@email.com", nickname),
            phone: "13511235123".to_string(),
        }
    }
}

pub async fn hello_v1() -> Json<User> {
    Json(User::sample("a1"))
}

pub async fn hello_v2() -> Json<User> {
    Json(User::sample("a2"))
}
