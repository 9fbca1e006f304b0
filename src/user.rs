use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub fullname: String,
    pub email: String,
    /// Number the callee is bridged to once the greeting has played.
    #[serde(default, alias = "phone_number")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl User {
    pub fn callback_number(&self) -> Option<&str> {
        self.phone_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;
}

pub struct MemoryUserDirectory {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserDirectory {
    pub fn new(builtin_users: Vec<User>) -> Self {
        info!("creating MemoryUserDirectory, users: {}", builtin_users.len());
        Self {
            users: Mutex::new(
                builtin_users
                    .into_iter()
                    .map(|user| (user.id.clone(), user))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.lock().await.get(id).cloned())
    }
}
