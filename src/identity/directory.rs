//! User Directory
//!
//! Maps a token subject to the display name other participants see.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::config::UserEntry;

/// Errors from a user directory backend
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Lookup of display names by subject
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns `None` when the subject is unknown
    async fn display_name(&self, subject: &str) -> Result<Option<String>, DirectoryError>;
}

/// Directory held in memory, seeded from configuration
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, String>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[UserEntry]) -> Self {
        let users = entries
            .iter()
            .map(|u| (u.email.clone(), u.name.clone()))
            .collect();

        Self {
            users: RwLock::new(users),
        }
    }

    pub async fn insert(&self, email: impl Into<String>, name: impl Into<String>) {
        self.users.write().await.insert(email.into(), name.into());
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn display_name(&self, subject: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.users.read().await.get(subject).cloned())
    }
}
