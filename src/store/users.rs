//! In-memory user directory

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::game::{PlayerId, PlayerInfo};

const MAX_NAME_LEN: usize = 32;

/// Registered user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: PlayerId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo::new(self.id.clone(), self.name.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("Name must not be empty")]
    EmptyName,

    #[error("Name must be at most {MAX_NAME_LEN} characters")]
    NameTooLong,

    #[error("User not found: {0}")]
    NotFound(PlayerId),
}

impl UserError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UserError::EmptyName | UserError::NameTooLong => ErrorKind::Validation,
            UserError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// Registry of known players, keyed by ID
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: DashMap<PlayerId, User>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new user under a fresh ID
    pub fn register(&self, name: &str) -> Result<User, UserError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(UserError::EmptyName);
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(UserError::NameTooLong);
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.users.insert(user.id.clone(), user.clone());

        info!(user_id = %user.id, name = %user.name, "User registered");
        Ok(user)
    }

    pub fn get(&self, id: &str) -> Option<User> {
        self.users.get(id).map(|u| u.value().clone())
    }

    /// Resolve a user or fail with `NotFound`
    pub fn resolve(&self, id: &str) -> Result<User, UserError> {
        self.get(id).ok_or_else(|| UserError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_register_and_resolve() {
        let users = UserDirectory::new();
        let alice = assert_ok!(users.register("  Alice "));

        assert_eq!(alice.name, "Alice");
        assert!(Uuid::parse_str(&alice.id).is_ok());
        assert_eq!(assert_ok!(users.resolve(&alice.id)), alice);
        assert_eq!(alice.info(), PlayerInfo::new(alice.id.clone(), "Alice"));
    }

    #[test]
    fn test_register_validates_name() {
        let users = UserDirectory::new();
        assert!(matches!(users.register("   "), Err(UserError::EmptyName)));
        assert!(matches!(
            users.register(&"x".repeat(MAX_NAME_LEN + 1)),
            Err(UserError::NameTooLong)
        ));
        assert_eq!(users.len(), 0);
    }

    #[test]
    fn test_unknown_user() {
        let users = UserDirectory::new();
        assert!(users.get("ghost").is_none());
        assert_err!(users.resolve("ghost"));
        assert!(matches!(users.resolve("ghost"), Err(UserError::NotFound(_))));
    }
}
