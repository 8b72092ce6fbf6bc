//! The in-memory authorization cache.
//!
//! Users are kept in insertion order and keyed by username. Lookup by session
//! token is a linear scan that returns the first holder.

use tracing::warn;

use crate::acl::model::User;
use crate::utils::{Result, StoreError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserCollection {
    users: Vec<User>,
}

impl UserCollection {
    pub fn new(users: Vec<User>) -> Self {
        Self { users }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn contains(&self, username: &str) -> bool {
        self.get(username).is_some()
    }

    pub fn get(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn get_mut(&mut self, username: &str) -> Result<&mut User> {
        self.users
            .iter_mut()
            .find(|u| u.username == username)
            .ok_or_else(|| StoreError::NotFound(format!("user '{username}'")))
    }

    /// First user holding `token`. Further holders are logged, not resolved.
    pub fn by_token(&self, token: &str) -> Option<&User> {
        let mut holders = self
            .users
            .iter()
            .filter(|u| u.session_token.as_deref() == Some(token));
        let first = holders.next()?;
        for other in holders {
            warn!(
                first = %first.username,
                other = %other.username,
                "Session token held by more than one user"
            );
        }
        Some(first)
    }

    pub fn insert(&mut self, user: User) -> Result<()> {
        if self.contains(&user.username) {
            return Err(StoreError::AlreadyExists(format!(
                "user '{}'",
                user.username
            )));
        }
        self.users.push(user);
        Ok(())
    }

    /// Removes `username`; the last user takes its slot.
    pub fn remove(&mut self, username: &str) -> Result<User> {
        let idx = self
            .users
            .iter()
            .position(|u| u.username == username)
            .ok_or_else(|| StoreError::NotFound(format!("user '{username}'")))?;
        Ok(self.users.swap_remove(idx))
    }
}
