//! Persistence backed by `sled`
//!
//! Each user is stored under its username in the `users` tree, serialized as
//! the same JSON record the file backend writes. Mutations touch only the
//! affected key and flush before the cache makes them visible.
//!
//! Tree calls run on the blocking pool. On reload users come back ordered by
//! username, not by insertion.

use async_trait::async_trait;
use sled::{Db, Tree};
use tracing::{debug, warn};

use crate::acl::model::User;
use crate::persistence::cached::{Backend, Mutation, WriteMode};
use crate::persistence::collection::UserCollection;
use crate::utils::{Result, StoreError};

const USERS_TREE: &str = "users";

pub struct SledBackend {
    db: Db,
    users: Tree,
}

impl SledBackend {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path)?;
        let users = db.open_tree(USERS_TREE)?;
        Ok(Self { db, users })
    }
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::Storage(format!("sled task: {e}"))
}

#[async_trait]
impl Backend for SledBackend {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::InsideLock
    }

    async fn fetch_all(&self) -> Result<Vec<User>> {
        let users = self.users.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<User>> {
            let mut out = Vec::with_capacity(users.len());
            for entry in users.iter() {
                let (key, value) = entry?;
                let user = serde_json::from_slice::<User>(&value).map_err(|e| {
                    StoreError::Storage(format!(
                        "user record '{}': {e}",
                        String::from_utf8_lossy(&key)
                    ))
                })?;
                out.push(user);
            }
            Ok(out)
        })
        .await
        .map_err(join_error)?
    }

    async fn persist(&self, mutation: &Mutation, _users: Option<&UserCollection>) -> Result<()> {
        // `None` removes the key.
        let (key, value) = match mutation {
            Mutation::InsertUser(user)
            | Mutation::UpdateCredentials(user)
            | Mutation::UpdateRecord(user)
            | Mutation::UpdateToken(user) => (user.username.clone(), Some(serde_json::to_vec(user)?)),
            Mutation::DeleteUser(username) => (username.clone(), None),
        };

        let users = self.users.clone();
        let flushed = tokio::task::spawn_blocking(move || -> Result<usize> {
            match value {
                Some(value) => {
                    users.insert(key.as_bytes(), value)?;
                }
                None => {
                    users.remove(key.as_bytes())?;
                }
            }
            Ok(users.flush()?)
        })
        .await
        .map_err(join_error)??;

        debug!(bytes = flushed, mutation = mutation.label(), "sled flushed");
        Ok(())
    }
}

impl std::fmt::Debug for SledBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledBackend")
            .field("db", &"sled::Db")
            .field("users", &self.users.len())
            .finish()
    }
}

impl Drop for SledBackend {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            warn!(error = %e, "Final sled flush failed");
        }
    }
}
