//! Flat-file backend.
//!
//! The whole collection is one JSON array of user records. Every mutation
//! rewrites the file while the cache's write lock is held; the new content
//! goes to a sibling temp file first and is renamed over the old one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error};

use crate::acl::model::User;
use crate::persistence::cached::{Backend, Mutation, WriteMode};
use crate::persistence::collection::UserCollection;
use crate::utils::{Result, StoreError};

pub const DEFAULT_USERS_FILE: &str = "assets/users.json";

#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// An empty path falls back to [`DEFAULT_USERS_FILE`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path = if path.as_os_str().is_empty() {
            PathBuf::from(DEFAULT_USERS_FILE)
        } else {
            path.to_path_buf()
        };
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_all(&self, users: &[User]) -> Result<()> {
        let body = serde_json::to_vec_pretty(users)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), users = users.len(), "Users file written");
        Ok(())
    }
}

#[async_trait]
impl Backend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::InsideLock
    }

    async fn fetch_all(&self) -> Result<Vec<User>> {
        let content = tokio::fs::read(&self.path).await.map_err(|e| {
            error!(path = %self.path.display(), error = %e, "Error reading users file");
            StoreError::Storage(format!("reading {}: {e}", self.path.display()))
        })?;

        serde_json::from_slice::<Option<Vec<User>>>(&content)
            .map(Option::unwrap_or_default)
            .map_err(|e| {
                error!(path = %self.path.display(), error = %e, "Error parsing users file");
                StoreError::Storage(format!("parsing {}: {e}", self.path.display()))
            })
    }

    async fn persist(&self, _mutation: &Mutation, users: Option<&UserCollection>) -> Result<()> {
        let users = users.ok_or_else(|| {
            StoreError::Storage("json backend needs the full collection to write".into())
        })?;
        self.write_all(users.users()).await
    }
}
