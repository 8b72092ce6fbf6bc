//! The `persistence` module keeps the user/topic collection and makes every
//! change durable.
//!
//! [`UserStore`] is the contract the rest of the system talks to. All
//! backends share one write-through cache ([`CachedStore`]) and differ only in
//! where records end up:
//!
//! - `json_store`: a single flat JSON file, rewritten on every change.
//! - `postgres_store`: one row per user in PostgreSQL.
//! - `sled_store`: one key per user in an embedded `sled` database.
//!
//! A store is built once at startup with [`open_store`] and handed to its
//! consumers; there is no global instance.

pub mod cached;
pub mod collection;
pub mod json_store;
pub mod postgres_store;
pub mod sled_store;

use std::sync::Arc;

use async_trait::async_trait;

use crate::acl::model::{Topic, User, UserDraft};
use crate::auth::PasswordHasher;
use crate::config::{StorageKind, StorageSettings};
use crate::utils::Result;

pub use cached::{Backend, CachedStore, Mutation, WriteMode};
pub use collection::UserCollection;
pub use json_store::JsonFileBackend;
pub use postgres_store::PostgresBackend;
pub use sled_store::SledBackend;

/// Loading, querying and mutating the user/topic collection.
///
/// Reads are served from memory. Mutations return success only once the
/// durable write has succeeded.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Replaces the in-memory collection with what durable storage holds.
    async fn load(&self) -> Result<()>;

    /// Verifies `password`; with `issue_token` a fresh session token replaces
    /// any previous one and is returned on the user.
    async fn login(&self, username: &str, password: &str, issue_token: bool) -> Result<User>;

    async fn add_user(&self, user: UserDraft) -> Result<()>;

    /// Updates the admin flag, and the password when one is supplied.
    async fn edit_user(&self, user: UserDraft) -> Result<()>;

    async fn delete_user(&self, username: &str) -> Result<()>;

    /// Loads lazily when the collection is empty.
    async fn get_user_by_token(&self, token: &str) -> Result<User>;

    async fn get_user_by_username(&self, username: &str) -> Result<User>;

    async fn get_users(&self) -> Vec<User>;

    async fn add_topic_to_user(&self, username: &str, topic: Topic) -> Result<()>;

    async fn edit_topic_for_user(&self, username: &str, topic: Topic) -> Result<()>;

    async fn delete_topic_from_user(&self, username: &str, pattern: &str) -> Result<()>;
}

/// Builds the store selected by `settings`. Nothing is loaded yet.
pub async fn open_store(
    settings: &StorageSettings,
    hasher: PasswordHasher,
) -> Result<Arc<dyn UserStore>> {
    let store: Arc<dyn UserStore> = match settings.kind {
        StorageKind::Json => Arc::new(CachedStore::new(
            JsonFileBackend::new(&settings.file),
            hasher,
        )),
        StorageKind::Postgres => Arc::new(CachedStore::new(
            PostgresBackend::connect(&settings.connection_string).await?,
            hasher,
        )),
        StorageKind::Sled => Arc::new(CachedStore::new(
            SledBackend::open(&settings.sled_path)?,
            hasher,
        )),
    };
    Ok(store)
}
