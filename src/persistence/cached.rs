//! Write-through cache shared by every backend.
//!
//! [`CachedStore`] owns the in-memory [`UserCollection`] behind a read/write
//! lock and implements [`UserStore`] once. A [`Backend`] only knows how to
//! read every record and how to make one [`Mutation`] durable.
//!
//! Two write modes exist:
//! - [`WriteMode::InsideLock`]: the mutation is applied to a copy of the
//!   collection, persisted while the write lock is held, and only then made
//!   visible. A failed durable write leaves memory untouched.
//! - [`WriteMode::AfterUnlock`]: the mutation is applied in memory, the lock
//!   is released, then the targeted statement runs. This is best-effort
//!   write-through: if the durable write fails (or the process dies in
//!   between) memory and storage disagree until the next `load()`. The error
//!   is still returned to the caller.
//!
//! Durable writes of the second mode are serialized by a write-order mutex
//! taken before the collection lock is released, so they reach storage in
//! the order they were applied in memory.

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::acl::model::{Topic, User, UserDraft};
use crate::auth::{PasswordHasher, new_token};
use crate::persistence::UserStore;
use crate::persistence::collection::UserCollection;
use crate::utils::{Result, StoreError};

/// A change that has already been applied to the in-memory collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    InsertUser(User),
    /// Password hash and admin flag changed.
    UpdateCredentials(User),
    /// Whole record rewritten (topic grants changed).
    UpdateRecord(User),
    UpdateToken(User),
    DeleteUser(String),
}

impl Mutation {
    pub fn label(&self) -> &'static str {
        match self {
            Mutation::InsertUser(_) => "insert_user",
            Mutation::UpdateCredentials(_) => "update_credentials",
            Mutation::UpdateRecord(_) => "update_record",
            Mutation::UpdateToken(_) => "update_token",
            Mutation::DeleteUser(_) => "delete_user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    InsideLock,
    AfterUnlock,
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn write_mode(&self) -> WriteMode;

    /// Reads every user record from durable storage.
    async fn fetch_all(&self) -> Result<Vec<User>>;

    /// Makes `mutation` durable. `users` is the full collection after the
    /// change for [`WriteMode::InsideLock`] backends and `None` otherwise.
    async fn persist(&self, mutation: &Mutation, users: Option<&UserCollection>) -> Result<()>;
}

pub struct CachedStore<B> {
    backend: B,
    users: RwLock<UserCollection>,
    /// Held from the in-memory change until its durable write is done.
    persist_order: Mutex<()>,
    hasher: PasswordHasher,
}

impl<B: Backend> CachedStore<B> {
    pub fn new(backend: B, hasher: PasswordHasher) -> Self {
        info!(backend = backend.name(), "Storage backend selected");
        Self {
            backend,
            users: RwLock::new(UserCollection::default()),
            persist_order: Mutex::new(()),
            hasher,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Applies `apply` under the write lock and persists the resulting mutation.
    async fn commit<T, F>(&self, apply: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut UserCollection) -> Result<(T, Mutation)> + Send,
    {
        match self.backend.write_mode() {
            WriteMode::InsideLock => {
                let mut guard = self.users.write().await;
                let mut next = guard.clone();
                let (out, mutation) = apply(&mut next)?;
                self.persist(&mutation, Some(&next)).await?;
                *guard = next;
                Ok(out)
            }
            WriteMode::AfterUnlock => {
                let (out, mutation, _order) = {
                    let mut guard = self.users.write().await;
                    let (out, mutation) = apply(&mut *guard)?;
                    (out, mutation, self.persist_order.lock().await)
                };
                self.persist(&mutation, None).await?;
                Ok(out)
            }
        }
    }

    async fn persist(&self, mutation: &Mutation, users: Option<&UserCollection>) -> Result<()> {
        self.backend
            .persist(mutation, users)
            .await
            .inspect_err(|e| {
                error!(
                    backend = self.backend.name(),
                    mutation = mutation.label(),
                    error = %e,
                    "Durable write failed"
                );
            })
    }
}

#[async_trait]
impl<B: Backend> UserStore for CachedStore<B> {
    async fn load(&self) -> Result<()> {
        let users = self.backend.fetch_all().await.inspect_err(|e| {
            error!(backend = self.backend.name(), error = %e, "Loading users failed");
        })?;
        let count = users.len();
        *self.users.write().await = UserCollection::new(users);
        info!(backend = self.backend.name(), users = count, "Users loaded");
        Ok(())
    }

    async fn login(&self, username: &str, password: &str, issue_token: bool) -> Result<User> {
        let user = self.get_user_by_username(username).await?;

        if !self.hasher.verify(password, &user.password_hash).await? {
            debug!(username, "Password mismatch");
            return Err(StoreError::InvalidCredentials);
        }
        if !issue_token {
            return Ok(user);
        }

        let token = new_token();
        self.commit(move |users| {
            if let Some(holder) = users.by_token(&token).filter(|u| u.username != username) {
                warn!(holder = %holder.username, username, "Issued token already held by another user");
            }
            let user = users.get_mut(username)?;
            user.session_token = Some(token);
            user.touch();
            let updated = user.clone();
            Ok((updated.clone(), Mutation::UpdateToken(updated)))
        })
        .await
    }

    async fn add_user(&self, draft: UserDraft) -> Result<()> {
        if draft.username.is_empty() || draft.password.is_empty() {
            return Err(StoreError::Validation(
                "username and password must both be non-blank".into(),
            ));
        }
        if self.users.read().await.contains(&draft.username) {
            return Err(StoreError::AlreadyExists(format!("user '{}'", draft.username)));
        }

        let hash = self.hasher.hash(&draft.password).await?;
        let username = draft.username.clone();
        let user = User::new(draft.username, hash, draft.admin);

        self.commit(move |users| {
            // Re-checked under the write lock: a concurrent add may have won.
            users.insert(user.clone())?;
            Ok(((), Mutation::InsertUser(user)))
        })
        .await?;
        info!(username = %username, "User added");
        Ok(())
    }

    async fn edit_user(&self, draft: UserDraft) -> Result<()> {
        if draft.username.is_empty() {
            return Err(StoreError::Validation("username must be non-blank".into()));
        }

        let stored = self.get_user_by_username(&draft.username).await?;
        let new_hash = self
            .hasher
            .rehash_if_changed(&stored.password_hash, &draft.password)
            .await?;

        self.commit(move |users| {
            let user = users.get_mut(&draft.username)?;
            apply_credentials(user, &draft, new_hash);
            Ok(((), Mutation::UpdateCredentials(user.clone())))
        })
        .await
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        self.commit(|users| {
            users.remove(username)?;
            Ok(((), Mutation::DeleteUser(username.to_owned())))
        })
        .await?;
        info!(username, "User deleted");
        Ok(())
    }

    async fn get_user_by_token(&self, token: &str) -> Result<User> {
        if self.users.read().await.is_empty() {
            self.load().await?;
        }
        self.users
            .read()
            .await
            .by_token(token)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("no user holds that token".into()))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User> {
        self.users
            .read()
            .await
            .get(username)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user '{username}'")))
    }

    async fn get_users(&self) -> Vec<User> {
        self.users.read().await.users().to_vec()
    }

    async fn add_topic_to_user(&self, username: &str, topic: Topic) -> Result<()> {
        topic.validate()?;
        self.commit(|users| {
            let user = users.get_mut(username)?;
            user.add_topic(topic)?;
            Ok(((), Mutation::UpdateRecord(user.clone())))
        })
        .await
    }

    async fn edit_topic_for_user(&self, username: &str, topic: Topic) -> Result<()> {
        topic.validate()?;
        self.commit(|users| {
            let user = users.get_mut(username)?;
            user.replace_topic(topic)?;
            Ok(((), Mutation::UpdateRecord(user.clone())))
        })
        .await
    }

    async fn delete_topic_from_user(&self, username: &str, pattern: &str) -> Result<()> {
        self.commit(|users| {
            let user = users.get_mut(username)?;
            user.remove_topic(pattern)?;
            Ok(((), Mutation::UpdateRecord(user.clone())))
        })
        .await
    }
}

/// Writes an edit onto the current record.
///
/// `new_hash` was computed against a snapshot taken before the write lock.
/// If the record changed since and `draft.password` now equals the stored
/// hash, it is not a new password and the stored hash stays.
pub(crate) fn apply_credentials(user: &mut User, draft: &UserDraft, new_hash: Option<String>) {
    user.is_admin = draft.admin;
    if let Some(hash) = new_hash.filter(|_| draft.password != user.password_hash) {
        user.password_hash = hash;
    }
    user.touch();
}
