//! PostgreSQL storage backend
//!
//! One row per user in `hmqusers`; topic grants live in a JSONB column using
//! the same `{topicstring, pub, sub}` shape as the file backend. Each
//! mutation runs one targeted statement after the cache lock is released.

use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::acl::model::{Topic, User};
use crate::persistence::cached::{Backend, Mutation, WriteMode};
use crate::persistence::collection::UserCollection;
use crate::utils::{Result, StoreError};

pub struct PostgresBackend {
    pool: Pool,
}

impl PostgresBackend {
    /// Connects with a `postgres://` URL or key/value connection string and
    /// makes sure the table exists.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        if connection_string.is_empty() {
            return Err(StoreError::Validation(
                "postgres storage needs a connection string".into(),
            ));
        }

        let mut cfg = Config::new();
        cfg.url = Some(connection_string.to_string());
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Storage(format!("postgres pool: {e}")))?;

        let backend = Self { pool };
        backend.ensure_schema().await?;
        info!("Postgres storage connected");
        Ok(backend)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS hmqusers (
                    username TEXT PRIMARY KEY,
                    pwd TEXT NOT NULL,
                    token TEXT,
                    admin BOOLEAN NOT NULL DEFAULT FALSE,
                    topics JSONB NOT NULL DEFAULT '[]'
                );

                CREATE INDEX IF NOT EXISTS hmqusers_token_idx ON hmqusers(token);
                "#,
            )
            .await?;
        Ok(())
    }

    /// Removes every row. Only meant for test isolation.
    pub async fn truncate(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.execute("DELETE FROM hmqusers", &[]).await?;
        Ok(())
    }
}

fn topics_json(user: &User) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(&user.topics)?)
}

#[async_trait]
impl Backend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::AfterUnlock
    }

    async fn fetch_all(&self) -> Result<Vec<User>> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT username, pwd, token, admin, topics FROM hmqusers", &[])
            .await?;

        rows.iter()
            .map(|row| {
                let username: String = row.get(0);
                let password_hash: Option<String> = row.get(1);
                let token: Option<String> = row.get(2);
                let admin: Option<bool> = row.get(3);
                let topics: Option<serde_json::Value> = row.get(4);

                let topics = match topics {
                    Some(value) => serde_json::from_value::<Option<Vec<Topic>>>(value)
                        .map_err(|e| {
                            StoreError::Storage(format!("topics of user '{username}': {e}"))
                        })?
                        .unwrap_or_default(),
                    None => Vec::new(),
                };

                Ok(User {
                    username,
                    password_hash: password_hash.unwrap_or_default(),
                    is_admin: admin.unwrap_or(false),
                    session_token: token.filter(|t| !t.is_empty()),
                    topics,
                    ..User::default()
                })
            })
            .collect()
    }

    async fn persist(&self, mutation: &Mutation, _users: Option<&UserCollection>) -> Result<()> {
        let client = self.pool.get().await?;

        let affected = match mutation {
            Mutation::InsertUser(user) => {
                let topics = topics_json(user)?;
                client
                    .execute(
                        "INSERT INTO hmqusers (username, pwd, admin, topics) VALUES ($1, $2, $3, $4)",
                        &[&user.username, &user.password_hash, &user.is_admin, &topics],
                    )
                    .await?
            }
            Mutation::UpdateCredentials(user) => {
                client
                    .execute(
                        "UPDATE hmqusers SET pwd = $1, admin = $2 WHERE username = $3",
                        &[&user.password_hash, &user.is_admin, &user.username],
                    )
                    .await?
            }
            Mutation::UpdateRecord(user) => {
                let topics = topics_json(user)?;
                client
                    .execute(
                        "UPDATE hmqusers SET pwd = $1, admin = $2, topics = $3 WHERE username = $4",
                        &[&user.password_hash, &user.is_admin, &topics, &user.username],
                    )
                    .await?
            }
            Mutation::UpdateToken(user) => {
                client
                    .execute(
                        "UPDATE hmqusers SET token = $1 WHERE username = $2",
                        &[&user.session_token, &user.username],
                    )
                    .await?
            }
            Mutation::DeleteUser(username) => {
                client
                    .execute("DELETE FROM hmqusers WHERE username = $1", &[username])
                    .await?
            }
        };

        if affected == 0 {
            return Err(StoreError::Storage(format!(
                "{} touched no row",
                mutation.label()
            )));
        }
        debug!(mutation = mutation.label(), rows = affected, "Postgres write done");
        Ok(())
    }
}
