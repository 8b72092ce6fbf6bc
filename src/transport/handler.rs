//! Request dispatch, independent of the socket.
//!
//! Admin requests need a token whose user is an admin. Read requests about a
//! user (`get_user`, `user_topics`, `check_topic_auth`, a filtered
//! `list_users`) are also open to that user.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::acl::model::{User, UserDraft, UserSummary};
use crate::acl::{Access, AclDecision, Authorizer};
use crate::persistence::UserStore;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::StoreError;

#[derive(Debug, Error)]
enum Rejection {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Rejection {
    fn kind(&self) -> &'static str {
        match self {
            Rejection::BadRequest(_) => "bad_request",
            Rejection::Unauthorized(_) => "unauthorized",
            Rejection::Forbidden(_) => "forbidden",
            Rejection::Store(e) => e.kind(),
        }
    }
}

impl From<Rejection> for ServerMessage {
    fn from(r: Rejection) -> Self {
        ServerMessage::error(r.kind(), r.to_string())
    }
}

type Outcome = std::result::Result<ServerMessage, Rejection>;

fn to_data<T: Serialize>(value: &T) -> std::result::Result<Value, Rejection> {
    Ok(serde_json::to_value(value).map_err(StoreError::from)?)
}

pub struct Handler {
    store: Arc<dyn UserStore>,
    authorizer: Authorizer,
}

impl Handler {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        let authorizer = Authorizer::new(Arc::clone(&store));
        Self { store, authorizer }
    }

    /// Parses one text frame and answers it.
    pub async fn handle_text(&self, text: &str) -> ServerMessage {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle(msg).await,
            Err(e) => {
                warn!(error = %e, "Invalid client message");
                ServerMessage::error("bad_request", format!("invalid request: {e}"))
            }
        }
    }

    pub async fn handle(&self, msg: ClientMessage) -> ServerMessage {
        self.dispatch(msg).await.unwrap_or_else(ServerMessage::from)
    }

    async fn requester(&self, token: &str) -> std::result::Result<User, Rejection> {
        if token.is_empty() {
            return Err(Rejection::Unauthorized("No token provided".into()));
        }
        match self.store.get_user_by_token(token).await {
            Ok(user) => Ok(user),
            Err(e) if e.is_not_found() => Err(Rejection::Unauthorized("Invalid token".into())),
            Err(e) => Err(e.into()),
        }
    }

    async fn admin(&self, token: &str) -> std::result::Result<User, Rejection> {
        let user = self.requester(token).await?;
        if !user.is_admin {
            debug!(username = %user.username, "Admin request refused");
            return Err(Rejection::Forbidden("Insufficient rights".into()));
        }
        Ok(user)
    }

    async fn dispatch(&self, msg: ClientMessage) -> Outcome {
        match msg {
            ClientMessage::Login { username, password } => self.login(&username, &password).await,

            ClientMessage::Authenticate { username, password } => {
                if username.is_empty() || password.is_empty() {
                    return Err(Rejection::BadRequest(
                        "Must provide both a username and password".into(),
                    ));
                }
                match self.authorizer.authenticate(&username, &password).await {
                    Ok(()) => Ok(ServerMessage::ok("Authenticated")),
                    Err(StoreError::NotFound(_) | StoreError::InvalidCredentials) => {
                        Err(Rejection::Unauthorized("Invalid login".into()))
                    }
                    Err(e) => Err(e.into()),
                }
            }

            ClientMessage::Authorize {
                username,
                topic,
                access,
            } => {
                let access: Access = access.parse()?;
                match self.authorizer.authorize(&username, &topic, access).await? {
                    AclDecision::Allow => {
                        Ok(ServerMessage::ok("allow").with_data(json!({ "allowed": true })))
                    }
                    AclDecision::Deny => {
                        Ok(ServerMessage::ok("deny").with_data(json!({ "allowed": false })))
                    }
                    AclDecision::NotFound => Err(StoreError::NotFound(format!(
                        "no grant of '{username}' covers '{topic}'"
                    ))
                    .into()),
                }
            }

            ClientMessage::ListUsers { token, user } => {
                let requester = self.requester(&token).await?;
                let filter = user.filter(|u| !u.is_empty());
                if !requester.is_admin && filter.as_deref() != Some(requester.username.as_str()) {
                    return Err(Rejection::Forbidden("Insufficient rights".into()));
                }

                let listing: Vec<UserSummary> = self
                    .store
                    .get_users()
                    .await
                    .iter()
                    .filter(|u| filter.as_deref().is_none_or(|f| u.username == f))
                    .map(User::summary)
                    .collect();
                Ok(ServerMessage::ok("ok")
                    .with_data(to_data(&listing)?)
                    .with_token(Some(token)))
            }

            ClientMessage::GetUser { token, username } => {
                let requester = self.requester(&token).await?;
                ensure_self_or_admin(&requester, &username)?;
                let user = self.store.get_user_by_username(&username).await?;
                Ok(ServerMessage::ok("ok")
                    .with_data(to_data(&user.summary())?)
                    .with_token(Some(token)))
            }

            ClientMessage::AddUser {
                token,
                username,
                password,
                admin,
            } => {
                let requester = self.admin(&token).await?;
                self.store
                    .add_user(UserDraft::new(username.clone(), password, admin))
                    .await?;
                info!(by = %requester.username, username = %username, "User created");
                Ok(ServerMessage::ok("User added").with_token(Some(token)))
            }

            ClientMessage::EditUser {
                token,
                username,
                password,
                admin,
            } => {
                let requester = self.admin(&token).await?;
                self.store
                    .edit_user(UserDraft::new(username.clone(), password, admin))
                    .await?;
                info!(by = %requester.username, username = %username, "User edited");
                Ok(ServerMessage::ok("User edited").with_token(Some(token)))
            }

            ClientMessage::DeleteUser { token, username } => {
                let requester = self.admin(&token).await?;
                if requester.username == username {
                    return Err(Rejection::BadRequest("You cannot delete yourself".into()));
                }
                self.store.delete_user(&username).await?;
                Ok(ServerMessage::ok("User deleted").with_token(Some(token)))
            }

            ClientMessage::AddTopic {
                token,
                username,
                topic,
            } => {
                self.admin(&token).await?;
                self.store.add_topic_to_user(&username, topic).await?;
                Ok(ServerMessage::ok("Topic added").with_token(Some(token)))
            }

            ClientMessage::EditTopic {
                token,
                username,
                topic,
            } => {
                self.admin(&token).await?;
                self.store.edit_topic_for_user(&username, topic).await?;
                Ok(ServerMessage::ok("Topic modified").with_token(Some(token)))
            }

            ClientMessage::DeleteTopic {
                token,
                username,
                topic,
            } => {
                self.admin(&token).await?;
                if username.is_empty() || topic.is_empty() {
                    return Err(Rejection::BadRequest(
                        "Must provide a username and a topic".into(),
                    ));
                }
                self.store.delete_topic_from_user(&username, &topic).await?;
                Ok(ServerMessage::ok("Topic deleted").with_token(Some(token)))
            }

            ClientMessage::UserTopics {
                token,
                username,
                topic,
            } => {
                let requester = self.requester(&token).await?;
                ensure_self_or_admin(&requester, &username)?;
                let user = self.store.get_user_by_username(&username).await?;

                let data = match topic.as_deref().filter(|t| !t.is_empty()) {
                    None => json!({ "username": user.username, "topics": to_data(&user.topics)? }),
                    Some(pattern) => {
                        let grant = user.find_topic(pattern).ok_or_else(|| {
                            StoreError::NotFound(format!("topic '{pattern}'"))
                        })?;
                        json!({ "username": user.username, "topic": to_data(grant)? })
                    }
                };
                Ok(ServerMessage::ok("ok").with_data(data).with_token(Some(token)))
            }

            ClientMessage::CheckTopicAuth {
                token,
                username,
                topic,
                access,
            } => {
                let requester = self.requester(&token).await?;
                if username.is_empty() || topic.is_empty() || access.is_empty() {
                    return Err(Rejection::BadRequest(
                        "Must provide a username, topic, and access type to check".into(),
                    ));
                }
                ensure_self_or_admin(&requester, &username)?;
                let access: Access = access.parse()?;

                let user = self.store.get_user_by_username(&username).await?;
                let allowed = match access {
                    Access::Publish => user.check_topic_pub(&topic)?,
                    Access::Subscribe => user.check_topic_sub(&topic)?,
                };
                Ok(ServerMessage::ok("ok")
                    .with_data(Value::Bool(allowed))
                    .with_token(Some(token)))
            }
        }
    }

    async fn login(&self, username: &str, password: &str) -> Outcome {
        if username.is_empty() || password.is_empty() {
            return Err(Rejection::BadRequest(
                "Must provide both a username and password".into(),
            ));
        }

        // Unknown users get the same answer as a wrong password.
        let user = match self.store.login(username, password, true).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => return Err(StoreError::InvalidCredentials.into()),
            Err(e) => return Err(e.into()),
        };
        info!(username, "User logged in");

        Ok(ServerMessage::ok("Logged in")
            .with_data(to_data(&user.summary())?)
            .with_token(user.session_token))
    }
}

fn ensure_self_or_admin(requester: &User, username: &str) -> std::result::Result<(), Rejection> {
    if requester.is_admin || requester.username == username {
        Ok(())
    } else {
        Err(Rejection::Forbidden("Insufficient rights".into()))
    }
}
