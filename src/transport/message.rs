use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::acl::model::Topic;

/// Requests accepted over the socket, tagged by `type`.
///
/// Every admin or self-service request carries the session `token` obtained
/// from `login`. A missing token reads as empty and is refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Login {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },

    /// Broker connect check; never issues a token.
    Authenticate {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },

    /// Broker publish/subscribe check. `access` is `1`/`sub` or `2`/`pub`.
    Authorize {
        username: String,
        topic: String,
        access: String,
    },

    ListUsers {
        #[serde(default)]
        token: String,
        /// Restricts the listing to one username.
        #[serde(default)]
        user: Option<String>,
    },

    GetUser {
        #[serde(default)]
        token: String,
        username: String,
    },

    AddUser {
        #[serde(default)]
        token: String,
        username: String,
        #[serde(default)]
        password: String,
        #[serde(default)]
        admin: bool,
    },

    /// An empty `password` keeps the current one.
    EditUser {
        #[serde(default)]
        token: String,
        username: String,
        #[serde(default)]
        password: String,
        #[serde(default)]
        admin: bool,
    },

    DeleteUser {
        #[serde(default)]
        token: String,
        username: String,
    },

    AddTopic {
        #[serde(default)]
        token: String,
        username: String,
        topic: Topic,
    },

    EditTopic {
        #[serde(default)]
        token: String,
        username: String,
        topic: Topic,
    },

    DeleteTopic {
        #[serde(default)]
        token: String,
        username: String,
        topic: String,
    },

    /// All grants of a user, or the one whose pattern equals `topic`.
    UserTopics {
        #[serde(default)]
        token: String,
        username: String,
        #[serde(default)]
        topic: Option<String>,
    },

    CheckTopicAuth {
        #[serde(default)]
        token: String,
        username: String,
        topic: String,
        access: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ok {
        message: String,
        #[serde(default)]
        data: Option<Value>,
        /// The session token the requester used, or the one just issued.
        #[serde(default)]
        token: Option<String>,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn ok(message: impl Into<String>) -> Self {
        ServerMessage::Ok {
            message: message.into(),
            data: None,
            token: None,
        }
    }

    pub fn with_data(self, value: Value) -> Self {
        match self {
            ServerMessage::Ok { message, token, .. } => ServerMessage::Ok {
                message,
                data: Some(value),
                token,
            },
            other => other,
        }
    }

    pub fn with_token(self, value: Option<String>) -> Self {
        match self {
            ServerMessage::Ok { message, data, .. } => ServerMessage::Ok {
                message,
                data,
                token: value,
            },
            other => other,
        }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ServerMessage::Ok { .. })
    }
}
