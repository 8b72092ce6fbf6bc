//! User and Topic records, and the per-user topic authorization query.
//!
//! Field names on the wire are fixed: a `User` serializes as
//! `{username, password, admin, createTS, updateTS, token, topics}` and a
//! `Topic` as `{topicstring, pub, sub}`. The `password` field only ever holds
//! a bcrypt hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acl::matcher::{self, LEVEL_SEPARATOR};
use crate::utils::{Result, StoreError};

/// A permission grant on a topic pattern. Not a live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(rename = "topicstring")]
    pub pattern: String,
    #[serde(rename = "pub", default)]
    pub can_publish: bool,
    #[serde(rename = "sub", default)]
    pub can_subscribe: bool,
}

impl Topic {
    pub fn new(pattern: impl Into<String>, can_publish: bool, can_subscribe: bool) -> Self {
        Self {
            pattern: pattern.into(),
            can_publish,
            can_subscribe,
        }
    }

    /// Checks a grant before it is created or edited.
    pub fn validate(&self) -> Result<()> {
        if self.pattern.is_empty() {
            return Err(StoreError::Validation("topic cannot be blank".into()));
        }
        if self.pattern.ends_with(LEVEL_SEPARATOR) {
            return Err(StoreError::Validation(format!(
                "topic '{}' cannot end with a /",
                self.pattern
            )));
        }
        if !self.can_publish && !self.can_subscribe {
            return Err(StoreError::Validation(
                "pub and sub cannot both be false".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of evaluating one concrete topic against every grant a user holds.
///
/// `matched == false` means no pattern applied at all, which callers must
/// report as "not found" rather than "no rights".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopicAuth {
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub matched: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(rename = "password")]
    pub password_hash: String,
    #[serde(rename = "admin", default)]
    pub is_admin: bool,
    #[serde(rename = "createTS", default, with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updateTS", default, with = "timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "token", default, with = "token")]
    pub session_token: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub topics: Vec<Topic>,
}

impl User {
    /// Builds a fresh record around an already computed password hash.
    pub fn new(username: impl Into<String>, password_hash: String, is_admin: bool) -> Self {
        let now = Utc::now();
        Self {
            username: username.into(),
            password_hash,
            is_admin,
            created_at: Some(now),
            updated_at: Some(now),
            session_token: None,
            topics: Vec::new(),
        }
    }

    /// Evaluates `topic` against every grant. Rights are OR-ed across all
    /// matching patterns.
    pub fn check_topic_auth(&self, topic: &str) -> TopicAuth {
        self.topics
            .iter()
            .filter(|grant| matcher::matches(topic, &grant.pattern))
            .fold(TopicAuth::default(), |acc, grant| TopicAuth {
                can_publish: acc.can_publish || grant.can_publish,
                can_subscribe: acc.can_subscribe || grant.can_subscribe,
                matched: true,
            })
    }

    /// Publish right on `topic`, or `NotFound` when no grant matches.
    pub fn check_topic_pub(&self, topic: &str) -> Result<bool> {
        self.matched_auth(topic).map(|auth| auth.can_publish)
    }

    /// Subscribe right on `topic`, or `NotFound` when no grant matches.
    pub fn check_topic_sub(&self, topic: &str) -> Result<bool> {
        self.matched_auth(topic).map(|auth| auth.can_subscribe)
    }

    fn matched_auth(&self, topic: &str) -> Result<TopicAuth> {
        let auth = self.check_topic_auth(topic);
        if auth.matched {
            Ok(auth)
        } else {
            Err(StoreError::NotFound(format!("topic '{topic}'")))
        }
    }

    /// Exact lookup of a grant by its pattern.
    pub fn find_topic(&self, pattern: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.pattern == pattern)
    }

    pub fn add_topic(&mut self, topic: Topic) -> Result<()> {
        if self.find_topic(&topic.pattern).is_some() {
            return Err(StoreError::AlreadyExists(format!(
                "topic '{}' for user '{}'",
                topic.pattern, self.username
            )));
        }
        self.topics.push(topic);
        self.touch();
        Ok(())
    }

    /// Replaces the grant with the same pattern in place.
    pub fn replace_topic(&mut self, topic: Topic) -> Result<()> {
        let slot = self
            .topics
            .iter_mut()
            .find(|t| t.pattern == topic.pattern)
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "topic '{}' for user '{}'",
                    topic.pattern, self.username
                ))
            })?;
        *slot = topic;
        self.touch();
        Ok(())
    }

    /// Removes the grant with `pattern`. Order of the remaining grants is not kept.
    pub fn remove_topic(&mut self, pattern: &str) -> Result<Topic> {
        let idx = self
            .topics
            .iter()
            .position(|t| t.pattern == pattern)
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "topic '{pattern}' for user '{}'",
                    self.username
                ))
            })?;
        let removed = self.topics.swap_remove(idx);
        self.touch();
        Ok(removed)
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            username: self.username.clone(),
            admin: self.is_admin,
        }
    }
}

/// Listing projection that never carries the hash or the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub username: String,
    pub admin: bool,
}

/// Plaintext input for creating or editing a user.
///
/// On edit an empty `password` leaves the stored hash unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserDraft {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub admin: bool,
}

impl UserDraft {
    pub fn new(username: impl Into<String>, password: impl Into<String>, admin: bool) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            admin,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<Topic>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Topic>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timestamps are RFC 3339 strings; an empty or unparseable string reads as none.
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .filter(|s| !s.is_empty())
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|ts| ts.with_timezone(&Utc)))
    }
}

/// No session is written as an empty string.
mod token {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.as_deref().unwrap_or(""))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
    }
}
