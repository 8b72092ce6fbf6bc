//! Broker-facing queries.
//!
//! A message broker asks two things: may this client connect
//! ([`Authorizer::authenticate`]) and may it publish or subscribe on a topic
//! ([`Authorizer::authorize`]).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::acl::matcher;
use crate::persistence::UserStore;
use crate::utils::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Subscribe,
    Publish,
}

impl FromStr for Access {
    type Err = StoreError;

    /// Brokers send `1`/`2`; the admin surface sends `sub`/`pub`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "1" | "sub" | "subscribe" => Ok(Access::Subscribe),
            "2" | "pub" | "publish" => Ok(Access::Publish),
            other => Err(StoreError::Validation(format!(
                "access type must be 'pub' or 'sub', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Subscribe => "sub",
            Access::Publish => "pub",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDecision {
    Allow,
    Deny,
    /// Unknown user, or no grant of that user matches the topic.
    NotFound,
}

impl AclDecision {
    pub fn is_allowed(self) -> bool {
        self == AclDecision::Allow
    }
}

#[derive(Clone)]
pub struct Authorizer {
    store: Arc<dyn UserStore>,
}

impl Authorizer {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Succeeds iff the credentials verify. No session token is issued.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        self.store.login(username, password, false).await?;
        debug!(username, "Broker client authenticated");
        Ok(())
    }

    /// Decides `access` on the concrete `topic` for `username`.
    ///
    /// Publishing is never allowed on a topic that itself carries `+` or `#`,
    /// whatever the grants say.
    pub async fn authorize(&self, username: &str, topic: &str, access: Access) -> Result<AclDecision> {
        let user = match self.store.get_user_by_username(username).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Ok(AclDecision::NotFound),
            Err(e) => return Err(e),
        };

        let auth = user.check_topic_auth(topic);
        if !auth.matched {
            debug!(username, topic, "No grant matches topic");
            return Ok(AclDecision::NotFound);
        }

        let allowed = match access {
            Access::Subscribe => auth.can_subscribe,
            Access::Publish => auth.can_publish && !matcher::has_wildcards(topic),
        };
        debug!(username, topic, %access, allowed, "ACL evaluated");

        Ok(if allowed {
            AclDecision::Allow
        } else {
            AclDecision::Deny
        })
    }
}
