//! The `acl` module decides who may publish or subscribe where.
//!
//! - `matcher`: wildcard topic matching.
//! - `model`: users, their topic grants and the per-user rights query.
//! - `authorizer`: the authenticate/authorize queries a broker asks.

pub mod authorizer;
pub mod matcher;
pub mod model;

pub use authorizer::{Access, AclDecision, Authorizer};
pub use model::{Topic, TopicAuth, User, UserDraft, UserSummary};
