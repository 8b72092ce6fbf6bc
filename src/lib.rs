//! # TopicGate
//!
//! `topicgate` is an authentication and topic-authorization service for
//! publish/subscribe brokers. It keeps users and their per-topic grants,
//! answers "may this client publish or subscribe here" with MQTT-style
//! wildcard matching, and exposes both the broker queries and user
//! administration over WebSockets.
//!
//! ## Core Modules
//!
//! - `acl`: topic matching, the user/grant model and the broker-facing authorizer.
//! - `auth`: password hashing and session tokens.
//! - `config`: loading settings from a file and the environment.
//! - `persistence`: the user store contract, its write-through cache and the
//!   json, postgres and sled backends.
//! - `transport`: the WebSocket server and its request dispatch.
//! - `utils`: error taxonomy and logging setup.

pub mod acl;
pub mod auth;
pub mod config;
pub mod persistence;
pub mod transport;
pub mod utils;
