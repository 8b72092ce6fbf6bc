//! The `transport` module exposes the authorization engine to clients over
//! WebSockets.
//!
//! It defines the JSON request/response protocol, the dispatch layer that
//! maps requests onto the user store and the authorizer, and the WebSocket
//! server itself.

pub mod handler;
pub mod message;
pub mod websocket;

pub use handler::Handler;

#[cfg(test)]
mod tests;
