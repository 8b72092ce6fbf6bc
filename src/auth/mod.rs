//! The `auth` module covers credentials: bcrypt password hashing and session
//! token issuance. The login flow itself lives on the stores, which own the
//! user records the token is written to.

pub mod password;
pub mod session;

pub use password::PasswordHasher;
pub use session::new_token;

#[cfg(test)]
mod tests;
