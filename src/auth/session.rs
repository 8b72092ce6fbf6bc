use uuid::Uuid;

/// Mints an opaque session token.
///
/// A v4 UUID carries 122 random bits, rendered as 32 lowercase hex digits.
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}
