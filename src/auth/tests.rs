use super::password::{self, PasswordHasher};
use super::session::new_token;
use std::collections::HashSet;

fn hasher() -> PasswordHasher {
    PasswordHasher::new(password::MIN_COST)
}

#[tokio::test]
async fn test_hash_is_not_plaintext_and_verifies() {
    let hasher = hasher();
    let hash = hasher.hash("s3cret").await.unwrap();

    assert_ne!(hash, "s3cret");
    assert!(hasher.verify("s3cret", &hash).await.unwrap());
    assert!(!hasher.verify("wrong", &hash).await.unwrap());
}

#[tokio::test]
async fn test_verify_against_garbage_hash_is_false() {
    let hasher = hasher();
    assert!(!hasher.verify("s3cret", "not-a-bcrypt-hash").await.unwrap());
    assert!(!hasher.verify("s3cret", "").await.unwrap());
}

#[tokio::test]
async fn test_rehash_skipped_for_empty_or_unchanged() {
    let hasher = hasher();
    let stored = hasher.hash("s3cret").await.unwrap();

    assert!(hasher.rehash_if_changed(&stored, "").await.unwrap().is_none());
    assert!(hasher.rehash_if_changed(&stored, &stored).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rehash_on_new_password() {
    let hasher = hasher();
    let stored = hasher.hash("s3cret").await.unwrap();

    let fresh = hasher
        .rehash_if_changed(&stored, "other")
        .await
        .unwrap()
        .expect("a changed password must be hashed");
    assert!(hasher.verify("other", &fresh).await.unwrap());
    assert!(!hasher.verify("s3cret", &fresh).await.unwrap());
}

#[test]
fn test_cost_bounds_match_bcrypt() {
    assert!(bcrypt::hash("x", password::MIN_COST - 1).is_err());
    assert!(bcrypt::hash("x", password::MAX_COST + 1).is_err());
}

#[test]
fn test_default_cost() {
    assert_eq!(PasswordHasher::default().cost(), bcrypt::DEFAULT_COST);
}

#[test]
fn test_tokens_are_opaque_and_distinct() {
    let tokens: HashSet<String> = (0..1000).map(|_| new_token()).collect();
    assert_eq!(tokens.len(), 1000);

    let token = tokens.iter().next().unwrap();
    assert_eq!(token.len(), 32);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
}
