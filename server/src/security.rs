//! Password hashing and token generation

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Random opaque token for sessions, activation links and salts
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Salted SHA-256 of `password`, hex encoded.
///
/// A single SHA-256 round is fast to brute force once the hashes leak. A
/// memory-hard KDF (argon2, scrypt) would be the stronger choice; stored
/// hashes carry no algorithm tag, so switching needs a rehash on next sign-in.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compare `password` against a stored hash in constant time
pub fn verify_password(salt: &str, password: &str, expected_hash: &str) -> bool {
    let actual = hash_password(salt, password);
    actual.as_bytes().ct_eq(expected_hash.as_bytes()).into()
}
