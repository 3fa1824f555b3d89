//! PBKDF2-SHA256 password hashing.
//!
//! Hashes are stored as `pbkdf2-sha256$<iterations>$<salt>$<hash>` with
//! standard base64 segments, so the iteration count can be raised later
//! without invalidating existing accounts.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

const SCHEME: &str = "pbkdf2-sha256";
pub const SALT_LENGTH: usize = 16;
pub const HASH_LENGTH: usize = 32;
pub const DEFAULT_ITERATIONS: u32 = 100_000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Stored password hash is malformed")]
    Malformed,
    #[error("Unsupported password hash scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Password worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = derive(password, &salt, self.iterations);
        format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            STANDARD.encode(salt),
            STANDARD.encode(digest)
        )
    }

    /// Checks `password` against a stored hash, using the stored iteration count.
    pub fn verify(&self, password: &str, stored: &str) -> Result<bool, PasswordError> {
        let mut parts = stored.split('$');
        let scheme = parts.next().ok_or(PasswordError::Malformed)?;
        if scheme != SCHEME {
            return Err(PasswordError::UnsupportedScheme(scheme.to_string()));
        }
        let iterations: u32 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .ok_or(PasswordError::Malformed)?;
        let salt = parts
            .next()
            .and_then(|s| STANDARD.decode(s).ok())
            .ok_or(PasswordError::Malformed)?;
        let expected = parts
            .next()
            .and_then(|s| STANDARD.decode(s).ok())
            .filter(|h| h.len() == HASH_LENGTH)
            .ok_or(PasswordError::Malformed)?;
        if parts.next().is_some() {
            return Err(PasswordError::Malformed);
        }

        let actual = derive(password, &salt, iterations);
        Ok(actual[..].ct_eq(&expected[..]).into())
    }
}

impl PasswordHasher {
    /// Runs [`PasswordHasher::hash`] on the blocking pool so request handlers
    /// keep the async workers free while the key is derived.
    pub async fn hash_off_thread(&self, password: String) -> Result<String, PasswordError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PasswordError::Worker(e.to_string()))
    }

    /// Runs [`PasswordHasher::verify`] on the blocking pool.
    pub async fn verify_off_thread(&self, password: String, stored: String) -> Result<bool, PasswordError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| PasswordError::Worker(e.to_string()))?
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}
