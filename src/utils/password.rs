// Password hashing and verification utilities using Argon2
// New digests are Argon2id; bcrypt digests from the legacy system still verify

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound for the configurable memory cost (1 GiB in KiB)
const MAX_MEMORY_COST_KIB: u32 = 1_048_576;

/// Errors that can occur during password operations.
/// Messages never include the plaintext secret.
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingError(String),

    #[error("Failed to verify password: {0}")]
    VerificationError(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,

    #[error("Memory cost ({0} KiB) exceeds safe limit ({1} KiB)")]
    MemoryCostTooHigh(u32, u32),
}

/// Configuration for Argon2 password hashing
/// Using Argon2id variant as recommended by OWASP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 19456 = 19 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 2)
    pub time_cost: u32,
    /// Parallelism factor (default: 1)
    pub parallelism: u32,
    /// Output hash length in bytes (default: 32)
    pub output_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        // OWASP recommended minimum parameters for Argon2id
        Self {
            memory_cost: 19456,
            time_cost: 2,
            parallelism: 1,
            output_length: 32,
        }
    }
}

impl PasswordConfig {
    /// Validate parameters before any hashing happens
    pub fn validate(&self) -> Result<(), PasswordError> {
        if self.memory_cost > MAX_MEMORY_COST_KIB {
            return Err(PasswordError::MemoryCostTooHigh(
                self.memory_cost,
                MAX_MEMORY_COST_KIB,
            ));
        }
        self.params().map(|_| ())
    }

    fn params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(self.output_length),
        )
        .map_err(|e| PasswordError::HashingError(e.to_string()))
    }

    /// Create Argon2 hasher with current configuration
    fn build_hasher(&self) -> Result<Argon2<'static>, PasswordError> {
        self.validate()?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params()?))
    }
}

/// Hash a password using Argon2id with secure defaults
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash_password_with_config(password, &PasswordConfig::default())
}

/// Hash a password using Argon2id with custom configuration
///
/// # Returns
/// * `Result<String, PasswordError>` - The digest in PHC string format; the
///   random salt is embedded, so two calls never return the same string
pub fn hash_password_with_config(
    password: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    let argon2 = config.build_hasher()?;
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingError(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Returns true for bcrypt digests (`$2a$`, `$2b$`, `$2x$`, `$2y$`)
fn is_bcrypt_digest(hash: &str) -> bool {
    matches!(hash.get(..4), Some("$2a$" | "$2b$" | "$2x$" | "$2y$"))
}

/// Verify a password against a stored digest
///
/// Both verifiers compare in constant time. Argon2 parameters are read from
/// the PHC string, so digests created with older settings keep verifying.
///
/// # Returns
/// * `Ok(true)` if the password matches, `Ok(false)` otherwise
/// * `Err(PasswordError::InvalidHashFormat)` if the digest cannot be parsed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    if is_bcrypt_digest(hash) {
        // bcrypt only fails on malformed digests here
        return bcrypt::verify(password, hash).map_err(|_| PasswordError::InvalidHashFormat);
    }

    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationError(e.to_string())),
    }
}

/// Check if a digest should be upgraded (rehashed with current parameters)
///
/// Legacy bcrypt digests always need a rehash.
pub fn needs_rehash(hash: &str, config: &PasswordConfig) -> Result<bool, PasswordError> {
    if is_bcrypt_digest(hash) {
        return Ok(true);
    }

    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    if parsed_hash.algorithm != Algorithm::Argon2id.ident() {
        return Ok(true);
    }

    for (ident, value) in parsed_hash.params.iter() {
        let expected = match ident.as_str() {
            "m" => config.memory_cost,
            "t" => config.time_cost,
            "p" => config.parallelism,
            _ => continue,
        };
        if let Ok(actual) = value.decimal() {
            if actual != expected {
                return Ok(true);
            }
        }
    }

    Ok(false)
}
