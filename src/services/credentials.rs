// Credential verification for login
// Unknown user, wrong password and disabled account are indistinguishable to callers

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::db::{PrincipalRepository, RepositoryError};
use crate::models::principal::Principal;
use crate::utils::password::{hash_password_with_config, verify_password, PasswordConfig, PasswordError};

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Credential check failed: {0}")]
    Internal(String),
}

#[derive(Clone)]
pub struct CredentialVerifier {
    repository: Arc<dyn PrincipalRepository>,
    config: PasswordConfig,
    /// Verified against when the email is unknown so timing matches a real check
    dummy_digest: Arc<str>,
}

impl CredentialVerifier {
    pub fn new(
        repository: Arc<dyn PrincipalRepository>,
        config: PasswordConfig,
    ) -> Result<Self, PasswordError> {
        let dummy_digest = hash_password_with_config("timing-equalisation-placeholder", &config)?;
        Ok(Self {
            repository,
            config,
            dummy_digest: dummy_digest.into(),
        })
    }

    pub fn config(&self) -> &PasswordConfig {
        &self.config
    }

    /// Hash a plaintext secret with the configured parameters
    pub async fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let config = self.config.clone();
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || hash_password_with_config(&plaintext, &config))
            .await
            .map_err(|e| PasswordError::HashingError(e.to_string()))?
    }

    /// Check a secret against a digest. Malformed digests never match.
    pub fn verify(plaintext: &str, digest: &str) -> bool {
        match verify_password(plaintext, digest) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "Stored password digest could not be checked");
                false
            },
        }
    }

    async fn verify_blocking(&self, plaintext: &str, digest: &str) -> Result<bool, CredentialError> {
        let plaintext = plaintext.to_string();
        let digest = digest.to_string();
        tokio::task::spawn_blocking(move || Self::verify(&plaintext, &digest))
            .await
            .map_err(|e| CredentialError::Internal(e.to_string()))
    }

    /// Resolve an email/secret pair to a principal
    #[instrument(skip(self, secret))]
    pub async fn authenticate(&self, email: &str, secret: &str) -> Result<Principal, CredentialError> {
        let record = self.repository.find_by_email(email).await?;

        let Some(record) = record else {
            self.verify_blocking(secret, &self.dummy_digest).await?;
            debug!("Login for unknown email");
            return Err(CredentialError::InvalidCredentials);
        };

        let matches = self.verify_blocking(secret, &record.password_digest).await?;

        if !matches || !record.is_active {
            debug!(
                user_id = %record.principal.id,
                active = record.is_active,
                "Login rejected"
            );
            return Err(CredentialError::InvalidCredentials);
        }

        Ok(record.principal)
    }
}
