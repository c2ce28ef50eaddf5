// User directory access. The relational database sits behind this trait;
// the in-memory implementation serves development and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::app_config::SeedConfig;
use crate::models::principal::{Principal, PrincipalRecord, Role};
use crate::utils::password::{hash_password_with_config, PasswordConfig, PasswordError};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Principal with email {0} already exists")]
    DuplicateEmail(String),

    #[error("Failed to prepare seed principal: {0}")]
    Seed(#[from] PasswordError),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PrincipalRepository: Send + Sync {
    /// Lookup by normalised (trimmed, lowercase) email
    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRecord>, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PrincipalRecord>, RepositoryError>;

    async fn list(&self) -> Result<Vec<Principal>, RepositoryError>;
}

pub type SharedPrincipalRepository = Arc<dyn PrincipalRepository>;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Default)]
pub struct InMemoryPrincipalRepository {
    records: RwLock<HashMap<Uuid, PrincipalRecord>>,
}

impl InMemoryPrincipalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record. Emails are unique regardless of case.
    pub async fn insert(&self, mut record: PrincipalRecord) -> Result<Principal, RepositoryError> {
        record.principal.email = normalize_email(&record.principal.email);

        let mut records = self.records.write().await;
        if records
            .values()
            .any(|r| r.principal.email == record.principal.email)
        {
            return Err(RepositoryError::DuplicateEmail(record.principal.email));
        }

        let principal = record.principal.clone();
        records.insert(principal.id, record);
        Ok(principal)
    }

    /// Hash `password` and store a new active principal
    pub async fn create(
        &self,
        email: &str,
        password: &str,
        role: Role,
        password_config: &PasswordConfig,
    ) -> Result<Principal, RepositoryError> {
        let config = password_config.clone();
        let secret = password.to_string();
        let digest = tokio::task::spawn_blocking(move || hash_password_with_config(&secret, &config))
            .await
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))??;

        self.insert(PrincipalRecord {
            principal: Principal {
                id: Uuid::new_v4(),
                email: email.to_string(),
                role,
            },
            password_digest: digest,
            is_active: true,
        })
        .await
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> bool {
        match self.records.write().await.get_mut(&id) {
            Some(record) => {
                record.is_active = is_active;
                true
            },
            None => false,
        }
    }

    pub async fn set_role(&self, id: Uuid, role: Role) -> bool {
        match self.records.write().await.get_mut(&id) {
            Some(record) => {
                record.principal.role = role;
                true
            },
            None => false,
        }
    }
}

#[async_trait]
impl PrincipalRepository for InMemoryPrincipalRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRecord>, RepositoryError> {
        let email = normalize_email(email);
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.principal.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PrincipalRecord>, RepositoryError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Principal>, RepositoryError> {
        let mut principals: Vec<Principal> = self
            .records
            .read()
            .await
            .values()
            .map(|r| r.principal.clone())
            .collect();
        principals.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(principals)
    }
}

/// Create the developer account from `DEV_EMAIL`/`DEV_PASSWORD` if both are set
pub async fn seed_from_config(
    repository: &InMemoryPrincipalRepository,
    seed: &SeedConfig,
    password_config: &PasswordConfig,
) -> Result<Option<Principal>, RepositoryError> {
    let (Some(email), Some(password)) = (&seed.dev_email, &seed.dev_password) else {
        info!("DEV_EMAIL/DEV_PASSWORD not set, skipping developer seed");
        return Ok(None);
    };

    if repository.find_by_email(email).await?.is_some() {
        return Ok(None);
    }

    let principal = repository
        .create(email, password, Role::Developer, password_config)
        .await?;
    info!(user_id = %principal.id, "Seeded developer account");
    Ok(Some(principal))
}
