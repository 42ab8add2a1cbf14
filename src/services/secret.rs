//! Secret operations within a tenant's environment.
//!
//! Values arrive already sealed by the client and are stored and returned
//! as opaque ciphertext; the server never holds a key that opens them.

use crate::error::{ServiceError, ValidationError};
use crate::tenant::TenantDatabase;

use super::validation::{Checks, Validate};
use super::{environment, environment_mut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetSecretRequest {
    pub project: String,
    pub environment: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetSecretRequest {
    pub project: String,
    pub environment: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveSecretRequest {
    pub project: String,
    pub environment: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSecretRequest {
    pub project: String,
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectRequest {
    pub project: String,
    pub environment: String,
}

fn scope(project: &str, environment: &str) -> Checks {
    Checks::new()
        .name("project name", project)
        .name("environment name", environment)
}

impl Validate for SetSecretRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        scope(&self.project, &self.environment)
            .secret_key("secret key", &self.key)
            .sealed_value("secret value", &self.value)
            .finish()
    }
}

impl Validate for GetSecretRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        scope(&self.project, &self.environment)
            .secret_key("secret key", &self.key)
            .finish()
    }
}

impl Validate for RemoveSecretRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        scope(&self.project, &self.environment)
            .secret_key("secret key", &self.key)
            .finish()
    }
}

impl Validate for ListSecretRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        scope(&self.project, &self.environment).finish()
    }
}

impl Validate for InjectRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        scope(&self.project, &self.environment).finish()
    }
}

/// Secret service bound to one tenant's database.
pub struct SecretService<'a> {
    db: &'a TenantDatabase,
}

impl<'a> SecretService<'a> {
    pub fn new(db: &'a TenantDatabase) -> Self {
        Self { db }
    }

    /// Insert or overwrite a secret.
    pub async fn set(&self, request: &SetSecretRequest) -> Result<(), ServiceError> {
        self.db
            .mutate(|data| {
                environment_mut(data, &request.project, &request.environment)?
                    .secrets
                    .insert(request.key.clone(), request.value.clone());
                Ok(())
            })
            .await
    }

    pub async fn get(&self, request: &GetSecretRequest) -> Result<String, ServiceError> {
        self.db
            .view(|data| {
                environment(data, &request.project, &request.environment)?
                    .secrets
                    .get(&request.key)
                    .cloned()
                    .ok_or_else(|| ServiceError::SecretNotFound {
                        project: request.project.clone(),
                        environment: request.environment.clone(),
                        key: request.key.clone(),
                    })
            })
            .await
    }

    pub async fn remove(&self, request: &RemoveSecretRequest) -> Result<(), ServiceError> {
        self.db
            .mutate(|data| {
                environment_mut(data, &request.project, &request.environment)?
                    .secrets
                    .remove(&request.key)
                    .map(|_| ())
                    .ok_or_else(|| ServiceError::SecretNotFound {
                        project: request.project.clone(),
                        environment: request.environment.clone(),
                        key: request.key.clone(),
                    })
            })
            .await
    }

    /// `(key, ciphertext)` pairs in key order.
    pub async fn list(
        &self,
        request: &ListSecretRequest,
    ) -> Result<Vec<(String, String)>, ServiceError> {
        self.pairs(&request.project, &request.environment).await
    }

    /// Every secret of an environment, for exporting into a process.
    pub async fn inject(&self, request: &InjectRequest) -> Result<Vec<(String, String)>, ServiceError> {
        self.pairs(&request.project, &request.environment).await
    }

    async fn pairs(
        &self,
        project: &str,
        environment_name: &str,
    ) -> Result<Vec<(String, String)>, ServiceError> {
        self.db
            .view(|data| {
                Ok(environment(data, project, environment_name)?
                    .secrets
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect())
            })
            .await
    }
}
