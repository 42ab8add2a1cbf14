//! Project operations within a tenant.

use crate::error::{ServiceError, ValidationError};
use crate::tenant::TenantDatabase;

use super::validation::{Checks, Validate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddProjectRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveProjectRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameProjectRequest {
    pub name: String,
    pub new_name: String,
}

impl Validate for AddProjectRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new().name("project name", &self.name).finish()
    }
}

impl Validate for RemoveProjectRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new().name("project name", &self.name).finish()
    }
}

impl Validate for RenameProjectRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .name("project name", &self.name)
            .name("new project name", &self.new_name)
            .finish()
    }
}

/// Project service bound to one tenant's database.
pub struct ProjectService<'a> {
    db: &'a TenantDatabase,
}

impl<'a> ProjectService<'a> {
    pub fn new(db: &'a TenantDatabase) -> Self {
        Self { db }
    }

    pub async fn add(&self, request: &AddProjectRequest) -> Result<(), ServiceError> {
        self.db
            .mutate(|data| {
                if data.projects.contains_key(&request.name) {
                    return Err(ServiceError::ProjectExists(request.name.clone()));
                }
                data.projects.insert(request.name.clone(), Default::default());
                Ok(())
            })
            .await
    }

    pub async fn remove(&self, request: &RemoveProjectRequest) -> Result<(), ServiceError> {
        self.db
            .mutate(|data| {
                data.projects
                    .remove(&request.name)
                    .map(|_| ())
                    .ok_or_else(|| ServiceError::ProjectNotFound(request.name.clone()))
            })
            .await
    }

    pub async fn rename(&self, request: &RenameProjectRequest) -> Result<(), ServiceError> {
        self.db
            .mutate(|data| {
                if !data.projects.contains_key(&request.name) {
                    return Err(ServiceError::ProjectNotFound(request.name.clone()));
                }
                if data.projects.contains_key(&request.new_name) {
                    return Err(ServiceError::ProjectExists(request.new_name.clone()));
                }
                if let Some(project) = data.projects.remove(&request.name) {
                    data.projects.insert(request.new_name.clone(), project);
                }
                Ok(())
            })
            .await
    }

    /// Project names in lexical order.
    pub async fn list(&self) -> Vec<String> {
        self.db
            .view(|data| data.projects.keys().cloned().collect())
            .await
    }
}
