//! Environment operations within a tenant's project.

use std::collections::btree_map::Entry;

use crate::error::{ServiceError, ValidationError};
use crate::tenant::TenantDatabase;

use super::validation::{Checks, Validate};
use super::{project, project_mut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddEnvironmentRequest {
    pub name: String,
    pub project_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveEnvironmentRequest {
    pub name: String,
    pub project_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameEnvironmentRequest {
    pub name: String,
    pub new_name: String,
    pub project_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEnvironmentRequest {
    pub project_name: String,
}

impl Validate for AddEnvironmentRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .name("environment name", &self.name)
            .name("project name", &self.project_name)
            .finish()
    }
}

impl Validate for RemoveEnvironmentRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .name("environment name", &self.name)
            .name("project name", &self.project_name)
            .finish()
    }
}

impl Validate for RenameEnvironmentRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .name("environment name", &self.name)
            .name("new environment name", &self.new_name)
            .name("project name", &self.project_name)
            .finish()
    }
}

impl Validate for ListEnvironmentRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .name("project name", &self.project_name)
            .finish()
    }
}

/// Environment service bound to one tenant's database.
pub struct EnvironmentService<'a> {
    db: &'a TenantDatabase,
}

impl<'a> EnvironmentService<'a> {
    pub fn new(db: &'a TenantDatabase) -> Self {
        Self { db }
    }

    pub async fn add(&self, request: &AddEnvironmentRequest) -> Result<(), ServiceError> {
        self.db
            .mutate(|data| {
                let project = project_mut(data, &request.project_name)?;
                match project.environments.entry(request.name.clone()) {
                    Entry::Occupied(_) => Err(ServiceError::EnvironmentExists {
                        project: request.project_name.clone(),
                        environment: request.name.clone(),
                    }),
                    Entry::Vacant(slot) => {
                        slot.insert(Default::default());
                        Ok(())
                    }
                }
            })
            .await
    }

    pub async fn remove(&self, request: &RemoveEnvironmentRequest) -> Result<(), ServiceError> {
        self.db
            .mutate(|data| {
                project_mut(data, &request.project_name)?
                    .environments
                    .remove(&request.name)
                    .map(|_| ())
                    .ok_or_else(|| ServiceError::EnvironmentNotFound {
                        project: request.project_name.clone(),
                        environment: request.name.clone(),
                    })
            })
            .await
    }

    pub async fn rename(&self, request: &RenameEnvironmentRequest) -> Result<(), ServiceError> {
        self.db
            .mutate(|data| {
                let project = project_mut(data, &request.project_name)?;
                if project.environments.contains_key(&request.new_name) {
                    return Err(ServiceError::EnvironmentExists {
                        project: request.project_name.clone(),
                        environment: request.new_name.clone(),
                    });
                }
                let environment = project.environments.remove(&request.name).ok_or_else(|| {
                    ServiceError::EnvironmentNotFound {
                        project: request.project_name.clone(),
                        environment: request.name.clone(),
                    }
                })?;
                project
                    .environments
                    .insert(request.new_name.clone(), environment);
                Ok(())
            })
            .await
    }

    /// Environment names of a project in lexical order.
    pub async fn list(&self, request: &ListEnvironmentRequest) -> Result<Vec<String>, ServiceError> {
        self.db
            .view(|data| {
                Ok(project(data, &request.project_name)?
                    .environments
                    .keys()
                    .cloned()
                    .collect())
            })
            .await
    }
}
