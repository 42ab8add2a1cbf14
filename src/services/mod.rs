//! Business services operating on a single tenant's database.
//!
//! - `project`: add, remove, rename, list projects
//! - `environment`: add, remove, rename, list environments of a project
//! - `secret`: set, get, list, remove secrets and inject an environment
//! - `validation`: explicit per-request field validation
//!
//! Services receive requests that have already passed [`Validate`] and a
//! tenant handle chosen by the server; they never see a client-supplied
//! tenant.

mod environment;
mod project;
mod secret;
mod validation;

pub use environment::{
    AddEnvironmentRequest, EnvironmentService, ListEnvironmentRequest, RemoveEnvironmentRequest,
    RenameEnvironmentRequest,
};
pub use project::{AddProjectRequest, ProjectService, RemoveProjectRequest, RenameProjectRequest};
pub use secret::{
    GetSecretRequest, InjectRequest, ListSecretRequest, RemoveSecretRequest, SecretService,
    SetSecretRequest,
};
pub use validation::{Checks, MAX_NAME_LEN, MAX_VALUE_LEN, Validate};

use crate::error::ServiceError;
use crate::tenant::{EnvironmentData, ProjectData, TenantData};

fn project<'d>(data: &'d TenantData, name: &str) -> Result<&'d ProjectData, ServiceError> {
    data.projects
        .get(name)
        .ok_or_else(|| ServiceError::ProjectNotFound(name.to_string()))
}

fn project_mut<'d>(
    data: &'d mut TenantData,
    name: &str,
) -> Result<&'d mut ProjectData, ServiceError> {
    data.projects
        .get_mut(name)
        .ok_or_else(|| ServiceError::ProjectNotFound(name.to_string()))
}

fn environment<'d>(
    data: &'d TenantData,
    project_name: &str,
    name: &str,
) -> Result<&'d EnvironmentData, ServiceError> {
    project(data, project_name)?
        .environments
        .get(name)
        .ok_or_else(|| ServiceError::EnvironmentNotFound {
            project: project_name.to_string(),
            environment: name.to_string(),
        })
}

fn environment_mut<'d>(
    data: &'d mut TenantData,
    project_name: &str,
    name: &str,
) -> Result<&'d mut EnvironmentData, ServiceError> {
    project_mut(data, project_name)?
        .environments
        .get_mut(name)
        .ok_or_else(|| ServiceError::EnvironmentNotFound {
            project: project_name.to_string(),
            environment: name.to_string(),
        })
}
