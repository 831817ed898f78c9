use crate::dokploy_client::DokployClient;
use crate::error::{Error, Result};
use crate::models::dokploy::{Environment, Project};

/// Find the first project called `project_name`, then its first environment
/// called `environment_name`. Names are not unique on the server; a missing
/// environment in the first matching project is final.
pub fn find_project_environment<'a>(
    projects: &'a [Project],
    project_name: &str,
    environment_name: &str,
) -> Result<(&'a Project, &'a Environment)> {
    let project = projects
        .iter()
        .find(|p| p.name == project_name)
        .ok_or_else(|| Error::ProjectNotFound {
            name: project_name.to_string(),
        })?;

    let environment = project
        .environments
        .iter()
        .find(|e| e.name == environment_name)
        .ok_or_else(|| Error::EnvironmentNotFound {
            project: project_name.to_string(),
            environment: environment_name.to_string(),
        })?;

    Ok((project, environment))
}

impl DokployClient {
    /// Resolve project and environment names to `(project_id, environment_id)`.
    pub async fn resolve_project(
        &self,
        project_name: &str,
        environment_name: &str,
    ) -> Result<(String, String)> {
        if project_name.is_empty() {
            return Err(Error::validation("project name is required"));
        }
        if environment_name.is_empty() {
            return Err(Error::validation("environment name is required"));
        }

        let projects = self.list_projects().await?;
        let (project, environment) =
            find_project_environment(&projects, project_name, environment_name)?;
        Ok((
            project.project_id.clone(),
            environment.environment_id.clone(),
        ))
    }

    /// Get-or-create: resolve by name, and only create the project when no
    /// project of that name exists. The flag is true when it was created.
    pub async fn ensure_project(
        &self,
        name: &str,
        description: &str,
        environment: &str,
    ) -> Result<(String, String, bool)> {
        match self.resolve_project(name, environment).await {
            Ok((project_id, environment_id)) => Ok((project_id, environment_id, false)),
            Err(Error::ProjectNotFound { .. }) => {
                tracing::info!(name, environment, "project not found, creating it");
                let (project_id, environment_id) =
                    self.create_project(name, description, environment).await?;
                Ok((project_id, environment_id, true))
            }
            Err(e) => Err(e),
        }
    }
}
