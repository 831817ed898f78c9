use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;

fn parse_created_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

/// Treat `null` (or a missing field) as an empty string, so one odd record
/// does not fail a whole listing.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A project as returned by `project.all` and `project.create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub project_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub environments: Vec<Environment>,
}

impl Project {
    pub fn created(&self) -> Option<DateTime<Utc>> {
        parse_created_at(self.created_at.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub environment_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
    /// Absent when the environment is embedded in its project.
    #[serde(default)]
    pub project_id: Option<String>,
}

impl Environment {
    pub fn created(&self) -> Option<DateTime<Utc>> {
        parse_created_at(self.created_at.as_deref())
    }
}

/// A domain as listed by `domain.byComposeId`. Only the id is guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub domain_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub host: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub compose_id: Option<String>,
    #[serde(default)]
    pub certificate_type: Option<String>,
    #[serde(default)]
    pub https: Option<bool>,
}

impl Domain {
    /// Exact host and path comparison; a missing path compares as "".
    pub fn matches(&self, host: &str, path: &str) -> bool {
        self.host == host && self.path.as_deref().unwrap_or_default() == path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateType {
    #[default]
    None,
    Letsencrypt,
}

impl CertificateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateType::None => "none",
            CertificateType::Letsencrypt => "letsencrypt",
        }
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(CertificateType::None),
            "letsencrypt" => Ok(CertificateType::Letsencrypt),
            other => Err(Error::validation(format!(
                "invalid certificateType {other:?}, must be one of: none, letsencrypt"
            ))),
        }
    }
}

/// The only domain kind this client manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainType {
    #[default]
    Compose,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateComposeRequest {
    pub name: String,
    pub environment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

/// Only the fields that are set get sent, so blanks never overwrite.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateComposeRequest {
    pub compose_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteComposeRequest {
    pub compose_id: String,
    pub delete_volumes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeDeployRequest {
    pub compose_id: String,
}

/// Body of `domain.create`, and of `domain.update` once `domain_id` is set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
    pub host: String,
    pub path: String,
    pub port: u16,
    pub service_name: String,
    pub compose_id: String,
    pub certificate_type: CertificateType,
    pub https: bool,
    pub domain_type: DomainType,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainIdResponse {
    #[serde(default)]
    pub domain_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDomainRequest {
    pub domain_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: String,
    pub env: String,
}

/// `project.create` answers with the project and its default environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedProject {
    pub project: Project,
    pub environment: Environment,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveProjectRequest {
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnvironmentRequest {
    pub name: String,
    pub project_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentIdResponse {
    #[serde(default)]
    pub environment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveEnvironmentRequest {
    pub environment_id: String,
}
