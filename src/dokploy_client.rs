use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::dokploy::{
    ComposeDeployRequest, CreateEnvironmentRequest, DeleteComposeRequest, DeleteDomainRequest,
    Domain, EnvironmentIdResponse, Project, RemoveEnvironmentRequest, RemoveProjectRequest,
};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Thin wrapper around the Dokploy HTTP API. One instance per invocation.
#[derive(Debug)]
pub struct DokployClient {
    base_url: String,
    api_key: SecretString,
    timeout: Duration,
    http: reqwest::Client,
}

impl DokployClient {
    pub fn new(
        base_url: impl AsRef<str>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.as_ref().trim();
        let key = api_key.expose_secret().trim();
        if base_url.is_empty() || key.is_empty() {
            return Err(Error::validation("url and key are required"));
        }

        let parsed = Url::parse(base_url)
            .map_err(|e| Error::validation(format!("invalid url {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::validation(format!(
                "invalid url {base_url:?}: scheme must be http or https"
            )));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|source| Error::Transport {
                path: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(key.to_string()),
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut value = HeaderValue::from_str(self.api_key.expose_secret())
            .map_err(|_| Error::validation("invalid api key header"))?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-api-key"), value);
        Ok(headers)
    }

    fn join_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request_error(&self, path: &str, source: reqwest::Error) -> Error {
        if source.is_timeout() {
            Error::Timeout {
                path: path.to_string(),
                timeout: self.timeout,
            }
        } else {
            Error::Transport {
                path: path.to_string(),
                source,
            }
        }
    }

    /// Issue one request and return the raw body. The JSON content type is
    /// only set when a body is given.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<String> {
        tracing::debug!(%method, path, "dokploy request");
        let mut req = self
            .http
            .request(method, self.join_url(path))
            .headers(self.auth_headers()?);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| self.request_error(path, e))?;

        let status = resp.status();
        if status.as_u16() >= 400 {
            tracing::debug!(path, %status, "dokploy request rejected");
            return Err(Error::Status {
                path: path.to_string(),
                status,
            });
        }

        resp.text().await.map_err(|e| self.request_error(path, e))
    }

    /// An empty body decodes as JSON `null`, so `Option<T>` targets accept it.
    fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T> {
        let body = if body.trim().is_empty() { "null" } else { body };
        serde_json::from_str(body).map_err(|source| Error::Decode {
            path: path.to_string(),
            source,
        })
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.send::<()>(Method::GET, path, None).await?;
        Self::decode(path, &body)
    }

    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let resp = self.send(Method::POST, path, Some(body)).await?;
        Self::decode(path, &resp)
    }

    /// POST helper for endpoints where the response body is irrelevant.
    pub(crate) async fn post_unit(&self, path: &str, body: &impl Serialize) -> Result<()> {
        self.send(Method::POST, path, Some(body)).await?;
        Ok(())
    }

    /// Retrieve all projects with their nested environments.
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let projects: Option<Vec<Project>> = self.get("/api/project.all").await?;
        Ok(projects.unwrap_or_default())
    }

    /// Project removal cascades to its environments on the server.
    pub async fn delete_project(&self, project_id: impl AsRef<str>) -> Result<()> {
        self.post_unit(
            "/api/project.remove",
            &RemoveProjectRequest {
                project_id: project_id.as_ref().to_string(),
            },
        )
        .await
    }

    /// Returns the new environment id, or an empty string if the server
    /// did not send one.
    pub async fn create_environment(
        &self,
        name: impl AsRef<str>,
        project_id: impl AsRef<str>,
    ) -> Result<String> {
        let resp: Option<EnvironmentIdResponse> = self
            .post(
                "/api/environment.create",
                &CreateEnvironmentRequest {
                    name: name.as_ref().to_string(),
                    project_id: project_id.as_ref().to_string(),
                },
            )
            .await?;
        Ok(resp.and_then(|r| r.environment_id).unwrap_or_default())
    }

    pub async fn delete_environment(&self, environment_id: impl AsRef<str>) -> Result<()> {
        self.post_unit(
            "/api/environment.remove",
            &RemoveEnvironmentRequest {
                environment_id: environment_id.as_ref().to_string(),
            },
        )
        .await
    }

    /// Fetch a compose (compose.one). The endpoint only knows ids.
    pub async fn get_compose(&self, compose_id: &str) -> Result<serde_json::Value> {
        if compose_id.is_empty() {
            return Err(Error::validation(
                "Dokploy compose.one API requires an id; lookup by name is not supported",
            ));
        }
        let url = format!(
            "/api/compose.one?composeId={}",
            urlencoding::encode(compose_id)
        );
        self.get(&url).await
    }

    pub async fn delete_compose(
        &self,
        compose_id: impl AsRef<str>,
        delete_volumes: bool,
    ) -> Result<()> {
        self.post_unit(
            "/api/compose.delete",
            &DeleteComposeRequest {
                compose_id: compose_id.as_ref().to_string(),
                delete_volumes,
            },
        )
        .await
    }

    /// Trigger deployment of a compose.
    pub async fn deploy_compose(&self, compose_id: impl AsRef<str>) -> Result<()> {
        let body = ComposeDeployRequest {
            compose_id: compose_id.as_ref().to_string(),
        };
        self.post_unit("/api/compose.deploy", &body).await
    }

    /// List domains attached to a compose.
    pub async fn list_domains_by_compose_id(
        &self,
        compose_id: impl AsRef<str>,
    ) -> Result<Vec<Domain>> {
        let url = format!(
            "/api/domain.byComposeId?composeId={}",
            urlencoding::encode(compose_id.as_ref())
        );
        let domains: Option<Vec<Domain>> = self.get(&url).await?;
        Ok(domains.unwrap_or_default())
    }

    pub async fn delete_domain(&self, domain_id: impl AsRef<str>) -> Result<()> {
        self.post_unit(
            "/api/domain.delete",
            &DeleteDomainRequest {
                domain_id: domain_id.as_ref().to_string(),
            },
        )
        .await
    }
}
