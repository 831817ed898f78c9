//! Create-or-update decisions for compose applications, domains and
//! projects.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::dokploy_client::DokployClient;
use crate::error::{Error, Result};
use crate::locator::FallbackPolicy;
use crate::models::dokploy::{
    CertificateType, CreateComposeRequest, CreateProjectRequest, CreatedProject, DomainIdResponse,
    DomainRequest, DomainType, UpdateComposeRequest,
};

/// Response fields the compose id has been reported under, in order of
/// preference. The first non-empty one wins.
pub const COMPOSE_ID_FIELDS: [&str; 2] = ["id", "composeId"];

/// The compose id recovered from a create/update response, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeIdResponse(pub Option<String>);

impl ComposeIdResponse {
    pub fn from_value(value: &Value) -> Self {
        let id = COMPOSE_ID_FIELDS.iter().find_map(|field| {
            value
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });
        Self(id)
    }
}

impl<'de> Deserialize<'de> for ComposeIdResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// Join env vars into Dokploy's single `env` string: `KEY=VALUE` lines
/// ordered by key.
pub fn join_env_vars(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a `KEY=VALUE` argument on its first `=`.
pub fn parse_env_var(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(Error::validation(format!(
            "invalid env var {raw:?}, expected KEY=VALUE"
        ))),
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn explicit_id(id: Option<&str>) -> Option<&str> {
    id.filter(|s| !s.is_empty())
}

/// Desired state of a compose application.
#[derive(Debug, Clone, Default)]
pub struct ComposeSpec {
    pub name: String,
    pub environment_id: String,
    /// Raw compose file text; empty means "leave as is".
    pub compose_file: String,
    pub env: BTreeMap<String, String>,
}

/// Desired state of a compose-scoped domain.
#[derive(Debug, Clone)]
pub struct DomainSpec {
    pub host: String,
    pub path: String,
    pub port: u16,
    pub service_name: String,
    pub compose_id: String,
    pub certificate_type: CertificateType,
    pub https: bool,
}

impl DomainSpec {
    fn into_request(self, domain_id: Option<String>) -> DomainRequest {
        DomainRequest {
            domain_id,
            host: self.host,
            path: self.path,
            port: self.port,
            service_name: self.service_name,
            compose_id: self.compose_id,
            certificate_type: self.certificate_type,
            https: self.https,
            domain_type: DomainType::Compose,
        }
    }
}

impl DokployClient {
    /// Without an id, create the compose and return the id the server
    /// reports (empty if it reports none). With an id, update only the
    /// non-empty fields and return the reported id, else the given one.
    pub async fn create_or_update_compose(
        &self,
        id: Option<&str>,
        spec: &ComposeSpec,
    ) -> Result<String> {
        let env = join_env_vars(&spec.env);

        let Some(id) = explicit_id(id) else {
            tracing::debug!(name = %spec.name, environment_id = %spec.environment_id, "creating compose");
            let req = CreateComposeRequest {
                name: spec.name.clone(),
                environment_id: spec.environment_id.clone(),
                compose_file: non_empty(&spec.compose_file),
                env: non_empty(&env),
            };
            let resp: ComposeIdResponse = self.post("/api/compose.create", &req).await?;
            return Ok(resp.0.unwrap_or_default());
        };

        tracing::debug!(compose_id = id, "updating compose");
        let req = UpdateComposeRequest {
            compose_id: id.to_string(),
            name: non_empty(&spec.name),
            compose_file: non_empty(&spec.compose_file),
            env: non_empty(&env),
        };
        let resp: ComposeIdResponse = self.post("/api/compose.update", &req).await?;
        Ok(resp.0.unwrap_or_else(|| id.to_string()))
    }

    pub async fn create_or_update_domain(&self, id: Option<&str>, spec: DomainSpec) -> Result<String> {
        self.create_or_update_domain_with(id, spec, FallbackPolicy::default())
            .await
    }

    /// Update the domain with `id`, or the one the locator finds for the
    /// compose; create a new one when neither exists.
    pub async fn create_or_update_domain_with(
        &self,
        id: Option<&str>,
        spec: DomainSpec,
        policy: FallbackPolicy,
    ) -> Result<String> {
        let domain_id = match explicit_id(id) {
            Some(id) => Some(id.to_string()),
            None => {
                self.find_existing_domain_id(&spec.compose_id, &spec.host, &spec.path, policy)
                    .await?
            }
        };

        let resp: Option<DomainIdResponse> = match domain_id {
            Some(domain_id) => {
                tracing::debug!(%domain_id, host = %spec.host, "updating domain");
                let req = spec.into_request(Some(domain_id));
                self.post("/api/domain.update", &req).await?
            }
            None => {
                tracing::debug!(host = %spec.host, compose_id = %spec.compose_id, "creating domain");
                let req = spec.into_request(None);
                self.post("/api/domain.create", &req).await?
            }
        };
        Ok(resp.and_then(|r| r.domain_id).unwrap_or_default())
    }

    /// Create a project. Dokploy provisions a default environment with it;
    /// both ids are returned.
    pub async fn create_project(
        &self,
        name: impl AsRef<str>,
        description: impl AsRef<str>,
        environment: impl AsRef<str>,
    ) -> Result<(String, String)> {
        let req = CreateProjectRequest {
            name: name.as_ref().to_string(),
            description: description.as_ref().to_string(),
            env: environment.as_ref().to_string(),
        };
        let created: CreatedProject = self.post("/api/project.create", &req).await?;
        Ok((
            created.project.project_id,
            created.environment.environment_id,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_client;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn domain_spec() -> DomainSpec {
        DomainSpec {
            host: "example.com".to_string(),
            path: "/".to_string(),
            port: 80,
            service_name: "web".to_string(),
            compose_id: "cmp-1".to_string(),
            certificate_type: CertificateType::None,
            https: true,
        }
    }

    #[test]
    fn env_lines_are_sorted_by_key_and_reparse() {
        let original = env(&[("B", "2"), ("A0", "x=y"), ("A", "1"), ("EMPTY", "")]);
        let joined = join_env_vars(&original);
        assert_eq!(joined, "A=1\nA0=x=y\nB=2\nEMPTY=");

        let keys: Vec<_> = joined.lines().map(|l| l.split_once('=').unwrap().0).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));

        let reparsed: BTreeMap<String, String> = joined
            .lines()
            .map(|l| parse_env_var(l).unwrap())
            .collect();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn empty_env_joins_to_empty_string() {
        assert_eq!(join_env_vars(&BTreeMap::new()), "");
    }

    #[test]
    fn parse_env_var_splits_on_first_equals() {
        assert_eq!(
            parse_env_var("URL=postgres://u:p@h/db?a=b").unwrap(),
            ("URL".to_string(), "postgres://u:p@h/db?a=b".to_string())
        );
        assert!(parse_env_var("NOVALUE").is_err());
        assert!(parse_env_var("=value").is_err());
    }

    #[test]
    fn compose_id_prefers_id_then_compose_id() {
        let both = ComposeIdResponse::from_value(&json!({"id": "a", "composeId": "b"}));
        assert_eq!(both.0.as_deref(), Some("a"));
        let legacy = ComposeIdResponse::from_value(&json!({"id": "", "composeId": "b"}));
        assert_eq!(legacy.0.as_deref(), Some("b"));
        assert_eq!(ComposeIdResponse::from_value(&json!({})), ComposeIdResponse(None));
        assert_eq!(ComposeIdResponse::from_value(&Value::Null), ComposeIdResponse(None));
    }

    #[tokio::test]
    async fn compose_without_id_is_created() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/compose.create"))
            .and(body_json(json!({
                "name": "my-compose",
                "environmentId": "env-1",
                "composeFile": "services: {}",
                "env": "A=1\nB=2",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"composeId": "cmp-123"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/api/compose.update"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let spec = ComposeSpec {
            name: "my-compose".to_string(),
            environment_id: "env-1".to_string(),
            compose_file: "services: {}".to_string(),
            env: env(&[("B", "2"), ("A", "1")]),
        };
        let id = client.create_or_update_compose(None, &spec).await.unwrap();
        assert_eq!(id, "cmp-123");
    }

    #[tokio::test]
    async fn compose_create_omits_empty_optionals() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/compose.create"))
            .and(body_json(json!({"name": "bare", "environmentId": "env-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let spec = ComposeSpec {
            name: "bare".to_string(),
            environment_id: "env-1".to_string(),
            ..Default::default()
        };
        let id = client.create_or_update_compose(Some(""), &spec).await.unwrap();
        assert_eq!(id, "");
    }

    #[tokio::test]
    async fn compose_with_id_is_updated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/compose.update"))
            .and(body_json(json!({
                "composeId": "cmp-123",
                "name": "my-compose",
                "composeFile": "services: {}",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"composeId": "cmp-999"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/api/compose.create"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let spec = ComposeSpec {
            name: "my-compose".to_string(),
            environment_id: "env-1".to_string(),
            compose_file: "services: {}".to_string(),
            env: BTreeMap::new(),
        };
        let id = client
            .create_or_update_compose(Some("cmp-123"), &spec)
            .await
            .unwrap();
        assert_eq!(id, "cmp-999");
    }

    #[tokio::test]
    async fn compose_update_keeps_id_when_response_has_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/compose.update"))
            .and(body_json(json!({"composeId": "cmp-123", "env": "A=1"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let spec = ComposeSpec {
            env: env(&[("A", "1")]),
            ..Default::default()
        };
        let id = client
            .create_or_update_compose(Some("cmp-123"), &spec)
            .await
            .unwrap();
        assert_eq!(id, "cmp-123");
    }

    #[tokio::test]
    async fn compose_transport_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(path("/api/compose.update"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .create_or_update_compose(Some("cmp-1"), &ComposeSpec::default())
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn domain_is_created_when_compose_has_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/domain.byComposeId"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/domain.create"))
            .and(body_json(json!({
                "host": "example.com",
                "path": "/",
                "port": 80,
                "serviceName": "web",
                "composeId": "cmp-1",
                "certificateType": "none",
                "https": true,
                "domainType": "compose",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"domainId": "dom-123"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let id = client.create_or_update_domain(None, domain_spec()).await.unwrap();
        assert_eq!(id, "dom-123");

        let paths: Vec<_> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect();
        assert_eq!(paths, ["/api/domain.byComposeId", "/api/domain.create"]);
    }

    #[tokio::test]
    async fn existing_domain_is_updated_even_without_exact_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/domain.byComposeId"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"domainId": "dom-1", "host": "old.example.com", "path": "/"},
                {"domainId": "dom-2", "host": "other.example.com", "path": "/"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/domain.update"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"domainId": "dom-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/api/domain.create"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let id = client.create_or_update_domain(None, domain_spec()).await.unwrap();
        assert_eq!(id, "dom-1");

        let requests = server.received_requests().await.unwrap();
        let update = requests
            .iter()
            .find(|r| r.url.path() == "/api/domain.update")
            .unwrap();
        let body: Value = update.body_json().unwrap();
        assert_eq!(body["domainId"], "dom-1");
        assert_eq!(body["composeId"], "cmp-1");
        assert_eq!(body["host"], "example.com");
    }

    #[tokio::test]
    async fn exact_only_policy_creates_instead_of_hijacking() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/domain.byComposeId"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"domainId": "dom-1", "host": "old.example.com", "path": "/"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/domain.create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"domainId": "dom-2"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let id = client
            .create_or_update_domain_with(None, domain_spec(), FallbackPolicy::ExactOnly)
            .await
            .unwrap();
        assert_eq!(id, "dom-2");
    }

    #[tokio::test]
    async fn explicit_domain_id_skips_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/domain.update"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"domainId": "dom-7"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let id = client
            .create_or_update_domain(Some("dom-7"), domain_spec())
            .await
            .unwrap();
        assert_eq!(id, "dom-7");
    }

    #[tokio::test]
    async fn domain_lookup_failure_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/domain.byComposeId"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .create_or_update_domain(None, domain_spec())
            .await
            .unwrap_err();
        assert!(err.is_transport(), "got {err:?}");
    }

    #[tokio::test]
    async fn project_create_returns_project_and_default_environment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/project.create"))
            .and(body_json(json!({
                "name": "My Project",
                "description": "",
                "env": "production",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "project": {
                    "projectId": "proj-123",
                    "name": "My Project",
                    "description": null,
                    "createdAt": "2026-02-05T09:27:24.786Z",
                    "organizationId": "org-1",
                    "env": ""
                },
                "environment": {
                    "environmentId": "env-123",
                    "name": "production",
                    "description": "Production environment",
                    "createdAt": "2026-02-05T09:27:24.790Z",
                    "env": "",
                    "projectId": "proj-123"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let (project_id, environment_id) = client
            .create_project("My Project", "", "production")
            .await
            .unwrap();
        assert_eq!(project_id, "proj-123");
        assert_eq!(environment_id, "env-123");
    }
}
