use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the Dokploy client and the reconcilers built on it.
#[derive(Error, Debug)]
pub enum Error {
    /// A required argument was missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The request could not be built or sent.
    #[error("request to {path} failed")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {path} timed out after {}s", .timeout.as_secs())]
    Timeout { path: String, timeout: Duration },

    /// The server answered with a status >= 400.
    #[error("{path} returned {status}")]
    Status { path: String, status: StatusCode },

    /// The response body was not the JSON we expected.
    #[error("failed to decode response from {path}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("project not found: {name:?}")]
    ProjectNotFound { name: String },

    #[error("environment not found for project {project:?}: {environment:?}")]
    EnvironmentNotFound {
        project: String,
        environment: String,
    },
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// True for the lookup-by-name failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ProjectNotFound { .. } | Error::EnvironmentNotFound { .. }
        )
    }

    /// True for everything that went wrong on the wire.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. } | Error::Timeout { .. } | Error::Status { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_messages_name_the_missing_resource() {
        let project = Error::ProjectNotFound {
            name: "missing".to_string(),
        };
        assert!(project.to_string().contains("project not found"));
        assert!(project.is_not_found());

        let env = Error::EnvironmentNotFound {
            project: "project-one".to_string(),
            environment: "staging".to_string(),
        };
        assert!(env.to_string().contains("environment not found for project"));
        assert!(!env.to_string().contains("project not found"));
        assert!(env.is_not_found());
    }

    #[test]
    fn status_error_carries_status_text() {
        let err = Error::Status {
            path: "/api/project.all".to_string(),
            status: StatusCode::BAD_REQUEST,
        };
        assert_eq!(err.to_string(), "/api/project.all returned 400 Bad Request");
        assert!(err.is_transport());
        assert!(!err.is_not_found());
    }

    #[test]
    fn cause_appears_once_in_error_chain() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let cause = source.to_string();
        let err = Error::Decode {
            path: "/api/project.all".to_string(),
            source,
        };
        assert_eq!(
            err.to_string(),
            "failed to decode response from /api/project.all"
        );

        let chain = format!("{:#}", anyhow::Error::from(err));
        assert_eq!(chain.matches(cause.as_str()).count(), 1, "chain: {chain}");
    }
}
