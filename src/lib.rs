pub mod config;
pub mod dokploy_client;
pub mod error;
pub mod locator;
pub mod lookup;
pub mod models;
pub mod reconcile;

pub use config::{Overrides, Settings};
pub use dokploy_client::*;
pub use error::{Error, Result};
pub use locator::FallbackPolicy;
pub use models::dokploy::*;
pub use reconcile::{ComposeSpec, DomainSpec, join_env_vars, parse_env_var};

impl DokployClient {
    pub fn from_settings(settings: Settings) -> Result<Self> {
        DokployClient::new(settings.url, settings.api_key, settings.timeout)
    }
}

/// Client pointed at a mock server, for tests.
#[cfg(test)]
pub(crate) fn test_client(base_url: &str) -> DokployClient {
    DokployClient::new(
        base_url,
        secrecy::SecretString::from("test-key"),
        DEFAULT_TIMEOUT,
    )
    .unwrap()
}
