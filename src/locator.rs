//! Finding an existing domain of a compose before deciding create vs update.

use crate::dokploy_client::DokployClient;
use crate::error::Result;
use crate::models::dokploy::Domain;

/// What to do when a compose has domains but none matches host and path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Take the first listed domain, so re-running never piles up
    /// duplicates. It can update a domain with a different host or path.
    #[default]
    FirstCandidate,
    /// Only an exact host and path match counts.
    ExactOnly,
}

/// Pick at most one domain: the first exact host/path match, otherwise
/// whatever `policy` allows.
pub fn select_domain<'a>(
    domains: &'a [Domain],
    host: &str,
    path: &str,
    policy: FallbackPolicy,
) -> Option<&'a Domain> {
    if let Some(exact) = domains.iter().find(|d| d.matches(host, path)) {
        return Some(exact);
    }
    match policy {
        FallbackPolicy::FirstCandidate => {
            let first = domains.first()?;
            tracing::warn!(
                domain_id = %first.domain_id,
                existing_host = %first.host,
                host,
                path,
                "no domain matches host and path, falling back to the first one"
            );
            Some(first)
        }
        FallbackPolicy::ExactOnly => None,
    }
}

impl DokployClient {
    /// Look up the id of a domain of `compose_id` that should be updated
    /// rather than created. An empty compose id means there is nothing to
    /// search and no request is made.
    pub async fn find_existing_domain_id(
        &self,
        compose_id: &str,
        host: &str,
        path: &str,
        policy: FallbackPolicy,
    ) -> Result<Option<String>> {
        if compose_id.is_empty() {
            return Ok(None);
        }
        let domains = self.list_domains_by_compose_id(compose_id).await?;
        Ok(select_domain(&domains, host, path, policy).map(|d| d.domain_id.clone()))
    }
}
