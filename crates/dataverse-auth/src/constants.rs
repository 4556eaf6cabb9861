//! Identity platform endpoints and cache policy

use std::time::Duration;

/// Public-cloud authority. Sovereign clouds override this through config.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// A cached token is refreshed once it is this close to expiry.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Token endpoint for a tenant: `{authority}/{tenant}/oauth2/v2.0/token`.
pub fn token_endpoint(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

/// App-only scope for a resource: `{resource}/.default`.
pub fn resource_scope(resource_url: &str) -> String {
    format!("{}/.default", resource_url.trim_end_matches('/'))
}
