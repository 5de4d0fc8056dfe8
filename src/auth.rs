use serde::Deserialize;

use crate::types::{ApiKey, OrganizationId, SentryApp};

#[derive(Deserialize, Clone, Debug)]
pub struct TokenConfig {
    pub token: ApiKey,
    pub organization: OrganizationId,
    #[serde(default)]
    pub superuser: bool,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// Static bearer tokens, each one bound to an organization.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    tokens: Vec<TokenConfig>,
}

impl AccessPolicy {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            tokens: config.tokens,
        }
    }

    pub fn grant_for(&self, api_key: &ApiKey) -> Option<&TokenConfig> {
        self.tokens.iter().find(|t| &t.token == api_key)
    }

    /// Stats are visible to the organization owning the app and to superusers.
    pub fn can_read_stats(&self, grant: &TokenConfig, app: &SentryApp) -> bool {
        grant.superuser || grant.organization == app.owner
    }
}
