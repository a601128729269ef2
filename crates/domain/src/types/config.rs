//! Connection credentials and plugin-level settings.

use serde::{Deserialize, Serialize};

use crate::errors::{FormlinkError, Result};

/// Credentials for one Luminate instance.
///
/// Every API-dependent operation needs the full unit, so validation happens
/// here rather than piecemeal at call sites.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LuminateCredentials {
    /// Hostname the Luminate instance is served from, e.g. `secure2.convio.net`.
    pub host: String,
    /// Organization short name; part of the servlet path on shared domains.
    #[serde(default)]
    pub organization: String,
    /// Set when the instance runs on a custom secure domain. The organization
    /// segment is omitted from API URLs in that case.
    #[serde(default)]
    pub custom_domain: bool,
    pub api_key: String,
    pub username: String,
    pub password: String,
}

impl LuminateCredentials {
    /// Check that the credential unit is complete.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty()
            || self.api_key.trim().is_empty()
            || self.username.trim().is_empty()
            || self.password.trim().is_empty()
        {
            return Err(FormlinkError::Config(
                "Luminate credentials are incomplete: host, API key, username, and password \
                 are all required"
                    .into(),
            ));
        }

        if !self.custom_domain && self.organization.trim().is_empty() {
            return Err(FormlinkError::Config(
                "Luminate credentials are incomplete: set the organization short name or mark \
                 the host as a custom domain"
                    .into(),
            ));
        }

        Ok(())
    }

    /// Base URL of the Luminate API for this instance.
    pub fn api_url(&self) -> String {
        let host = format_host(&self.host);

        if self.custom_domain {
            format!("https://{host}/site")
        } else {
            format!("https://{host}/{}/site", self.organization)
        }
    }
}

/// Reduce a host setting to a bare hostname.
///
/// Users paste full URLs into the host field; anything beyond a hostname
/// confuses the remote servlet routing.
pub fn format_host(host: &str) -> String {
    let mut host = host.trim();

    if let Some(rest) = host.strip_prefix("https://").or_else(|| host.strip_prefix("http://")) {
        host = rest;
    }

    host.split('/')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect()
}

/// Integration settings as stored by the host plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationSettings {
    #[serde(flatten)]
    pub credentials: LuminateCredentials,
    /// Enables the group-membership mapping step for feeds.
    #[serde(default)]
    pub group_mapping_enabled: bool,
    /// When set, mapped-but-empty form values overwrite stored CRM values.
    /// Off, they are skipped so partial resubmissions cannot blank out data.
    #[serde(default = "default_true")]
    pub override_empty_fields: bool,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            credentials: LuminateCredentials::default(),
            group_mapping_enabled: false,
            override_empty_fields: true,
        }
    }
}

fn default_true() -> bool {
    true
}
