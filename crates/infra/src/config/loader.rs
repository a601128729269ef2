//! Settings loader
//!
//! Loads integration settings from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//!
//! ## Environment Variables
//! - `FORMLINK_HOST`: Luminate hostname
//! - `FORMLINK_ORGANIZATION`: organization short name (shared domains)
//! - `FORMLINK_CUSTOM_DOMAIN`: host is a custom secure domain (true/false)
//! - `FORMLINK_API_KEY`: Luminate API key
//! - `FORMLINK_USERNAME`: API user name
//! - `FORMLINK_PASSWORD`: API user password
//! - `FORMLINK_GROUP_MAPPING_ENABLED`: enable the group step (true/false)
//! - `FORMLINK_OVERRIDE_EMPTY_FIELDS`: empty values overwrite CRM data (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./formlink.toml` (current working directory)
//! 2. `./config.toml` (current working directory)
//! 3. `../formlink.toml` (parent directory)

use std::path::{Path, PathBuf};

use formlink_domain::{
    FormlinkError, IntegrationSettings, LuminateCredentials, Result,
};

/// Load settings with automatic fallback strategy.
///
/// First attempts to load from environment variables. If the credential
/// unit is incomplete there, falls back to loading from a config file.
///
/// # Errors
/// Returns `FormlinkError::Config` if settings cannot be loaded from either
/// source or the credential unit stays incomplete.
pub fn load() -> Result<IntegrationSettings> {
    match load_from_env() {
        Ok(settings) => {
            tracing::info!("settings loaded from environment variables");
            Ok(settings)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load settings from environment variables.
///
/// # Errors
/// Returns `FormlinkError::Config` if the resulting credential unit is
/// incomplete.
pub fn load_from_env() -> Result<IntegrationSettings> {
    let credentials = LuminateCredentials {
        host: env_var("FORMLINK_HOST")?,
        organization: std::env::var("FORMLINK_ORGANIZATION").unwrap_or_default(),
        custom_domain: env_bool("FORMLINK_CUSTOM_DOMAIN", false),
        api_key: env_var("FORMLINK_API_KEY")?,
        username: env_var("FORMLINK_USERNAME")?,
        password: env_var("FORMLINK_PASSWORD")?,
    };
    credentials.validate()?;

    Ok(IntegrationSettings {
        credentials,
        group_mapping_enabled: env_bool("FORMLINK_GROUP_MAPPING_ENABLED", false),
        override_empty_fields: env_bool("FORMLINK_OVERRIDE_EMPTY_FIELDS", true),
    })
}

/// Load settings from a TOML file.
///
/// When `path` is `None`, probes the default locations listed in the module
/// documentation.
pub fn load_from_file(path: Option<&Path>) -> Result<IntegrationSettings> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => probe_default_paths().ok_or_else(|| {
            FormlinkError::Config("no settings file found in default locations".into())
        })?,
    };

    let raw = std::fs::read_to_string(&path).map_err(|e| {
        FormlinkError::Config(format!("failed to read settings file {}: {e}", path.display()))
    })?;

    let settings: IntegrationSettings = toml::from_str(&raw).map_err(|e| {
        FormlinkError::Config(format!("invalid settings file {}: {e}", path.display()))
    })?;
    settings.credentials.validate()?;

    tracing::info!(path = %path.display(), "settings loaded from file");
    Ok(settings)
}

fn probe_default_paths() -> Option<PathBuf> {
    ["./formlink.toml", "./config.toml", "../formlink.toml"]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| FormlinkError::Config(format!("missing environment variable {name}")))
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn loads_settings_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
host = "secure2.convio.net"
organization = "myorg"
api_key = "key"
username = "apiuser"
password = "apipass"
group_mapping_enabled = true
"#
        )
        .unwrap();

        let settings = load_from_file(Some(file.path())).unwrap();

        assert_eq!(settings.credentials.host, "secure2.convio.net");
        assert!(settings.group_mapping_enabled);
        assert!(settings.override_empty_fields);
    }

    #[test]
    fn rejects_incomplete_credentials_in_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
host = "secure2.convio.net"
organization = "myorg"
api_key = "key"
username = ""
password = "apipass"
"#
        )
        .unwrap();

        let err = load_from_file(Some(file.path())).unwrap_err();
        assert!(matches!(err, FormlinkError::Config(_)));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_from_file(Some(Path::new("/nonexistent/formlink.toml"))).unwrap_err();
        assert!(matches!(err, FormlinkError::Config(_)));
    }
}
