//! Configuration resolution for mav-viewer
//!
//! Loads the TOML bootstrap file (if any) and merges CLI and environment
//! overrides on top of it, then turns the result into the pieces the core
//! needs: an HTTP source, a retry policy and a request context.

use crate::telemetry::RetryPolicy;
use crate::transport::{HttpContentClient, RequestContext};
use mav_common::config::{load_toml_config, resolve_config_path, ResolvedSettings, TomlConfig};
use mav_common::{Error, Result};
use std::path::{Path, PathBuf};

/// Command-line overrides
#[derive(Debug, Clone, Default)]
pub struct CliOverrides<'a> {
    pub config_path: Option<&'a Path>,
    pub base_url: Option<&'a str>,
    pub token: Option<&'a str>,
}

/// Locate and read the TOML bootstrap file
///
/// Returns the file actually used, if any, so the caller can log it once
/// tracing is up.
pub fn load_toml(config_path: Option<&Path>) -> Result<(TomlConfig, Option<PathBuf>)> {
    match resolve_config_path(config_path) {
        Some(path) => Ok((load_toml_config(&path)?, Some(path))),
        None => Ok((TomlConfig::default(), None)),
    }
}

/// Merge overrides over `toml_config`: CLI → ENV → TOML → compiled defaults
pub fn resolve_settings(toml_config: &TomlConfig, overrides: &CliOverrides<'_>) -> ResolvedSettings {
    ResolvedSettings::resolve(toml_config, overrides.base_url, overrides.token)
}

/// Credential context derived from settings
pub fn request_context(settings: &ResolvedSettings) -> RequestContext {
    RequestContext {
        auth_token: settings.api_token.clone(),
    }
}

pub fn retry_policy(settings: &ResolvedSettings) -> RetryPolicy {
    RetryPolicy::from_config(&settings.telemetry)
}

pub fn http_source(settings: &ResolvedSettings) -> Result<HttpContentClient> {
    HttpContentClient::from_settings(settings)
        .map_err(|e| Error::Config(format!("HTTP client setup failed: {}", e)))
}
