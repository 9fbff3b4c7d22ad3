//! Bootstrap configuration loading and resolution
//!
//! Settings come from four sources, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! A missing TOML file is never fatal: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the config file location
pub const ENV_CONFIG_PATH: &str = "MAV_CONFIG";
/// Environment variable overriding the content service base URL
pub const ENV_API_BASE_URL: &str = "MAV_API_BASE_URL";
/// Environment variable carrying the caller credential
pub const ENV_API_TOKEN: &str = "MAV_API_TOKEN";

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_TELEMETRY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_TELEMETRY_BACKOFF_MS: u64 = 250;

/// Standard User-Agent for outbound HTTP requests
pub fn get_user_agent() -> String {
    format!("mav-viewer/{}", env!("CARGO_PKG_VERSION"))
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Base URL of the content service (no trailing slash required)
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Bearer credential passed explicitly into every core call
    #[serde(default)]
    pub api_token: Option<String>,

    /// Total request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Telemetry retry bounds
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            api_token: None,
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Telemetry delivery bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Maximum delivery attempts per event (1 = no retry)
    #[serde(default = "default_telemetry_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles after each failure
    #[serde(default = "default_telemetry_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_telemetry_max_attempts(),
            initial_backoff_ms: default_telemetry_backoff_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_telemetry_max_attempts() -> u32 {
    DEFAULT_TELEMETRY_MAX_ATTEMPTS
}

fn default_telemetry_backoff_ms() -> u64 {
    DEFAULT_TELEMETRY_BACKOFF_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Compiled-in defaults, used when no other source provides a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub api_base_url: String,
    pub config_path: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            config_path: dirs::config_dir().map(|d| d.join("mav").join("viewer.toml")),
        }
    }
}

/// Resolve the config file path: CLI → `MAV_CONFIG` → platform config dir
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    CompiledDefaults::for_current_platform().config_path
}

/// Load TOML config from `path`
///
/// Missing file → defaults with a warning. A file that exists but does not
/// parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "Config file not found, using compiled defaults"
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    debug!(path = %path.display(), "Loaded TOML config");
    Ok(config)
}

/// Write TOML config atomically (temp file + rename)
///
/// On Unix the file is created with mode 0600 since it may hold a credential.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    {
        let mut file = open_private(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(unix)]
fn open_private(path: &Path) -> Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    Ok(std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> Result<std::fs::File> {
    Ok(std::fs::File::create(path)?)
}

/// Pick the highest-priority value among CLI → ENV → TOML
///
/// Warns when more than one source supplied a usable value. Values are never
/// logged, only their source.
pub fn resolve_setting(
    label: &str,
    cli_arg: Option<&str>,
    env_var_name: &str,
    toml_value: Option<&str>,
) -> Option<(String, &'static str)> {
    let env_value = std::env::var(env_var_name).ok();

    let candidates: [(Option<&str>, &'static str); 3] = [
        (cli_arg, "command line"),
        (env_value.as_deref(), "environment"),
        (toml_value, "TOML"),
    ];

    let usable: Vec<(&str, &'static str)> = candidates
        .iter()
        .filter_map(|(value, source)| value.filter(|v| is_valid_value(v)).map(|v| (v, *source)))
        .collect();

    if usable.len() > 1 {
        let sources: Vec<&str> = usable.iter().map(|(_, s)| *s).collect();
        warn!(
            "{} found in multiple sources: {}. Using {} (highest priority).",
            label,
            sources.join(", "),
            usable[0].1
        );
    }

    usable.first().map(|(value, source)| {
        info!("{} loaded from {}", label, source);
        (value.trim().to_string(), *source)
    })
}

/// Non-empty, non-whitespace
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Fully resolved settings for building a viewer client
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

impl ResolvedSettings {
    /// Merge CLI overrides, environment and TOML into final settings
    pub fn resolve(
        toml_config: &TomlConfig,
        cli_base_url: Option<&str>,
        cli_token: Option<&str>,
    ) -> Self {
        let defaults = CompiledDefaults::for_current_platform();

        let api_base_url = resolve_setting(
            "API base URL",
            cli_base_url,
            ENV_API_BASE_URL,
            toml_config.api_base_url.as_deref(),
        )
        .map(|(value, _)| value)
        .unwrap_or(defaults.api_base_url);

        let api_token = resolve_setting(
            "API token",
            cli_token,
            ENV_API_TOKEN,
            toml_config.api_token.as_deref(),
        )
        .map(|(value, _)| value);

        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api_token,
            request_timeout_ms: toml_config.request_timeout_ms,
            connect_timeout_ms: toml_config.connect_timeout_ms,
            telemetry: toml_config.telemetry.clone(),
            logging: toml_config.logging.clone(),
        }
    }
}
