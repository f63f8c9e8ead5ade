//! Node configuration loading.
//!
//! Reads an optional `vcp-node.yaml`, interpolates environment variables
//! into it, then applies the deployment's environment overrides
//! (`Main_Server_URL`, `VCP_Key`, `ServerName`, `DebugMode`, `PluginDir`).
//! The result is immutable for the life of the process.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::connection::{ConnectionError, ConnectionSettings};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Config file searched for upward from the working directory.
pub const CONFIG_FILE_NAME: &str = "vcp-node.yaml";

/// Environment variable pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "VCP_NODE_CONFIG";

const DEFAULT_SERVER_NAME: &str = "Unnamed-Distributed-Server";

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Configuration file errors. Missing endpoint/credential is reported
/// separately as [`ConnectionError::ConfigMissing`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read {
        path: String,
        reason: String,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse {
        path: String,
        reason: String,
    },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging destination and format.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogConfig {
    /// Write to a log file instead of stderr.
    #[serde(default)]
    pub file: bool,
    /// Log file path. Defaults to `node.log` in the platform data directory.
    #[serde(default)]
    pub path: Option<String>,
    /// Rotated files kept at startup.
    #[serde(default = "default_log_keep")]
    pub keep: u32,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: false,
            path: None,
            keep: default_log_keep(),
            format: LogFormat::Text,
        }
    }
}

fn default_log_keep() -> u32 {
    3
}

fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

fn default_plugin_dir() -> PathBuf {
    PathBuf::from("Plugin")
}

/// Process configuration for one node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    /// Coordinator base URL, e.g. `ws://host:6005`.
    #[serde(default)]
    pub main_server_url: Option<String>,
    /// Pre-shared credential embedded in the endpoint URL.
    #[serde(default)]
    pub vcp_key: Option<String>,
    /// Display name sent with the tool registration.
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default)]
    pub debug_mode: bool,
    /// Directory scanned for stdio plugins.
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: PathBuf,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            main_server_url: None,
            vcp_key: None,
            server_name: default_server_name(),
            debug_mode: false,
            plugin_dir: default_plugin_dir(),
            log: LogConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Validated endpoint and credential for the Connection Manager.
    pub fn connection_settings(&self) -> Result<ConnectionSettings, ConnectionError> {
        ConnectionSettings::new(self.main_server_url.as_deref(), self.vcp_key.as_deref())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("Main_Server_URL") {
            self.main_server_url = Some(url);
        }
        if let Some(key) = lookup("VCP_Key") {
            self.vcp_key = Some(key);
        }
        if let Some(name) = lookup("ServerName").filter(|n| !n.trim().is_empty()) {
            self.server_name = name;
        }
        if let Some(debug) = lookup("DebugMode") {
            self.debug_mode = debug.trim().eq_ignore_ascii_case("true");
        }
        if let Some(dir) = lookup("PluginDir").filter(|d| !d.trim().is_empty()) {
            self.plugin_dir = PathBuf::from(expand_tilde(&dir));
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// `VCP_NODE_CONFIG` wins if it names an existing file; otherwise searches
/// upward from `start` for `vcp-node.yaml`. `None` means run on defaults.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    // 1. Check env var
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.is_file() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_PATH_ENV} does not name a file");
    }

    // 2. Walk upward from `start`
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Parse a config file, interpolating `${VAR}` / `${VAR:-default}` first.
pub fn load_config_file(path: &Path) -> Result<NodeConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    parse_config(&raw).map_err(|reason| ConfigError::Parse {
        path: path.display().to_string(),
        reason,
    })
}

fn parse_config(raw: &str) -> Result<NodeConfig, String> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(NodeConfig::default());
    }
    let mut config: NodeConfig = serde_yaml::from_str(&interpolated).map_err(|e| e.to_string())?;
    config.plugin_dir = PathBuf::from(expand_tilde(&config.plugin_dir.to_string_lossy()));
    Ok(config)
}

/// Full startup resolution: file (if any), then environment overrides.
pub fn load_node_config(start: &Path) -> Result<NodeConfig, ConfigError> {
    let mut config = match find_config_path(start) {
        Some(path) => load_config_file(&path)?,
        None => NodeConfig::default(),
    };
    config.apply_overrides(|name| std::env::var(name).ok());
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((var_name, default)) => {
            std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
        }
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
