//! TOML configuration for the command-line client.
//!
//! The file is optional.  It is looked up in this order:
//!
//! 1. the `--config <path>` flag;
//! 2. the `CASTCTL_CONFIG` environment variable;
//! 3. `$XDG_CONFIG_HOME/castctl/config.toml`, else `~/.config/castctl/config.toml`.
//!
//! A file named explicitly (1 or 2) must exist.  The default location may be
//! missing, in which case every setting takes its default value.
//!
//! ```toml
//! [client]
//! log_level = "info"
//! default_port = 8009
//! step_timeout_ms = 0        # 0 disables step timeouts
//! hello_hold_ms = 10
//!
//! [hello]
//! app_id = "794B7BBF"
//! namespace = "urn:x-cast:com.google.cast.sample.helloworld"
//!
//! [tictactoe]
//! namespace = "urn:x-cast:com.google.cast.demo.tictactoe"
//! player_name = "castctl"
//!
//! [discovery]
//! port = 5354
//! offline_after_ms = 15000
//!
//! [[url_launchers]]
//! name = "web"
//! description = "Open a page in the browser receiver"
//! app_id = "5CB45E5A"
//! namespace = "urn:x-cast:com.url.cast"
//! payload = "url"
//! ```
//!
//! Fields missing from the file fall back to the `default_*` helpers below, so
//! a partial file is always valid.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use castctl_core::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::commands::UrlLauncher;
use crate::application::transport::{ConnectOptions, ScanOptions};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CASTCTL_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub hello: HelloConfig,
    #[serde(default)]
    pub tictactoe: TicTacToeConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Extra URL-launch subcommands.  An entry named like the built-in
    /// `media` launcher replaces it.
    #[serde(default)]
    pub url_launchers: Vec<UrlLauncher>,
}

/// General client behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// `tracing` filter used when neither `RUST_LOG` nor `--debug` is given.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Device port used when `--port` is absent.
    #[serde(default = "default_port")]
    pub default_port: u16,
    /// Upper bound on connect, resolve and join, in milliseconds.
    /// `0` waits forever.
    #[serde(default)]
    pub step_timeout_ms: u64,
    /// How long `hello` keeps the connection open after delivery.
    #[serde(default = "default_hello_hold_ms")]
    pub hello_hold_ms: u64,
}

/// The hello-world receiver application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HelloConfig {
    #[serde(default = "default_hello_app_id")]
    pub app_id: String,
    #[serde(default = "default_hello_namespace")]
    pub namespace: String,
}

/// The tic-tac-toe receiver application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicTacToeConfig {
    #[serde(default = "default_tictactoe_namespace")]
    pub namespace: String,
    /// Name announced in the `join` request.
    #[serde(default = "default_player_name")]
    pub player_name: String,
}

/// Discovery listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    #[serde(default = "default_offline_after_ms")]
    pub offline_after_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_hello_hold_ms() -> u64 {
    10
}
fn default_hello_app_id() -> String {
    "794B7BBF".to_string()
}
fn default_hello_namespace() -> String {
    "urn:x-cast:com.google.cast.sample.helloworld".to_string()
}
fn default_tictactoe_namespace() -> String {
    "urn:x-cast:com.google.cast.demo.tictactoe".to_string()
}
fn default_player_name() -> String {
    "castctl".to_string()
}
fn default_discovery_port() -> u16 {
    5354
}
fn default_offline_after_ms() -> u64 {
    15_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            default_port: default_port(),
            step_timeout_ms: 0,
            hello_hold_ms: default_hello_hold_ms(),
        }
    }
}

impl Default for HelloConfig {
    fn default() -> Self {
        Self {
            app_id: default_hello_app_id(),
            namespace: default_hello_namespace(),
        }
    }
}

impl Default for TicTacToeConfig {
    fn default() -> Self {
        Self {
            namespace: default_tictactoe_namespace(),
            player_name: default_player_name(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
            offline_after_ms: default_offline_after_ms(),
        }
    }
}

// ── Derived settings ──────────────────────────────────────────────────────────

impl AppConfig {
    pub fn step_timeout(&self) -> Option<Duration> {
        match self.client.step_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn hello_hold(&self) -> Duration {
        Duration::from_millis(self.client.hello_hold_ms)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            reconnect: false,
            step_timeout: self.step_timeout(),
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            port: self.discovery.port,
            offline_after: Duration::from_millis(self.discovery.offline_after_ms),
        }
    }

    /// The built-in launcher followed by the configured ones, later entries
    /// replacing earlier ones of the same name.
    pub fn launchers(&self) -> Vec<UrlLauncher> {
        let mut launchers = vec![UrlLauncher::builtin_media()];
        for entry in &self.url_launchers {
            match launchers.iter_mut().find(|l| l.name == entry.name) {
                Some(existing) => *existing = entry.clone(),
                None => launchers.push(entry.clone()),
            }
        }
        launchers
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Where to look for the config file and whether it has to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    pub required: bool,
}

/// Resolves the config file location.
///
/// `env` is consulted for `CASTCTL_CONFIG`, `XDG_CONFIG_HOME` and `HOME`;
/// pass `|k| std::env::var_os(k)` outside tests.  Returns `None` when no
/// candidate location can be determined.
pub fn config_location<E>(explicit: Option<&Path>, env: E) -> Option<ConfigLocation>
where
    E: Fn(&str) -> Option<OsString>,
{
    if let Some(path) = explicit {
        return Some(ConfigLocation {
            path: path.to_path_buf(),
            required: true,
        });
    }
    if let Some(path) = env(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(ConfigLocation {
            path: PathBuf::from(path),
            required: true,
        });
    }
    let base = env("XDG_CONFIG_HOME")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .or_else(|| env("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(ConfigLocation {
        path: base.join("castctl").join("config.toml"),
        required: false,
    })
}

/// Parses a config file body.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads the configuration, falling back to defaults when the default
/// location has no file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for a missing explicit file or any other
/// file-system error, and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let Some(location) = config_location(explicit, |k| std::env::var_os(k)) else {
        return Ok(AppConfig::default());
    };

    match std::fs::read_to_string(&location.path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !location.required => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: location.path,
            source,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::commands::UrlPayload;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |k| map.get(k).cloned()
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_config_matches_documented_values() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.client.log_level, "info");
        assert_eq!(cfg.client.default_port, 8009);
        assert_eq!(cfg.step_timeout(), None);
        assert_eq!(cfg.hello_hold(), Duration::from_millis(10));
        assert_eq!(cfg.hello.app_id, "794B7BBF");
        assert_eq!(cfg.tictactoe.namespace, "urn:x-cast:com.google.cast.demo.tictactoe");
        assert_eq!(cfg.scan_options(), ScanOptions::default());
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        assert_eq!(parse_config("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        // Arrange
        let toml = "[client]\nstep_timeout_ms = 2500\n";

        // Act
        let cfg = parse_config(toml).unwrap();

        // Assert
        assert_eq!(cfg.step_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(cfg.client.hello_hold_ms, 10);
        assert_eq!(cfg.client.log_level, "info");
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        assert!(matches!(parse_config("[client"), Err(ConfigError::Parse(_))));
    }

    // ── Launchers ─────────────────────────────────────────────────────────────

    #[test]
    fn test_builtin_media_launcher_always_present() {
        let launchers = AppConfig::default().launchers();

        assert_eq!(launchers, vec![UrlLauncher::builtin_media()]);
    }

    #[test]
    fn test_configured_launchers_add_and_override_by_name() {
        // Arrange
        let toml = r#"
            [[url_launchers]]
            name = "web"
            description = "Open a page"
            app_id = "5CB45E5A"
            namespace = "urn:x-cast:com.url.cast"
            payload = "url"

            [[url_launchers]]
            name = "media"
            description = "Custom media app"
            app_id = "ABCDEF01"
            namespace = "urn:x-cast:com.google.cast.media"
            payload = "media"
        "#;

        // Act
        let launchers = parse_config(toml).unwrap().launchers();

        // Assert
        assert_eq!(launchers.len(), 2);
        assert_eq!(launchers[0].name, "media");
        assert_eq!(launchers[0].app_id, "ABCDEF01");
        assert_eq!(launchers[1].name, "web");
        assert_eq!(launchers[1].payload, UrlPayload::Plain);
    }

    // ── Location ──────────────────────────────────────────────────────────────

    #[test]
    fn test_explicit_path_wins_and_is_required() {
        let env = env_of(&[(CONFIG_ENV, "/etc/castctl.toml")]);

        let location = config_location(Some(Path::new("/tmp/c.toml")), env).unwrap();

        assert_eq!(location.path, PathBuf::from("/tmp/c.toml"));
        assert!(location.required);
    }

    #[test]
    fn test_env_var_beats_default_location() {
        let env = env_of(&[(CONFIG_ENV, "/etc/castctl.toml"), ("HOME", "/home/u")]);

        let location = config_location(None, env).unwrap();

        assert_eq!(location.path, PathBuf::from("/etc/castctl.toml"));
        assert!(location.required);
    }

    #[test]
    fn test_default_location_prefers_xdg_and_is_optional() {
        let env = env_of(&[("XDG_CONFIG_HOME", "/xdg"), ("HOME", "/home/u")]);

        let location = config_location(None, env).unwrap();

        assert_eq!(location.path, PathBuf::from("/xdg/castctl/config.toml"));
        assert!(!location.required);
    }

    #[test]
    fn test_default_location_falls_back_to_home() {
        let location = config_location(None, env_of(&[("HOME", "/home/u")])).unwrap();

        assert_eq!(location.path, PathBuf::from("/home/u/.config/castctl/config.toml"));
    }

    #[test]
    fn test_missing_explicit_file_is_io_error() {
        let result = load_config(Some(Path::new("/nonexistent/castctl/config.toml")));

        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
