//! Configuration data structures for scorewall.
//!
//! These types map directly to YAML (also TOML / JSON) configuration files. They are
//! serde-friendly and include defaults so that minimal configs remain concise.
//! Rules themselves are not expressed here: locations reference directive files and
//! inline directives, which are compiled by [`crate::core::waf::WafEngine`].
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_upstream_timeout() -> String {
    "30s".to_string()
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "scorewall=debug"
    pub level: String,
    /// Emit JSON lines instead of pretty console output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// One inspected location (URL prefix).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LocationConfig {
    /// Path prefix; the longest matching prefix wins
    pub prefix: String,
    /// Inline directives, one per entry (`SecRulesEnabled`, `CheckRule "$SQL >= 8" BLOCK`, ...)
    #[serde(default)]
    pub directives: Vec<String>,
    /// Directive files applied before the inline directives
    #[serde(default)]
    pub rules_files: Vec<String>,
}

impl LocationConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            directives: Vec::new(),
            rules_files: Vec::new(),
        }
    }

    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn rules_file(mut self, path: impl Into<String>) -> Self {
        self.rules_files.push(path.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Base URL requests are forwarded to once allowed; without it allowed
    /// requests are answered locally
    #[serde(default)]
    pub upstream: Option<String>,
    /// Upstream request timeout, humantime format ("30s", "2m")
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: String,
    /// Bytes of request body buffered for inspection
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// `MainRule` directive files shared by every location
    #[serde(default)]
    pub main_rules: Vec<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub locations: Vec<LocationConfig>,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Parsed `upstream_timeout`.
    pub fn upstream_timeout(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.upstream_timeout)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            upstream: None,
            upstream_timeout: default_upstream_timeout(),
            max_body_size: default_max_body_size(),
            main_rules: Vec::new(),
            logging: LoggingConfig::default(),
            locations: Vec::new(),
        }
    }
}

/// Builder for ServerConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ServerConfigBuilder {
    listen_addr: Option<String>,
    upstream: Option<String>,
    upstream_timeout: Option<String>,
    max_body_size: Option<usize>,
    main_rules: Vec<String>,
    logging: Option<LoggingConfig>,
    locations: Vec<LocationConfig>,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    pub fn upstream(mut self, url: impl Into<String>) -> Self {
        self.upstream = Some(url.into());
        self
    }

    pub fn upstream_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.upstream_timeout = Some(timeout.into());
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = Some(bytes);
        self
    }

    /// Add a `MainRule` directive file
    pub fn main_rules(mut self, path: impl Into<String>) -> Self {
        self.main_rules.push(path.into());
        self
    }

    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Add an inspected location
    pub fn location(mut self, location: LocationConfig) -> Self {
        self.locations.push(location);
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> Result<ServerConfig, String> {
        if self.locations.is_empty() {
            return Err("At least one location must be configured".to_string());
        }

        Ok(ServerConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            upstream: self.upstream,
            upstream_timeout: self
                .upstream_timeout
                .unwrap_or_else(default_upstream_timeout),
            max_body_size: self.max_body_size.unwrap_or_else(default_max_body_size),
            main_rules: self.main_rules,
            logging: self.logging.unwrap_or_default(),
            locations: self.locations,
        })
    }
}
