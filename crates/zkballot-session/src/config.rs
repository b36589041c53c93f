//! Configuration Management Module
//!
//! Endpoints and timeouts of the three services a vote session talks to. Values
//! come from a JSON file, with `ZKBALLOT_*` environment variables taking
//! precedence. Nothing is hard-coded beyond local development defaults.

use std::{path::Path, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zkballot_prover::{ArtifactCache, ArtifactConfig, HttpArtifactSource, ProofGenerator};

use crate::ledger::HttpLedgerClient;
use crate::roster::HttpRosterService;

pub const ENV_ARTIFACT_URL: &str = "ZKBALLOT_ARTIFACT_URL";
pub const ENV_ARTIFACT_TIMEOUT_MS: &str = "ZKBALLOT_ARTIFACT_TIMEOUT_MS";
pub const ENV_LEDGER_URL: &str = "ZKBALLOT_LEDGER_URL";
pub const ENV_LEDGER_TIMEOUT_MS: &str = "ZKBALLOT_LEDGER_TIMEOUT_MS";
pub const ENV_ROSTER_URL: &str = "ZKBALLOT_ROSTER_URL";
pub const ENV_ROSTER_TIMEOUT_MS: &str = "ZKBALLOT_ROSTER_TIMEOUT_MS";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    #[serde(default = "default_service_url")]
    pub base_url: String,
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterConfig {
    #[serde(default = "default_service_url")]
    pub base_url: String,
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BallotConfig {
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub roster: RosterConfig,
}

fn default_service_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_submit_timeout() -> u64 {
    15_000
}

fn default_lookup_timeout() -> u64 {
    10_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { base_url: default_service_url(), submit_timeout_ms: default_submit_timeout() }
    }
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self { base_url: default_service_url(), lookup_timeout_ms: default_lookup_timeout() }
    }
}

impl LedgerConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }
}

impl RosterConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl BallotConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON file and applies environment overrides on top of it.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from any lookup, e.g. a map in tests.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_ARTIFACT_URL) {
            self.artifacts.base_url = url;
        }
        if let Some(ms) = lookup(ENV_ARTIFACT_TIMEOUT_MS) {
            self.artifacts.fetch_timeout_ms = parse_millis(ENV_ARTIFACT_TIMEOUT_MS, &ms)?;
        }
        if let Some(url) = lookup(ENV_LEDGER_URL) {
            self.ledger.base_url = url;
        }
        if let Some(ms) = lookup(ENV_LEDGER_TIMEOUT_MS) {
            self.ledger.submit_timeout_ms = parse_millis(ENV_LEDGER_TIMEOUT_MS, &ms)?;
        }
        if let Some(url) = lookup(ENV_ROSTER_URL) {
            self.roster.base_url = url;
        }
        if let Some(ms) = lookup(ENV_ROSTER_TIMEOUT_MS) {
            self.roster.lookup_timeout_ms = parse_millis(ENV_ROSTER_TIMEOUT_MS, &ms)?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("artifacts.base_url", &self.artifacts.base_url),
            ("ledger.base_url", &self.ledger.base_url),
            ("roster.base_url", &self.roster.base_url),
        ] {
            let parsed = reqwest::Url::parse(url).map_err(|e| {
                ConfigError::ValidationError(format!("{} '{}' is not a URL: {}", name, url, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::ValidationError(format!(
                    "{} must use http or https",
                    name
                )));
            }
        }

        for (name, ms) in [
            ("artifacts.fetch_timeout_ms", self.artifacts.fetch_timeout_ms),
            ("ledger.submit_timeout_ms", self.ledger.submit_timeout_ms),
            ("roster.lookup_timeout_ms", self.roster.lookup_timeout_ms),
        ] {
            if ms == 0 {
                return Err(ConfigError::ValidationError(format!("{} must be positive", name)));
            }
        }

        Ok(())
    }

    /// A generator with its own artifact cache. Build it once per process and
    /// clone it into sessions.
    pub fn proof_generator(&self) -> ProofGenerator<HttpArtifactSource> {
        let source = HttpArtifactSource::new(&self.artifacts.base_url);
        ProofGenerator::new(Arc::new(ArtifactCache::new(source, &self.artifacts)))
    }

    pub fn ledger_client(&self) -> HttpLedgerClient {
        HttpLedgerClient::new(&self.ledger)
    }

    pub fn roster_service(&self) -> HttpRosterService {
        HttpRosterService::new(&self.roster)
    }
}

fn parse_millis(name: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("{} must be a number of milliseconds", name))
    })
}
