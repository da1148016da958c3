//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `CHECKIN_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `CHECKIN_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `CHECKIN_CONSOLE__BASE_URL=https://console.example.com` sets `console.base_url`.
//!
//! ## Example
//!
//! ```yaml
//! console:
//!   base_url: https://console.example.com
//!   request_timeout: 30s
//! ledger:
//!   url: https://ledger.example.com/rpc
//!   api_key: secret
//! accounts:
//!   - name: main
//!     session: "MTcw..."
//!     account_id: "1234"
//!     tokens:
//!       - name: sold_alice
//!         remain_quota: 2500000
//!       - id: 7
//!         supplement_quota: 500000
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use crate::api::models::token::DesiredToken;
use crate::errors::Error;
use crate::types::{AccountIdentity, SessionCredential};

/// CLI args: config file location plus run selection
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "CHECKIN_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without contacting any remote service.
    #[arg(long)]
    pub validate: bool,

    /// Only run the account with this name
    #[arg(long)]
    pub account: Option<String>,

    /// Write the JSON run summary to this path
    #[arg(short = 'o', long)]
    pub output: Option<String>,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Console the accounts live on
    pub console: ConsoleConfig,
    /// External bookkeeping service. Sale keys are not mirrored when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerConfig>,
    /// Accounts processed by this run, in order
    pub accounts: Vec<AccountConfig>,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// How to reach the console.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleConfig {
    pub base_url: Url,
    /// Per-request timeout enforced by the session
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Header carrying the account identifier on every call
    pub identity_header: String,
    /// Cookie the session credential is sent as
    pub session_cookie: String,
}

/// External ledger RPC endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Type tag stored on every uploaded key
    #[serde(default = "LedgerConfig::default_key_type")]
    pub key_type: String,
    #[serde(default = "LedgerConfig::default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// One console account and its declared tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub name: String,
    pub session: SessionCredential,
    pub account_id: String,
    #[serde(default)]
    pub tokens: Vec<DesiredToken>,
    #[serde(default = "AccountConfig::default_enabled")]
    pub enabled: bool,
}

impl AccountConfig {
    fn default_enabled() -> bool {
        true
    }

    pub fn identity(&self) -> Result<AccountIdentity, Error> {
        AccountIdentity::new(self.session.clone(), self.account_id.clone())
    }
}

impl LedgerConfig {
    fn default_key_type() -> String {
        "newapi".to_string()
    }

    fn default_request_timeout() -> Duration {
        Duration::from_secs(30)
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:3000").expect("static url is valid"),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("checkin/", env!("CARGO_PKG_VERSION")).to_string(),
            identity_header: "New-Api-User".to_string(),
            session_cookie: "session".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            console: ConsoleConfig::default(),
            ledger: None,
            accounts: vec![],
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let mut names = HashSet::new();
        for account in &self.accounts {
            if !names.insert(account.name.as_str()) {
                return Err(invalid(format!("Config validation: duplicate account name '{}'", account.name)));
            }

            if account.enabled {
                account
                    .identity()
                    .map_err(|e| invalid(format!("Config validation: account '{}': {}", account.name, e)))?;
            }

            for (index, token) in account.tokens.iter().enumerate() {
                if token.supplement_quota < 0 {
                    return Err(invalid(format!(
                        "Config validation: account '{}' token #{}: supplement_quota cannot be negative",
                        account.name, index
                    )));
                }
                if token.remain_quota.is_some_and(|q| q < 0) {
                    return Err(invalid(format!(
                        "Config validation: account '{}' token #{}: remain_quota cannot be negative",
                        account.name, index
                    )));
                }
                if token.is_deleted && token.id.is_none() {
                    return Err(invalid(format!(
                        "Config validation: account '{}' token #{}: is_deleted requires an id",
                        account.name, index
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("CHECKIN_").ignore(&["CONFIG"]).split("__"))
    }

    /// Enabled accounts, optionally narrowed to a single name.
    pub fn selected_accounts(&self, only: Option<&str>) -> Vec<AccountConfig> {
        self.accounts
            .iter()
            .filter(|a| a.enabled)
            .filter(|a| only.is_none_or(|name| a.name == name))
            .cloned()
            .collect()
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidRequest { message }
}
