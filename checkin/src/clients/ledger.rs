//! Client for the external bookkeeping service that tracks sale keys.
//!
//! The ledger exposes two RPC operations, `addKeys` and `updateKeyInfo`, both answering with
//! `{success, error?}`. Failures never propagate: they come back as an unsuccessful
//! [`LedgerOutcome`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::api::models::ledger::{KeyInfoUpdate, LedgerKeyRecord, LedgerOutcome};
use crate::config::LedgerConfig;
use crate::errors::{Error, Result};
use crate::session::ensure_slash;

/// Abstract ledger interface.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Bulk-insert newly minted sale keys.
    async fn add_keys(&self, records: &[LedgerKeyRecord]) -> LedgerOutcome;

    /// Apply an incremental and/or absolute update to one key.
    async fn update_key_info(&self, update: &KeyInfoUpdate) -> LedgerOutcome;
}

/// Ledger reached over HTTP.
pub struct HttpLedger {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpLedger {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Other(anyhow::anyhow!("Failed to create ledger HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: ensure_slash(&config.url),
            api_key: config.api_key.clone(),
        })
    }

    async fn rpc<B: Serialize + ?Sized>(&self, operation: &str, body: &B) -> Result<LedgerOutcome> {
        let url = self.base_url.join(operation).map_err(|e| Error::InvalidRequest {
            message: format!("Failed to construct ledger URL for {}: {}", operation, e),
        })?;

        let mut request = self.client.post(url).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body_text = response.text().await?;

        if !status.is_success() {
            return Err(Error::Transport {
                message: format!("ledger {} returned HTTP {}: {}", operation, status, body_text),
            });
        }

        serde_json::from_str(&body_text).map_err(|e| Error::Decode {
            what: format!("ledger {} response", operation),
            message: e.to_string(),
        })
    }
}

fn fold(operation: &str, result: Result<LedgerOutcome>) -> LedgerOutcome {
    match result {
        Ok(outcome) => {
            if outcome.success {
                debug!(operation, "Ledger call succeeded");
            } else {
                warn!(operation, error = ?outcome.error, "Ledger rejected call");
            }
            outcome
        }
        Err(e) => {
            warn!(operation, error = %e, "Ledger call failed");
            LedgerOutcome::failed(e.to_string())
        }
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn add_keys(&self, records: &[LedgerKeyRecord]) -> LedgerOutcome {
        fold("addKeys", self.rpc("addKeys", &json!({ "keys": records })).await)
    }

    #[instrument(skip(self, update))]
    async fn update_key_info(&self, update: &KeyInfoUpdate) -> LedgerOutcome {
        if update.inc_data.is_none() && update.update_data.is_none() {
            return LedgerOutcome::failed("updateKeyInfo requires incData or updateData");
        }
        fold("updateKeyInfo", self.rpc("updateKeyInfo", update).await)
    }
}

/// Used when no ledger is configured. Every call succeeds without leaving the process.
pub struct NoopLedger;

#[async_trait]
impl Ledger for NoopLedger {
    async fn add_keys(&self, records: &[LedgerKeyRecord]) -> LedgerOutcome {
        debug!(count = records.len(), "No ledger configured, skipping addKeys");
        LedgerOutcome::ok()
    }

    async fn update_key_info(&self, _update: &KeyInfoUpdate) -> LedgerOutcome {
        debug!("No ledger configured, skipping updateKeyInfo");
        LedgerOutcome::ok()
    }
}

/// Build the ledger for a run from optional configuration.
pub fn create_ledger(config: Option<&LedgerConfig>) -> Result<Box<dyn Ledger>> {
    match config {
        Some(config) => Ok(Box::new(HttpLedger::new(config)?)),
        None => Ok(Box::new(NoopLedger)),
    }
}
