//! Payloads for the external bookkeeping service.
//!
//! Quotas sent to the ledger are in normalized units (see [`crate::types::to_normalized`]) and
//! serialized as JSON numbers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A sale key minted on this run, as inserted by `addKeys`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerKeyRecord {
    pub key: String,
    #[serde(rename = "type")]
    pub key_type: String,
    pub is_sold: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub quota: Decimal,
    pub source: String,
    pub account_id: String,
}

/// Additive part of an `updateKeyInfo` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyIncrement {
    #[serde(with = "rust_decimal::serde::float")]
    pub quota: Decimal,
}

/// Absolute part of an `updateKeyInfo` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyOverwrite {
    #[serde(with = "rust_decimal::serde::float")]
    pub remain_quota: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub used_quota: Decimal,
    pub last_sync_time: DateTime<Utc>,
}

/// `updateKeyInfo` request. At least one of the two parts is always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyInfoUpdate {
    pub key: String,
    #[serde(rename = "incData", skip_serializing_if = "Option::is_none")]
    pub inc_data: Option<KeyIncrement>,
    #[serde(rename = "updateData", skip_serializing_if = "Option::is_none")]
    pub update_data: Option<KeyOverwrite>,
}

impl KeyInfoUpdate {
    /// Returns `None` for a no-op update so the caller can skip the call.
    pub fn new(key: impl Into<String>, inc_data: Option<KeyIncrement>, update_data: Option<KeyOverwrite>) -> Option<Self> {
        if inc_data.is_none() && update_data.is_none() {
            return None;
        }
        Some(Self {
            key: key.into(),
            inc_data,
            update_data,
        })
    }
}

/// `{success, error?}` as returned by both ledger calls.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LedgerOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}
