//! Remote tokens, declared tokens and the create-token request body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{DEFAULT_TOKEN_NAME, DEFAULT_TOKEN_QUOTA, TokenId, has_sale_prefix};

/// How much a token may spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaMode {
    Unlimited,
    Bounded(i64),
}

impl QuotaMode {
    /// Quota recorded for a sale upload. Unlimited tokens have no meaningful amount.
    pub fn amount(&self) -> i64 {
        match self {
            QuotaMode::Unlimited => 0,
            QuotaMode::Bounded(amount) => *amount,
        }
    }
}

/// A token as it exists on the console.
///
/// Fields this crate does not use are kept in `extra` so that a full-record update sends
/// them back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteToken {
    pub id: TokenId,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unlimited_quota: bool,
    #[serde(default)]
    pub remain_quota: i64,
    #[serde(default)]
    pub used_quota: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteToken {
    pub fn has_key(&self) -> bool {
        !self.key.is_empty()
    }

    pub fn quota_mode(&self) -> QuotaMode {
        if self.unlimited_quota {
            QuotaMode::Unlimited
        } else {
            QuotaMode::Bounded(self.remain_quota)
        }
    }

    /// Copy of this record with a new remaining quota and every other field untouched.
    pub fn with_remain_quota(&self, remain_quota: i64) -> Self {
        Self {
            remain_quota,
            ..self.clone()
        }
    }
}

/// Declared target state for one token.
///
/// A missing `id` means "create"; `id` plus `is_deleted` means "delete". `used_quota` is the
/// value observed on the previous run and drives drift detection for sale tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesiredToken {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<TokenId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub is_deleted: bool,
    pub unlimited_quota: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remain_quota: Option<i64>,
    pub supplement_quota: i64,
    pub is_sold: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_quota: Option<i64>,
}

impl DesiredToken {
    /// Sale tokens are marked either by the name prefix or by the explicit flag.
    pub fn is_sale(&self) -> bool {
        self.is_sold || self.name.as_deref().is_some_and(has_sale_prefix)
    }

    pub fn has_sale_name(&self) -> bool {
        self.name.as_deref().is_some_and(has_sale_prefix)
    }

    pub fn quota_mode(&self) -> QuotaMode {
        if self.unlimited_quota {
            QuotaMode::Unlimited
        } else {
            QuotaMode::Bounded(self.remain_quota.unwrap_or(DEFAULT_TOKEN_QUOTA))
        }
    }

    pub fn spec(&self) -> TokenSpec {
        TokenSpec {
            name: self.name.clone().filter(|n| !n.is_empty()).unwrap_or_else(|| DEFAULT_TOKEN_NAME.to_string()),
            mode: self.quota_mode(),
        }
    }

    /// Normalized view of a remote token after reconciliation, ready to be used as the next
    /// run's declared state.
    pub fn from_remote(token: &RemoteToken, is_sold: bool) -> Self {
        Self {
            id: Some(token.id),
            name: Some(token.name.clone()),
            key: Some(token.key.clone()).filter(|k| !k.is_empty()),
            is_deleted: false,
            unlimited_quota: token.unlimited_quota,
            remain_quota: Some(token.remain_quota),
            supplement_quota: 0,
            is_sold,
            used_quota: Some(token.used_quota),
        }
    }
}

/// What to create: a name and a quota mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSpec {
    pub name: String,
    pub mode: QuotaMode,
}

impl TokenSpec {
    pub fn unlimited(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: QuotaMode::Unlimited,
        }
    }

    pub fn bounded(name: impl Into<String>, amount: i64) -> Self {
        Self {
            name: name.into(),
            mode: QuotaMode::Bounded(amount),
        }
    }
}

impl Default for TokenSpec {
    fn default() -> Self {
        Self::bounded(DEFAULT_TOKEN_NAME, DEFAULT_TOKEN_QUOTA)
    }
}

/// Body of `POST /api/token/`. Exactly one of `unlimited_quota` and `remain_quota` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateTokenRequest {
    pub name: String,
    pub expired_time: i64,
    pub model_limits_enabled: bool,
    pub model_limits: String,
    pub allow_ips: String,
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlimited_quota: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remain_quota: Option<i64>,
}

impl From<&TokenSpec> for CreateTokenRequest {
    fn from(spec: &TokenSpec) -> Self {
        let (unlimited_quota, remain_quota) = match spec.mode {
            QuotaMode::Unlimited => (Some(true), None),
            QuotaMode::Bounded(amount) => (None, Some(amount)),
        };
        Self {
            name: spec.name.clone(),
            expired_time: -1,
            model_limits_enabled: false,
            model_limits: String::new(),
            allow_ips: String::new(),
            group: "default".to_string(),
            unlimited_quota,
            remain_quota,
        }
    }
}
