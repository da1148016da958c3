//! Common type definitions shared by the clients, the reconciler and the runner.
//!
//! This module defines:
//! - [`SessionCredential`] and [`AccountIdentity`], the per-account authentication pair
//! - Quota constants and conversion between minor and normalized units
//! - The sale-token naming convention
//!
//! # Quota units
//!
//! The console reports every quota as an integer in minor units. The ledger works in
//! normalized units, where one unit is [`QUOTA_PER_UNIT`] minor units:
//!
//! ```
//! use checkin::types::to_normalized;
//! use rust_decimal::Decimal;
//!
//! assert_eq!(to_normalized(150_000), Decimal::new(3, 1));
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::Error;

/// Remote token identifier as assigned by the console.
pub type TokenId = i64;

/// Minor units per normalized currency unit.
pub const QUOTA_PER_UNIT: i64 = 500_000;

/// Bounded quota used when a token is created without an explicit amount.
pub const DEFAULT_TOKEN_QUOTA: i64 = 500_000;

/// Name used when a token is created without an explicit name.
pub const DEFAULT_TOKEN_NAME: &str = "dw";

/// Tokens whose name starts with this prefix are designated for sale.
pub const SALE_NAME_PREFIX: &str = "sold_";

/// Convert a minor-unit quota into normalized units.
pub fn to_normalized(minor: i64) -> Decimal {
    Decimal::from(minor) / Decimal::from(QUOTA_PER_UNIT)
}

/// Whether a token name follows the sale naming convention.
pub fn has_sale_prefix(name: &str) -> bool {
    name.starts_with(SALE_NAME_PREFIX)
}

/// Opaque session value bound to one console account.
///
/// The `Debug` impl never prints the value so credentials stay out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCredential(String);

impl SessionCredential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionCredential(<redacted, {} chars>)", self.0.len())
    }
}

/// Credential plus the account identifier sent in the identity header of every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    credential: SessionCredential,
    account_id: String,
}

impl AccountIdentity {
    /// Both halves are required; a blank value means the run cannot proceed.
    pub fn new(credential: SessionCredential, account_id: impl Into<String>) -> Result<Self, Error> {
        let account_id = account_id.into();
        if credential.is_blank() {
            return Err(Error::InvalidRequest {
                message: "session credential is empty".to_string(),
            });
        }
        if account_id.trim().is_empty() {
            return Err(Error::InvalidRequest {
                message: "account id is empty".to_string(),
            });
        }
        Ok(Self { credential, account_id })
    }

    pub fn credential(&self) -> &SessionCredential {
        &self.credential
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }
}
