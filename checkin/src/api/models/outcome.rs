//! Per-account result summary.

use serde::Serialize;

use crate::api::models::console::TransferOutcome;
use crate::api::models::token::DesiredToken;
use crate::api::models::user::{AccountStatus, UserSnapshot};

/// What a run reports about the account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInfo {
    pub username: String,
    pub email: String,
    pub quota: i64,
    pub used_quota: i64,
    pub aff_code: String,
    pub aff_quota: i64,
    pub status: AccountStatus,
    pub banned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_transfer: Option<TransferOutcome>,
    pub tokens: Vec<DesiredToken>,
}

impl From<UserSnapshot> for UserInfo {
    fn from(snapshot: UserSnapshot) -> Self {
        let banned = snapshot.is_banned();
        Self {
            username: snapshot.username,
            email: snapshot.email,
            quota: snapshot.quota,
            used_quota: snapshot.used_quota,
            aff_code: snapshot.aff_code,
            aff_quota: snapshot.aff_quota,
            status: snapshot.status,
            banned,
            reward_transfer: None,
            tokens: Vec::new(),
        }
    }
}

/// Result of one check-in run. Never an error type: failures are `success: false`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckinOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
}

impl CheckinOutcome {
    pub fn succeeded(user_info: UserInfo) -> Self {
        Self {
            success: true,
            error: None,
            user_info: Some(user_info),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            user_info: None,
        }
    }
}

/// Outcome labelled with the configured account name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountResult {
    pub account: String,
    #[serde(flatten)]
    pub outcome: CheckinOutcome,
}
