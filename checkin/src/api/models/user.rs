//! Account snapshot read from `GET /api/user/self`.

use serde::{Deserialize, Deserializer, Serialize};

/// Account status as reported by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Banned,
}

impl<'de> Deserialize<'de> for AccountStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }

        // The console uses 1 for enabled and 2 for disabled accounts.
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Code(2) => AccountStatus::Banned,
            Raw::Code(_) => AccountStatus::Active,
            Raw::Name(name) if name.eq_ignore_ascii_case("banned") => AccountStatus::Banned,
            Raw::Name(_) => AccountStatus::Active,
        })
    }
}

/// Account state captured once per run, right after sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub username: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    pub quota: i64,
    pub used_quota: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub aff_code: String,
    #[serde(default)]
    pub aff_quota: i64,
    #[serde(default)]
    pub status: AccountStatus,
}

impl UserSnapshot {
    pub fn is_banned(&self) -> bool {
        self.status == AccountStatus::Banned
    }

    /// Credit the pending affiliate reward into the local balance.
    ///
    /// Applied whether or not the remote transfer succeeded; the remote ledger stays the
    /// source of truth.
    pub fn credit_affiliate_reward(&mut self) {
        self.quota += self.aff_quota;
        self.aff_quota = 0;
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
