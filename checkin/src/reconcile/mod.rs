//! Token reconciliation: converge the account's tokens toward the declared list.
//!
//! ```text
//! Reconciler::run()
//!   ├─ 1. delete      one delete per declared id marked is_deleted
//!   ├─ 2. create      one create per declared entry without id
//!   │                  └─ sale-named → PendingSaleUpload (key unknown yet)
//!   ├─ 3. refresh     re-list if anything changed or the first listing failed;
//!   │                  bootstrap an unlimited token only if a listing came back empty
//!   ├─ 4. supplement  full-record update with remain_quota + delta
//!   │                  └─ ledger: updateKeyInfo {incData, updateData}
//!   ├─ 5. upload      resolve pending sale names → ledger: addKeys (one bulk call)
//!   └─ 6. drift       sale tokens with changed usage, or sold → ledger: updateKeyInfo {updateData}
//! ```
//!
//! The order is fixed: later passes read the token list left by earlier ones. A failed remote
//! call is logged and leaves that entry unreconciled for this run; it never stops the other
//! entries. There is no retry within a run. A failed listing never counts as an empty account:
//! the previous listing is kept, and with none at all the token passes are skipped.

pub mod plan;

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use crate::api::models::ledger::{KeyInfoUpdate, LedgerOutcome};
use crate::api::models::token::{DesiredToken, RemoteToken, TokenSpec};
use crate::api::models::user::UserSnapshot;
use crate::clients::{ConsoleApi, Ledger};
use crate::types::DEFAULT_TOKEN_NAME;

pub use plan::PendingSaleUpload;

/// Settings that do not change between accounts.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Type tag stored on uploaded sale keys
    pub key_type: String,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            key_type: "newapi".to_string(),
        }
    }
}

/// Which pass issued a ledger call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Supplement,
    Upload,
    Drift,
}

/// One attempted ledger write and how it went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncAction {
    pub kind: SyncKind,
    pub key: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncAction {
    fn new(kind: SyncKind, key: impl Into<String>, outcome: &LedgerOutcome) -> Self {
        Self {
            kind,
            key: key.into(),
            success: outcome.success,
            error: outcome.error.clone(),
        }
    }
}

/// Counts of console writes, for the run log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub deleted: usize,
    pub created: usize,
    pub supplemented: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub remote_tokens_after: Vec<RemoteToken>,
    pub pending_sale_uploads: Vec<PendingSaleUpload>,
    pub sync_actions: Vec<SyncAction>,
    /// Normalized final list, shaped like the declared list for the next run
    pub tokens: Vec<DesiredToken>,
    pub stats: ReconcileStats,
}

/// Applies the reconciliation passes for one account.
pub struct Reconciler<'a> {
    console: &'a dyn ConsoleApi,
    ledger: &'a dyn Ledger,
    options: &'a ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(console: &'a dyn ConsoleApi, ledger: &'a dyn Ledger, options: &'a ReconcileOptions) -> Self {
        Self {
            console,
            ledger,
            options,
        }
    }

    /// `remote` is the listing taken before reconciliation, or `None` if that listing failed.
    #[instrument(skip_all, fields(account = %account_id, desired = desired.len(), remote = ?remote.as_ref().map(Vec::len)))]
    pub async fn run(
        &self,
        mut desired: Vec<DesiredToken>,
        remote: Option<Vec<RemoteToken>>,
        user: &UserSnapshot,
        account_id: &str,
    ) -> ReconcileReport {
        let mut stats = ReconcileStats::default();
        let mut sync_actions = Vec::new();

        self.delete_pass(&desired, &mut stats).await;
        let pending = self.create_pass(&desired, &mut stats).await;

        let remote = if remote.is_none() || stats.deleted > 0 || stats.created > 0 {
            self.refresh(remote).await
        } else {
            remote
        };
        // Only a listing that succeeded and came back empty proves the account has no tokens.
        let remote = match remote {
            Some(listed) if plan::needs_bootstrap(&listed) => Some(self.bootstrap(listed, &mut stats).await),
            other => other,
        };
        let mut remote = remote.unwrap_or_else(|| {
            warn!("Token list unavailable, skipping supplement, upload and drift passes");
            Vec::new()
        });

        self.supplement_pass(&mut desired, &mut remote, &mut stats, &mut sync_actions)
            .await;
        self.upload_pass(&pending, &remote, &desired, user, account_id, &mut sync_actions)
            .await;
        self.drift_pass(&desired, &remote, &mut sync_actions).await;

        info!(
            deleted = stats.deleted,
            created = stats.created,
            supplemented = stats.supplemented,
            failed = stats.failed,
            ledger_calls = sync_actions.len(),
            "Reconciliation finished"
        );

        let tokens = plan::final_view(&remote, &desired);
        ReconcileReport {
            remote_tokens_after: remote,
            pending_sale_uploads: pending,
            sync_actions,
            tokens,
            stats,
        }
    }

    async fn delete_pass(&self, desired: &[DesiredToken], stats: &mut ReconcileStats) {
        for id in plan::deletions(desired) {
            if self.console.delete_token(id).await {
                debug!(token_id = id, "Deleted token");
                stats.deleted += 1;
            } else {
                warn!(token_id = id, "Could not delete token, continuing");
                stats.failed += 1;
            }
        }
    }

    async fn create_pass(&self, desired: &[DesiredToken], stats: &mut ReconcileStats) -> Vec<PendingSaleUpload> {
        let mut pending = Vec::new();
        for (index, spec) in plan::creations(desired) {
            if !self.console.create_token(&spec).await {
                warn!(name = %spec.name, "Could not create token, continuing");
                stats.failed += 1;
                continue;
            }
            stats.created += 1;
            if desired[index].has_sale_name() {
                pending.push(PendingSaleUpload {
                    name: spec.name.clone(),
                    quota: spec.mode.amount(),
                });
            }
        }
        pending
    }

    /// Re-list tokens. A failed listing keeps the previous one.
    async fn refresh(&self, previous: Option<Vec<RemoteToken>>) -> Option<Vec<RemoteToken>> {
        match self.console.list_tokens().await {
            Some(listed) => Some(listed),
            None => {
                warn!(have_previous = previous.is_some(), "Could not refresh token list, keeping previous");
                previous
            }
        }
    }

    async fn bootstrap(&self, remote: Vec<RemoteToken>, stats: &mut ReconcileStats) -> Vec<RemoteToken> {
        info!("Account has no tokens, creating an unlimited one");
        if self.console.create_token(&TokenSpec::unlimited(DEFAULT_TOKEN_NAME)).await {
            stats.created += 1;
            self.refresh(Some(remote)).await.unwrap_or_default()
        } else {
            warn!("Could not create bootstrap token");
            stats.failed += 1;
            remote
        }
    }

    async fn supplement_pass(
        &self,
        desired: &mut [DesiredToken],
        remote: &mut [RemoteToken],
        stats: &mut ReconcileStats,
        sync_actions: &mut Vec<SyncAction>,
    ) {
        for index in plan::supplements(desired) {
            let entry = &desired[index];
            let delta = entry.supplement_quota;
            let Some(position) = entry.id.and_then(|id| remote.iter().position(|token| token.id == id)) else {
                debug!(token_id = ?entry.id, "No remote token for supplement, skipping");
                continue;
            };

            let current = &remote[position];
            let Some(remain_quota) = current.remain_quota.checked_add(delta) else {
                warn!(token_id = current.id, delta, "Supplement overflows remain_quota, skipping");
                stats.failed += 1;
                continue;
            };
            let merged = current.with_remain_quota(remain_quota);
            let Some(updated) = self.console.update_token(&merged).await else {
                warn!(token_id = current.id, delta, "Could not supplement token, continuing");
                stats.failed += 1;
                continue;
            };

            debug!(token_id = updated.id, remain_quota = updated.remain_quota, "Supplemented token");
            stats.supplemented += 1;
            desired[index].supplement_quota = 0;

            if let Some(update) = plan::supplement_update(&updated, delta, Utc::now()) {
                sync_actions.push(self.push_update(SyncKind::Supplement, &update).await);
            }
            remote[position] = updated;
        }
    }

    async fn upload_pass(
        &self,
        pending: &[PendingSaleUpload],
        remote: &[RemoteToken],
        desired: &[DesiredToken],
        user: &UserSnapshot,
        account_id: &str,
        sync_actions: &mut Vec<SyncAction>,
    ) {
        let records = plan::sale_records(
            pending,
            remote,
            desired,
            &user.username,
            account_id,
            &self.options.key_type,
        );
        if records.is_empty() {
            return;
        }

        let outcome = self.ledger.add_keys(&records).await;
        info!(count = records.len(), success = outcome.success, "Uploaded sale keys");
        sync_actions.extend(
            records
                .iter()
                .map(|record| SyncAction::new(SyncKind::Upload, record.key.clone(), &outcome)),
        );
    }

    async fn drift_pass(&self, desired: &[DesiredToken], remote: &[RemoteToken], sync_actions: &mut Vec<SyncAction>) {
        let now = Utc::now();
        // A supplement sync already carried the same absolute balances.
        let synced: HashSet<String> = sync_actions
            .iter()
            .filter(|action| action.kind == SyncKind::Supplement)
            .map(|action| action.key.clone())
            .collect();
        for entry in desired {
            if let Some(update) = plan::drift_update(entry, remote, now)
                && !synced.contains(&update.key)
            {
                sync_actions.push(self.push_update(SyncKind::Drift, &update).await);
            }
        }
    }

    async fn push_update(&self, kind: SyncKind, update: &KeyInfoUpdate) -> SyncAction {
        let outcome = self.ledger.update_key_info(update).await;
        SyncAction::new(kind, update.key.clone(), &outcome)
    }
}
