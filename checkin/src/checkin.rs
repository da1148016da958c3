//! End-to-end check-in for one account, and the sequential driver over many.
//!
//! ```text
//! run_account()
//!   ├─ open session                         (failure → success: false)
//!   ├─ checkin()
//!   │    ├─ sign in                         (rejected → success: false, nothing else runs)
//!   │    ├─ fetch user snapshot
//!   │    ├─ banned? → success: true, banned  (no token work)
//!   │    ├─ aff_quota > 0 → transfer, then credit the local snapshot either way
//!   │    ├─ reconcile tokens
//!   │    └─ attach normalized token list
//!   └─ close session                        (every path, panics included)
//! ```

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{info, instrument, warn};

use crate::api::models::outcome::{AccountResult, CheckinOutcome, UserInfo};
use crate::clients::{ConsoleApi, ConsoleClient, Ledger};
use crate::config::AccountConfig;
use crate::reconcile::{ReconcileOptions, Reconciler};
use crate::session::SessionProvider;

/// Runs check-ins with a shared session provider and ledger.
///
/// Holds no per-account state; every account gets its own session and snapshot.
pub struct CheckinRunner {
    sessions: Box<dyn SessionProvider>,
    ledger: Box<dyn Ledger>,
    options: ReconcileOptions,
}

impl CheckinRunner {
    pub fn new(sessions: Box<dyn SessionProvider>, ledger: Box<dyn Ledger>, options: ReconcileOptions) -> Self {
        Self {
            sessions,
            ledger,
            options,
        }
    }

    /// Process accounts one after another. No two accounts share a session or state.
    pub async fn run_all(&self, accounts: &[AccountConfig]) -> Vec<AccountResult> {
        let mut results = Vec::with_capacity(accounts.len());
        for account in accounts {
            let outcome = self.run_account(account).await;
            results.push(AccountResult {
                account: account.name.clone(),
                outcome,
            });
        }
        results
    }

    #[instrument(skip(self, account), fields(account = %account.name))]
    pub async fn run_account(&self, account: &AccountConfig) -> CheckinOutcome {
        let identity = match account.identity() {
            Ok(identity) => identity,
            Err(e) => return CheckinOutcome::failed(e.to_string()),
        };

        let session = match self.sessions.open(&identity).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Could not open session");
                return CheckinOutcome::failed(e.to_string());
            }
        };

        let console = ConsoleClient::new(session.as_ref());
        let run = checkin(&console, self.ledger.as_ref(), &self.options, account);
        let outcome = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(%message, "Check-in aborted unexpectedly");
                CheckinOutcome::failed(message)
            }
        };

        session.close().await;
        outcome
    }
}

/// The check-in sequence against an already authenticated console.
pub async fn checkin(
    console: &dyn ConsoleApi,
    ledger: &dyn Ledger,
    options: &ReconcileOptions,
    account: &AccountConfig,
) -> CheckinOutcome {
    let sign_in = console.sign_in().await;
    if !sign_in.ok {
        let error = sign_in.message.unwrap_or_else(|| "sign-in failed".to_string());
        warn!(%error, "Sign-in failed");
        return CheckinOutcome::failed(error);
    }
    info!("Signed in");

    let Some(mut snapshot) = console.fetch_user_snapshot().await else {
        return CheckinOutcome::failed("failed to fetch user info");
    };

    if snapshot.is_banned() {
        warn!(username = %snapshot.username, "Account is banned, skipping token work");
        return CheckinOutcome::succeeded(UserInfo::from(snapshot));
    }

    let mut reward_transfer = None;
    if snapshot.aff_quota > 0 {
        let transfer = console.transfer_affiliate_reward(snapshot.aff_quota).await;
        info!(amount = snapshot.aff_quota, ok = transfer.ok, "Affiliate reward transfer");
        snapshot.credit_affiliate_reward();
        reward_transfer = Some(transfer);
    }

    let remote = console.list_tokens().await;
    let report = Reconciler::new(console, ledger, options)
        .run(account.tokens.clone(), remote, &snapshot, &account.account_id)
        .await;

    let mut user_info = UserInfo::from(snapshot);
    user_info.reward_transfer = reward_transfer;
    user_info.tokens = report.tokens;
    CheckinOutcome::succeeded(user_info)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "check-in panicked".to_string()
    }
}
