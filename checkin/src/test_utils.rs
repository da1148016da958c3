//! Test doubles for the session, the console and the ledger.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::api::models::console::{SignInOutcome, TransferOutcome};
use crate::api::models::ledger::{KeyInfoUpdate, LedgerKeyRecord, LedgerOutcome};
use crate::api::models::token::{QuotaMode, RemoteToken, TokenSpec};
use crate::api::models::user::{AccountStatus, UserSnapshot};
use crate::clients::{ConsoleApi, Ledger};
use crate::errors::{Error, Result};
use crate::session::{BrowserSession, PageRequest, PageResponse, SessionProvider};
use crate::types::{AccountIdentity, TokenId};

pub fn snapshot(username: &str) -> UserSnapshot {
    UserSnapshot {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        quota: 1_000_000,
        used_quota: 0,
        aff_code: "AFF".to_string(),
        aff_quota: 0,
        status: AccountStatus::Active,
    }
}

// ============================================================================
// Session
// ============================================================================

/// Record of a call made to the mock session.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// Session returning predetermined responses.
///
/// Responses are keyed by `"{METHOD} {path}"` and returned in FIFO order. A request with no
/// response configured fails in transport.
#[derive(Clone, Default)]
pub struct MockSession {
    responses: Arc<Mutex<HashMap<String, Vec<PageResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    closes: Arc<AtomicUsize>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, key: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(PageResponse {
                status,
                body: body.to_string(),
            });
    }

    pub fn respond_json(&self, key: &str, body: Value) {
        self.respond(key, 200, &body.to_string());
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| format!("{} {}", c.method, c.path)).collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn fetch(&self, request: PageRequest) -> Result<PageResponse> {
        self.calls.lock().push(MockCall {
            method: request.method.clone(),
            path: request.path.clone(),
            body: request.body.clone(),
        });

        let key = request.key();
        let mut responses = self.responses.lock();
        if let Some(queue) = responses.get_mut(&key)
            && !queue.is_empty()
        {
            return Ok(queue.remove(0));
        }

        Err(Error::Transport {
            message: format!("No mock response configured for {}", key),
        })
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out clones of one [`MockSession`], or fails to open.
#[derive(Clone, Default)]
pub struct MockSessionProvider {
    pub session: MockSession,
    fail_open: bool,
    opened: Arc<Mutex<Vec<String>>>,
}

impl MockSessionProvider {
    pub fn new(session: MockSession) -> Self {
        Self {
            session,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Default::default()
        }
    }

    /// Account ids sessions were opened for, in order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl SessionProvider for MockSessionProvider {
    async fn open(&self, identity: &AccountIdentity) -> Result<Box<dyn BrowserSession>> {
        self.opened.lock().push(identity.account_id().to_string());
        if self.fail_open {
            return Err(Error::Session {
                message: "browser failed to launch".to_string(),
            });
        }
        Ok(Box::new(self.session.clone()))
    }
}

// ============================================================================
// Console
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCall {
    SignIn,
    UserSelf,
    List,
    Create(TokenSpec),
    Delete(TokenId),
    Update(RemoteToken),
    Transfer(i64),
}

/// In-memory console: tokens live in a list that create/delete/update mutate.
pub struct FakeConsole {
    tokens: Mutex<Vec<RemoteToken>>,
    calls: Mutex<Vec<ConsoleCall>>,
    next_id: Mutex<TokenId>,
    failing_deletes: Mutex<HashSet<TokenId>>,
    failing_updates: Mutex<HashSet<TokenId>>,
    failing_creates: Mutex<HashSet<String>>,
    sign_in: Mutex<SignInOutcome>,
    user: Mutex<Option<UserSnapshot>>,
    transfer_ok: Mutex<bool>,
    failing_lists: Mutex<usize>,
}

impl FakeConsole {
    pub fn with_tokens(tokens: Vec<RemoteToken>) -> Self {
        let next_id = tokens.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        Self {
            tokens: Mutex::new(tokens),
            calls: Mutex::new(Vec::new()),
            next_id: Mutex::new(next_id),
            failing_deletes: Mutex::new(HashSet::new()),
            failing_updates: Mutex::new(HashSet::new()),
            failing_creates: Mutex::new(HashSet::new()),
            sign_in: Mutex::new(SignInOutcome {
                ok: true,
                message: None,
                raw: Some(json!({"success": true})),
            }),
            user: Mutex::new(Some(snapshot("alice"))),
            transfer_ok: Mutex::new(true),
            failing_lists: Mutex::new(0),
        }
    }

    pub fn token(id: TokenId, key: &str, name: &str, remain_quota: i64, used_quota: i64) -> RemoteToken {
        let mut extra = Map::new();
        extra.insert("status".to_string(), json!(1));
        RemoteToken {
            id,
            key: key.to_string(),
            name: name.to_string(),
            unlimited_quota: false,
            remain_quota,
            used_quota,
            extra,
        }
    }

    pub fn calls(&self) -> Vec<ConsoleCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn tokens(&self) -> Vec<RemoteToken> {
        self.tokens.lock().clone()
    }

    pub fn fail_delete(&self, id: TokenId) {
        self.failing_deletes.lock().insert(id);
    }

    pub fn fail_update(&self, id: TokenId) {
        self.failing_updates.lock().insert(id);
    }

    pub fn fail_create(&self, name: &str) {
        self.failing_creates.lock().insert(name.to_string());
    }

    pub fn reject_sign_in(&self, message: &str) {
        *self.sign_in.lock() = SignInOutcome {
            ok: false,
            message: Some(message.to_string()),
            raw: Some(json!({"success": false, "message": message})),
        };
    }

    pub fn set_user(&self, user: Option<UserSnapshot>) {
        *self.user.lock() = user;
    }

    pub fn fail_transfer(&self) {
        *self.transfer_ok.lock() = false;
    }

    /// Make the next `count` listings fail.
    pub fn fail_lists(&self, count: usize) {
        *self.failing_lists.lock() = count;
    }

    fn record(&self, call: ConsoleCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ConsoleApi for FakeConsole {
    async fn sign_in(&self) -> SignInOutcome {
        self.record(ConsoleCall::SignIn);
        self.sign_in.lock().clone()
    }

    async fn fetch_user_snapshot(&self) -> Option<UserSnapshot> {
        self.record(ConsoleCall::UserSelf);
        self.user.lock().clone()
    }

    async fn list_tokens(&self) -> Option<Vec<RemoteToken>> {
        self.record(ConsoleCall::List);
        let mut failing = self.failing_lists.lock();
        if *failing > 0 {
            *failing -= 1;
            return None;
        }
        Some(self.tokens.lock().clone())
    }

    async fn create_token(&self, spec: &TokenSpec) -> bool {
        self.record(ConsoleCall::Create(spec.clone()));
        if self.failing_creates.lock().contains(&spec.name) {
            return false;
        }

        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        let mut token = Self::token(id, &format!("sk-fake-{}", id), &spec.name, 0, 0);
        match spec.mode {
            QuotaMode::Unlimited => token.unlimited_quota = true,
            QuotaMode::Bounded(amount) => token.remain_quota = amount,
        }
        self.tokens.lock().push(token);
        true
    }

    async fn delete_token(&self, id: TokenId) -> bool {
        self.record(ConsoleCall::Delete(id));
        if self.failing_deletes.lock().contains(&id) {
            return false;
        }
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|t| t.id != id);
        tokens.len() < before
    }

    async fn update_token(&self, token: &RemoteToken) -> Option<RemoteToken> {
        self.record(ConsoleCall::Update(token.clone()));
        if self.failing_updates.lock().contains(&token.id) {
            return None;
        }
        let mut tokens = self.tokens.lock();
        let stored = tokens.iter_mut().find(|t| t.id == token.id)?;
        *stored = token.clone();
        Some(token.clone())
    }

    async fn transfer_affiliate_reward(&self, quota: i64) -> TransferOutcome {
        self.record(ConsoleCall::Transfer(quota));
        if *self.transfer_ok.lock() {
            TransferOutcome { ok: true, message: None }
        } else {
            TransferOutcome {
                ok: false,
                message: Some("transfer rejected".to_string()),
            }
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Ledger that records every call and answers with a fixed outcome.
pub struct RecordingLedger {
    uploads: Mutex<Vec<Vec<LedgerKeyRecord>>>,
    updates: Mutex<Vec<KeyInfoUpdate>>,
    outcome: LedgerOutcome,
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            outcome: LedgerOutcome::ok(),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            outcome: LedgerOutcome::failed(error),
            ..Self::new()
        }
    }

    pub fn uploads(&self) -> Vec<Vec<LedgerKeyRecord>> {
        self.uploads.lock().clone()
    }

    pub fn updates(&self) -> Vec<KeyInfoUpdate> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl Ledger for RecordingLedger {
    async fn add_keys(&self, records: &[LedgerKeyRecord]) -> LedgerOutcome {
        self.uploads.lock().push(records.to_vec());
        self.outcome.clone()
    }

    async fn update_key_info(&self, update: &KeyInfoUpdate) -> LedgerOutcome {
        self.updates.lock().push(update.clone());
        self.outcome.clone()
    }
}
