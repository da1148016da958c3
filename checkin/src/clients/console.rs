//! Typed client for the console's user and token API.
//!
//! Each method maps to one remote capability and returns a typed outcome. Transport failures,
//! non-200 statuses, undecodable bodies and application-level rejections are logged and folded
//! into that outcome; none of them propagate as errors.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::api::models::console::{ApiEnvelope, SignInEnvelope, SignInOutcome, TokenPage, TransferOutcome};
use crate::api::models::token::{CreateTokenRequest, RemoteToken, TokenSpec};
use crate::api::models::user::UserSnapshot;
use crate::errors::{Error, Result};
use crate::session::{BrowserSession, PageRequest, PageResponse};
use crate::types::TokenId;

pub const SIGN_IN_PATH: &str = "/api/user/sign_in";
pub const USER_SELF_PATH: &str = "/api/user/self";
pub const TOKEN_LIST_PATH: &str = "/api/token/?p=0&size=100";
pub const TOKEN_PATH: &str = "/api/token/";
pub const AFF_TRANSFER_PATH: &str = "/api/user/aff_transfer";

/// The remote operations the reconciler and the runner depend on.
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    async fn sign_in(&self) -> SignInOutcome;

    async fn fetch_user_snapshot(&self) -> Option<UserSnapshot>;

    /// `None` when the listing failed. `Some(vec![])` means the account has no tokens.
    async fn list_tokens(&self) -> Option<Vec<RemoteToken>>;

    async fn create_token(&self, spec: &TokenSpec) -> bool;

    async fn delete_token(&self, id: TokenId) -> bool;

    /// Send a full token record. The console does not accept partial updates.
    async fn update_token(&self, token: &RemoteToken) -> Option<RemoteToken>;

    async fn transfer_affiliate_reward(&self, quota: i64) -> TransferOutcome;
}

/// [`ConsoleApi`] over an authenticated [`BrowserSession`].
pub struct ConsoleClient<'a> {
    session: &'a dyn BrowserSession,
}

impl<'a> ConsoleClient<'a> {
    pub fn new(session: &'a dyn BrowserSession) -> Self {
        Self { session }
    }

    async fn send(&self, request: PageRequest) -> Result<PageResponse> {
        let key = request.key();
        let response = self.session.fetch(request).await?;
        if !response.is_ok() {
            return Err(Error::Transport {
                message: format!("{} returned HTTP {}: {}", key, response.status, truncate(&response.body)),
            });
        }
        Ok(response)
    }

    /// Send a request and decode the standard envelope, requiring `success: true`.
    async fn call<T: DeserializeOwned>(&self, request: PageRequest, what: &str) -> Result<Option<T>> {
        let response = self.send(request).await?;
        let envelope: ApiEnvelope<T> = decode(&response.body, what)?;
        if !envelope.success {
            return Err(Error::rejected(envelope.message, &format!("{} rejected", what)));
        }
        Ok(envelope.data)
    }
}

fn decode<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::Decode {
        what: what.to_string(),
        message: e.to_string(),
    })
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl<'a> ConsoleApi for ConsoleClient<'a> {
    #[instrument(skip(self))]
    async fn sign_in(&self) -> SignInOutcome {
        let response = match self.send(PageRequest::post(SIGN_IN_PATH, json!({}))).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Sign-in request failed");
                return SignInOutcome {
                    ok: false,
                    message: Some(e.to_string()),
                    raw: None,
                };
            }
        };

        let raw: Value = match decode(&response.body, "sign-in response") {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Sign-in response was not JSON");
                return SignInOutcome {
                    ok: false,
                    message: Some(e.to_string()),
                    raw: None,
                };
            }
        };

        let envelope: SignInEnvelope = serde_json::from_value(raw.clone()).unwrap_or_default();
        if envelope.is_success() {
            debug!("Sign-in accepted");
            SignInOutcome {
                ok: true,
                message: envelope.message(),
                raw: Some(raw),
            }
        } else {
            let message = Error::rejected(envelope.message(), "sign-in rejected").to_string();
            warn!(%message, "Sign-in rejected");
            SignInOutcome {
                ok: false,
                message: Some(message),
                raw: Some(raw),
            }
        }
    }

    #[instrument(skip(self))]
    async fn fetch_user_snapshot(&self) -> Option<UserSnapshot> {
        match self.call::<UserSnapshot>(PageRequest::get(USER_SELF_PATH), "user info").await {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => {
                warn!("User info response carried no data");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch user info");
                None
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_tokens(&self) -> Option<Vec<RemoteToken>> {
        match self
            .call::<TokenPage<RemoteToken>>(PageRequest::get(TOKEN_LIST_PATH), "token list")
            .await
        {
            Ok(page) => {
                let tokens = page.map(TokenPage::into_items).unwrap_or_default();
                debug!(count = tokens.len(), "Listed tokens");
                Some(tokens)
            }
            Err(e) => {
                warn!(error = %e, "Failed to list tokens");
                None
            }
        }
    }

    #[instrument(skip(self), fields(name = %spec.name))]
    async fn create_token(&self, spec: &TokenSpec) -> bool {
        let body = match serde_json::to_value(CreateTokenRequest::from(spec)) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to encode create-token request");
                return false;
            }
        };

        match self.call::<Value>(PageRequest::post(TOKEN_PATH, body), "create token").await {
            Ok(_) => {
                debug!(mode = ?spec.mode, "Token created");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to create token");
                false
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete_token(&self, id: TokenId) -> bool {
        let path = format!("{}{}", TOKEN_PATH, id);
        match self.call::<Value>(PageRequest::delete(path), "delete token").await {
            Ok(_) => {
                debug!("Token deleted");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to delete token");
                false
            }
        }
    }

    #[instrument(skip(self, token), fields(token_id = token.id))]
    async fn update_token(&self, token: &RemoteToken) -> Option<RemoteToken> {
        let body = match serde_json::to_value(token) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to encode token record");
                return None;
            }
        };

        match self.call::<Value>(PageRequest::put(TOKEN_PATH, body), "update token").await {
            // Some console versions return the stored record, others only a success flag.
            Ok(Some(data)) if data.is_object() => match serde_json::from_value::<RemoteToken>(data) {
                Ok(updated) => Some(updated),
                Err(e) => {
                    debug!(error = %e, "Update response data is not a token record, using request record");
                    Some(token.clone())
                }
            },
            Ok(_) => Some(token.clone()),
            Err(e) => {
                warn!(error = %e, "Failed to update token");
                None
            }
        }
    }

    #[instrument(skip(self))]
    async fn transfer_affiliate_reward(&self, quota: i64) -> TransferOutcome {
        match self
            .call::<Value>(PageRequest::post(AFF_TRANSFER_PATH, json!({ "quota": quota })), "reward transfer")
            .await
        {
            Ok(_) => TransferOutcome {
                ok: true,
                message: None,
            },
            Err(e) => {
                warn!(error = %e, "Affiliate reward transfer failed");
                TransferOutcome {
                    ok: false,
                    message: Some(e.to_string()),
                }
            }
        }
    }
}
