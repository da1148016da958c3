//! Response envelopes returned by the console API.

use serde::{Deserialize, Serialize};

/// Standard `{success, message, data}` envelope used by every console endpoint except sign-in.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

/// Sign-in responses vary between console versions; any of the three markers means success.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignInEnvelope {
    #[serde(default)]
    pub ret: Option<i64>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl SignInEnvelope {
    pub fn is_success(&self) -> bool {
        self.ret == Some(1) || self.code == Some(0) || self.success == Some(true)
    }

    pub fn message(&self) -> Option<String> {
        self.message.clone().or_else(|| self.msg.clone()).filter(|m| !m.is_empty())
    }
}

/// Result of the sign-in call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignInOutcome {
    pub ok: bool,
    /// Remote message on rejection, or the transport/decode error text
    pub message: Option<String>,
    /// Raw response body, if one was received
    #[serde(skip)]
    pub raw: Option<serde_json::Value>,
}

/// Result of moving affiliate reward into the spendable balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    pub ok: bool,
    pub message: Option<String>,
}

/// Token listings come back either as a bare array or as a paginated page.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TokenPage<T> {
    List(Vec<T>),
    Page {
        #[serde(default = "Vec::new")]
        items: Vec<T>,
    },
}

impl<T> TokenPage<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            TokenPage::List(items) => items,
            TokenPage::Page { items } => items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_markers() {
        let ret: SignInEnvelope = serde_json::from_str(r#"{"ret": 1}"#).unwrap();
        assert!(ret.is_success());

        let code: SignInEnvelope = serde_json::from_str(r#"{"code": 0, "msg": "ok"}"#).unwrap();
        assert!(code.is_success());

        let success: SignInEnvelope = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(success.is_success());

        let rejected: SignInEnvelope = serde_json::from_str(r#"{"success": false, "message": "already checked in"}"#).unwrap();
        assert!(!rejected.is_success());
        assert_eq!(rejected.message().as_deref(), Some("already checked in"));

        let empty: SignInEnvelope = serde_json::from_str("{}").unwrap();
        assert!(!empty.is_success());
    }

    #[test]
    fn test_token_page_shapes() {
        let list: TokenPage<i64> = serde_json::from_str("[1, 2]").unwrap();
        assert_eq!(list.into_items(), vec![1, 2]);

        let page: TokenPage<i64> = serde_json::from_str(r#"{"items": [3], "total": 1}"#).unwrap();
        assert_eq!(page.into_items(), vec![3]);
    }
}
