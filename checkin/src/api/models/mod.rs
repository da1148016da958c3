//! Request and response data models.
//!
//! These models describe the JSON exchanged with the two remote systems and the summary
//! produced by a run:
//!
//! - [`console`]: response envelopes of the console API and the sign-in/transfer outcomes
//! - [`user`]: the account snapshot read after sign-in
//! - [`token`]: remote tokens, declared (desired) tokens and the create-token request body
//! - [`ledger`]: records and update payloads for the external bookkeeping service
//! - [`outcome`]: the per-account result summary
//!
//! Unknown fields in remote payloads are ignored (or preserved, for tokens that must be echoed
//! back in full); missing required fields are a decode error at the client boundary.

pub mod console;
pub mod ledger;
pub mod outcome;
pub mod token;
pub mod user;
