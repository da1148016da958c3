//! Clients for the two remote systems a run talks to.
//!
//! - [`console`]: the account console (sign-in, user info, token CRUD, reward transfer),
//!   reached through an authenticated [`BrowserSession`](crate::session::BrowserSession)
//! - [`ledger`]: the external bookkeeping service for sale keys
//!
//! Both own no state and never return errors for ordinary remote failures.

pub mod console;
pub mod ledger;

pub use console::{ConsoleApi, ConsoleClient};
pub use ledger::{HttpLedger, Ledger, NoopLedger, create_ledger};
