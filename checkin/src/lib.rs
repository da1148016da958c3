//! # checkin: daily check-in and token upkeep for new-api style consoles
//!
//! For every configured account this crate signs in to the console, reads the account
//! snapshot, cashes out any pending affiliate reward, and then makes the account's API tokens
//! match a declared list. Tokens named with the `sold_` prefix (or flagged as sold) are sale
//! tokens: their keys and quota movements are reported to an external ledger.
//!
//! ## Layout
//!
//! - [`session`]: the authenticated page context every console call runs inside
//!   ([`BrowserSession`](session::BrowserSession)), with a reqwest-backed implementation.
//! - [`clients`]: typed console operations ([`ConsoleApi`](clients::ConsoleApi)) and the ledger
//!   ([`Ledger`](clients::Ledger)).
//! - [`reconcile`]: pure planning in [`reconcile::plan`] and the ordered passes that apply it.
//! - [`checkin`]: the per-account sequence and the sequential driver over all accounts.
//! - [`config`] and [`telemetry`]: YAML/env configuration and logging.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use checkin::{CheckinRunner, Config, ReconcileOptions};
//! use checkin::clients::create_ledger;
//! use checkin::session::ReqwestSessionProvider;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = checkin::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     checkin::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let runner = CheckinRunner::new(
//!         Box::new(ReqwestSessionProvider::new(config.console.clone())),
//!         create_ledger(config.ledger.as_ref())?,
//!         ReconcileOptions::default(),
//!     );
//!     for result in runner.run_all(&config.selected_accounts(None)).await {
//!         println!("{}: {}", result.account, result.outcome.success);
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod checkin;
pub mod clients;
pub mod config;
pub mod errors;
pub mod reconcile;
pub mod session;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use checkin::CheckinRunner;
pub use config::Config;
pub use errors::{Error, Result};
pub use reconcile::{ReconcileOptions, Reconciler};
