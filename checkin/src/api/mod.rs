//! Wire-level data models for the console API, the ledger and the run summary.

pub mod models;
