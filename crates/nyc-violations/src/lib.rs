//! Change detection for NYC Open Data violation feeds.
//!
//! A run fetches the 311, HPD, OATH, and DOB records for one block/lot, diffs
//! them against a durable ledger of already-reported violations, records the
//! new ones, and mails a digest.

pub mod config;
pub mod error;
pub mod monitor;
pub mod telemetry;
