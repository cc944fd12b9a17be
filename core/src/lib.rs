//! Ready-mix business simulation core.
//!
//! Three pure engines (RM/TM allocation, customer auction, monthly
//! settlement) behind a phase guard, persisted through a SQLite ledger.

pub mod bot;
pub mod command;
pub mod config;
pub mod customer_allocation;
pub mod engine;
pub mod error;
pub mod event;
pub mod inflight;
pub mod ledger;
pub mod model;
pub mod phase;
pub mod rm_allocation;
pub mod rng;
pub mod settlement;
pub mod snapshot;
pub mod store;
pub mod types;
