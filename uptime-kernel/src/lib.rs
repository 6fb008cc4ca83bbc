//! Node uptime tracking kernel.
//!
//! Polls an upstream node list on a fixed interval, turns each node's
//! uptime counter into contiguous sessions, and answers uptime queries over
//! arbitrary windows.

pub mod aggregator;
pub mod backfill;
pub mod config;
pub mod health;
pub mod http;
pub mod logging;
pub mod models;
pub mod poll;
pub mod query;
pub mod reconciler;
pub mod scheduler;
pub mod search;
pub mod source;
pub mod store;
