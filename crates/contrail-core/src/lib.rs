//! Core types and components for the Contrail flight lifecycle engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! turns noisy status, time and position observations into one consistent
//! timeline per flight leg; storage backends implement [`store::LegStore`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod leg;
pub mod live;
pub mod merge;
pub mod partition;
pub mod static_data;
pub mod status;
pub mod store;
pub mod timestamp;
pub mod triage;

pub use error::{Error, Result};
