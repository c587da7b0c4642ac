//! Core types and trait definitions for the riskmap sanctions table.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! holds the classification engine, the store/sink/adapter abstractions and
//! the reconciler that ties them together.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod adapter;
pub mod change;
pub mod classify;
pub mod country;
pub mod error;
pub mod flag;
pub mod reconcile;
pub mod store;

pub use error::{Error, Result};

#[cfg(test)]
mod memory;
