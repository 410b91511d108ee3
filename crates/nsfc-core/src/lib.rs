//! Core of the friend-code bot: update classification, freshness checks,
//! reply bookkeeping and the worker pipeline.
//!
//! This crate is framework-agnostic. Telegram lives behind
//! [`messaging::port::MessagingPort`], implemented in the adapter crate.

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod edit_cache;
pub mod errors;
pub mod freshness;
pub mod logging;
pub mod membership;
pub mod messaging;
pub mod pipeline;
pub mod registry;
pub mod router;
pub mod store;
pub mod update;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
