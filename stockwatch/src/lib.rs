//! stockwatch library crate.
//!
//! Polls retail product pages per store, raises edge-triggered alerts to a
//! chat webhook and email, keeps a live status and summary message current,
//! and ships a watchdog that reports a stalled poller.

pub mod config;
pub mod domain;
pub mod error;
pub mod live;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod panic_hook;
pub mod services;
pub mod state;
pub mod utils;
pub mod watchdog;

pub use error::{Error, Result};
