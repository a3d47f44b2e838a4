//! Region Cache - An in-process key/value cache
//!
//! Provides named cache regions with per-entry TTL expiration, a
//! self-scheduling expiration sweep and add/delete/expire callbacks.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{cache, Entry, Region, Registry};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::install_sweeper;
