//! Background Tasks Module
//!
//! Contains the timer machinery that drives region expiration sweeps.
//!
//! # Tasks
//! - Sweep scheduling: one-shot timers that re-run a region's sweep when the
//!   next entry is due to expire

mod sweep;

pub use sweep::install_sweeper;
pub(crate) use sweep::schedule_sweep;
