//! Cache Module
//!
//! Provides named in-memory regions with per-entry TTL expiration and
//! lifecycle callbacks.

mod entry;
mod region;
mod registry;
mod stats;


// Re-export public types
pub use entry::{Entry, EntryInfo, ExpireCallback};
pub use region::{CacheKey, EntryCallback, Loader, LoaderArg, Region};
pub use registry::{cache, Registry};
pub use stats::CacheStats;
