//! Session store adapters
//!
//! The session manager only depends on [`warden_core::SessionStore`]; these
//! are the two adapters shipped with warden.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemorySessionStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionStore;

use std::time::Duration;

/// `0` means "keep whatever TTL the entry has"
pub(crate) fn ttl_duration(ttl_seconds: u64) -> Option<Duration> {
    (ttl_seconds > 0).then(|| Duration::from_secs(ttl_seconds))
}
