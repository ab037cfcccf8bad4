//! Warden Core - Shared data structures and collaborator traits
//!
//! This module defines the types exchanged between the session manager, the
//! authorization engine and the transport layer, together with the traits for
//! the external collaborators (session store, role validator, audit logger).

pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tracing;
