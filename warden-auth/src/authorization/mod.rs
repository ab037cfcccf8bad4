//! Route-scoped role authorization
//!
//! [`PolicyRegistry`] collects the policies at startup; [`AuthorizationEngine`]
//! owns the frozen registry and decides each request.

pub mod engine;
pub mod registry;

pub use engine::{
    AuthorizationEngine, AuthorizationEngineBuilder, AuthorizationOptions, AuthorizationRequest,
    Decision, Outcome,
};
pub use registry::{ControllerPolicy, ControllerRegistration, PolicyLookup, PolicyRegistry};
