//! Error type shared by the warden crates
//!
//! Failures raised inside warden carry an [`ErrorContext`] whose id is logged
//! with the error, so a bare 500 seen by a client can be traced to one event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type WardenResult<T> = Result<T, WardenError>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Where and when a failure happened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub error_id: String,
    pub occurred_at: DateTime<Utc>,
    /// Subsystem that raised the error, e.g. `sqlite_store` or `config`
    pub component: String,
    pub operation: Option<String>,
    /// Operator-facing hint logged next to the error
    pub hint: Option<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            occurred_at: Utc::now(),
            component: component.to_string(),
            operation: None,
            hint: None,
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_string());
        self
    }
}

#[derive(Error, Debug)]
pub enum WardenError {
    /// The session store could not be read or written
    #[error("Session store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
        context: ErrorContext,
    },

    /// Token derivation failed
    #[error("Token error: {message}")]
    Token {
        message: String,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WardenError {
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            WardenError::Store { context, .. }
            | WardenError::Config { context, .. }
            | WardenError::Token { context, .. } => Some(context),
            WardenError::Io(_) | WardenError::Serialization(_) => None,
        }
    }

    /// Attach an operator-facing hint; a no-op for wrapped foreign errors
    pub fn with_hint(mut self, hint: &str) -> Self {
        match &mut self {
            WardenError::Store { context, .. }
            | WardenError::Config { context, .. }
            | WardenError::Token { context, .. } => context.hint = Some(hint.to_string()),
            WardenError::Io(_) | WardenError::Serialization(_) => {}
        }
        self
    }

    /// Emit one tracing event for this error.
    ///
    /// Store outages are warnings: the next request may well succeed.
    pub fn log(&self) {
        let context = self.context();
        let error_id = context.map(|c| c.error_id.as_str());
        let component = context.map(|c| c.component.as_str());
        let operation = context.and_then(|c| c.operation.as_deref());
        let hint = context.and_then(|c| c.hint.as_deref());

        match self {
            WardenError::Store { .. } | WardenError::Io(_) => {
                warn!(error_id, component, operation, hint, error = %self, "Session store unavailable");
            }
            _ => {
                error!(error_id, component, operation, hint, error = %self, "Warden error");
            }
        }
    }
}

/// Build a [`WardenError::Store`] for a component, optionally wrapping a source
#[macro_export]
macro_rules! store_error {
    ($msg:expr, $component:expr) => {
        $crate::WardenError::Store {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::WardenError::Store {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}

/// Build a [`WardenError::Config`] raised during `operation`
#[macro_export]
macro_rules! config_error {
    ($operation:expr, $msg:expr) => {
        $crate::WardenError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new("config").with_operation($operation),
        }
    };
    ($operation:expr, $msg:expr, $source:expr) => {
        $crate::WardenError::Config {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new("config").with_operation($operation),
        }
    };
}
