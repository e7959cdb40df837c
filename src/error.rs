//! # Relay Error Types
//!
//! Structured error handling for the delivery core using thiserror
//! instead of `Box<dyn Error>` patterns. Public pipeline entry points
//! (`guarantee_delivery`, `run_health_check`) never surface these to the
//! caller; they convert them into structured outcome reports.

use thiserror::Error;

/// Comprehensive error types for the delivery core
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Database error: {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("Queue error: {message}")]
    Queue { message: String },

    #[error("Chat sink error: {message}")]
    ChatSink { message: String },

    #[error("No tenant found for company id: {company_id}")]
    NoTenantFound { company_id: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Timeout: operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl RelayError {
    /// Create a database error with operation context
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    /// Create a chat sink error
    pub fn chat_sink(message: impl Into<String>) -> Self {
        Self::ChatSink {
            message: message.into(),
        }
    }

    /// Create a no-tenant-found error
    pub fn no_tenant_found(company_id: impl Into<String>) -> Self {
        Self::NoTenantFound {
            company_id: company_id.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

impl From<sqlx::Error> for RelayError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            operation: "query".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::database("claim_batch", "connection refused");
        assert_eq!(
            err.to_string(),
            "Database error: claim_batch: connection refused"
        );

        let err = RelayError::no_tenant_found("acme-42");
        assert_eq!(err.to_string(), "No tenant found for company id: acme-42");
    }

    #[test]
    fn test_sqlx_conversion() {
        let err: RelayError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, RelayError::Database { .. }));
    }
}
