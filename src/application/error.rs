//! # Application Errors
//!
//! Error types for the application layer.
//!
//! These errors represent failures that can occur during use case execution,
//! including business rule violations, missing deals, exhausted
//! compare-and-swap retries and infrastructure errors.
//!
//! # Error Hierarchy
//!
//! ```text
//! ApplicationError
//! ├── Domain(DomainError)                 - Business rule violations
//! ├── Infrastructure(InfrastructureError) - Store and provider failures
//! ├── Validation(String)                  - Input validation failures
//! ├── NotFound                            - Deal or message not found
//! ├── Contention                          - CAS retries exhausted
//! └── Internal(String)
//! ```
//!
//! # Examples
//!
//! ```
//! use dealdesk::application::error::{ApplicationError, InfrastructureError};
//!
//! let err = ApplicationError::not_found("deal", "7f0c...");
//! assert!(err.is_not_found());
//!
//! let infra_err = InfrastructureError::timeout("market metrics");
//! let app_err: ApplicationError = infra_err.into();
//! assert!(app_err.is_retryable());
//! ```

use crate::domain::errors::DomainError;
use crate::infrastructure::persistence::RepositoryError;
use thiserror::Error;

/// Infrastructure layer error.
///
/// Represents errors from the data store, the market metrics source and the
/// process configuration.
#[derive(Debug, Error)]
pub enum InfrastructureError {
    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// External service error.
    #[error("external service error: {service} - {message}")]
    ExternalService {
        /// Service name.
        service: String,
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Timeout error.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Repository error.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl InfrastructureError {
    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates an external service error.
    #[must_use]
    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Repository(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Application layer error.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Domain error from business logic.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Infrastructure error from external systems.
    #[error("infrastructure error: {0}")]
    Infrastructure(#[from] InfrastructureError),

    /// Request validation failed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("not found: {resource_type} with id {id}")]
    NotFound {
        /// Type of resource.
        resource_type: String,
        /// Resource identifier.
        id: String,
    },

    /// Concurrent writers kept moving the deal's version.
    #[error("deal {deal_id} still contended after {attempts} attempts")]
    Contention {
        /// Contended deal.
        deal_id: String,
        /// Attempts made.
        attempts: u32,
    },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        Self::Infrastructure(InfrastructureError::Repository(error))
    }
}

impl ApplicationError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Creates a contention error.
    #[must_use]
    pub fn contention(deal_id: impl Into<String>, attempts: u32) -> Self {
        Self::Contention {
            deal_id: deal_id.into(),
            attempts,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the wrapped domain error, if any.
    #[must_use]
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Infrastructure(e) => e.is_retryable(),
            Self::Contention { .. } => true,
            _ => false,
        }
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a validation error, at either layer.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Domain(e) => e.is_validation(),
            _ => false,
        }
    }

    /// Returns true if the deal was already closed.
    #[must_use]
    pub fn is_deal_closed(&self) -> bool {
        self.as_domain().is_some_and(DomainError::is_deal_closed)
    }

    /// Returns true if automation could not run on the deal.
    #[must_use]
    pub fn is_automation_not_applicable(&self) -> bool {
        self.as_domain()
            .is_some_and(DomainError::is_automation_not_applicable)
    }
}

/// Result type for application operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{DealId, DealStatus};

    mod infrastructure {
        use super::*;

        #[test]
        fn network_is_retryable() {
            let err = InfrastructureError::network("connection refused");
            assert!(err.to_string().contains("network"));
            assert!(err.is_retryable());
        }

        #[test]
        fn configuration_is_not_retryable() {
            let err = InfrastructureError::configuration("missing store url");
            assert!(err.to_string().contains("configuration"));
            assert!(!err.is_retryable());
        }

        #[test]
        fn external_service_names_service() {
            let err = InfrastructureError::external_service("market-metrics", "rate limited");
            assert!(err.to_string().contains("market-metrics"));
            assert!(err.to_string().contains("rate limited"));
        }

        #[test]
        fn repository_retryability_is_passed_through() {
            let err: InfrastructureError = RepositoryError::timeout("5s").into();
            assert!(err.is_retryable());
            let err: InfrastructureError = RepositoryError::not_found("DealRecord", "d-1").into();
            assert!(!err.is_retryable());
            assert!(err.to_string().contains("d-1"));
        }
    }

    mod application {
        use super::*;

        #[test]
        fn not_found() {
            let err = ApplicationError::not_found("deal", "d-123");
            assert!(err.to_string().contains("d-123"));
            assert!(err.is_not_found());
        }

        #[test]
        fn validation_covers_domain_validation() {
            assert!(ApplicationError::validation("limit must be positive").is_validation());
            let err: ApplicationError = DomainError::validation("fee bounds").into();
            assert!(err.is_validation());
        }

        #[test]
        fn deal_closed_is_detected_through_domain() {
            let err: ApplicationError =
                DomainError::deal_closed(DealId::new_v4(), DealStatus::Accepted).into();
            assert!(err.is_deal_closed());
            assert!(!err.is_retryable());
        }

        #[test]
        fn contention_is_retryable() {
            let err = ApplicationError::contention("d-1", 5);
            assert!(err.is_retryable());
            assert!(err.to_string().contains("5 attempts"));
        }

        #[test]
        fn repository_errors_convert() {
            let err: ApplicationError = RepositoryError::connection("reset").into();
            assert!(matches!(err, ApplicationError::Infrastructure(_)));
            assert!(err.is_retryable());
        }
    }
}
