// Service errors shared by the eTour and SMOS facades

use crate::validation::{describe, ValidationError};

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// One or more input fields failed validation
    Validation(Vec<ValidationError>),

    NotFound { entity: &'static str, id: String },

    Duplicate { entity: &'static str, detail: String },

    /// A per-owner capacity has been used up (e.g. banners per point)
    LimitReached { entity: &'static str, limit: usize },

    /// The simulated remote server dropped the connection
    ConnectionInterrupted { server: String },

    Unauthorized { action: String, reason: String },

    /// The entity exists but its state forbids the operation
    InvalidState(String),

    Storage(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(entity: &'static str, id: &str) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn duplicate(entity: &'static str, detail: impl Into<String>) -> Self {
        ServiceError::Duplicate {
            entity,
            detail: detail.into(),
        }
    }

    pub fn unauthorized(action: &str, reason: impl Into<String>) -> Self {
        ServiceError::Unauthorized {
            action: action.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_connection_interrupted(&self) -> bool {
        matches!(self, ServiceError::ConnectionInterrupted { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::NotFound { .. } => "not_found",
            ServiceError::Duplicate { .. } => "duplicate",
            ServiceError::LimitReached { .. } => "limit_reached",
            ServiceError::ConnectionInterrupted { .. } => "connection_interrupted",
            ServiceError::Unauthorized { .. } => "unauthorized",
            ServiceError::InvalidState(_) => "invalid_state",
            ServiceError::Storage(_) => "storage",
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Validation(errors) => {
                write!(f, "Invalid data:\n{}", describe(errors))
            }
            ServiceError::NotFound { entity, id } => write!(f, "{} not found: {}", entity, id),
            ServiceError::Duplicate { entity, detail } => {
                write!(f, "{} already exists: {}", entity, detail)
            }
            ServiceError::LimitReached { entity, limit } => {
                write!(f, "Maximum number of {} reached ({})", entity, limit)
            }
            ServiceError::ConnectionInterrupted { server } => {
                write!(f, "Connection to the {} server was interrupted", server)
            }
            ServiceError::Unauthorized { action, reason } => {
                write!(f, "Not allowed to {}: {}", action, reason)
            }
            ServiceError::InvalidState(message) => write!(f, "{}", message),
            ServiceError::Storage(message) => write!(f, "Storage error: {}", message),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<Vec<ValidationError>> for ServiceError {
    fn from(errors: Vec<ValidationError>) -> Self {
        ServiceError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = ServiceError::not_found("Banner", "b-1");
        assert_eq!(err.to_string(), "Banner not found: b-1");

        let err = ServiceError::LimitReached {
            entity: "banners",
            limit: 5,
        };
        assert_eq!(err.to_string(), "Maximum number of banners reached (5)");

        let err = ServiceError::ConnectionInterrupted {
            server: "ETOUR".to_string(),
        };
        assert!(err.is_connection_interrupted());
        assert_eq!(err.kind(), "connection_interrupted");
    }

    #[test]
    fn test_validation_conversion() {
        let errors = vec![ValidationError {
            field: "reason".to_string(),
            message: "Required field is empty".to_string(),
            context: "Justification".to_string(),
        }];
        let err: ServiceError = errors.into();
        assert_eq!(
            err.to_string(),
            "Invalid data:\n[Justification] reason: Required field is empty"
        );
    }
}
