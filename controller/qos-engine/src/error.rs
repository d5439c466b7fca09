//! Error taxonomy shared by the checker, the enforcement path and the gateway

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QosError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("malformed {what}: {message}")]
    MalformedData { what: &'static str, message: String },

    #[error("{target} unavailable: {message}")]
    UpstreamUnavailable { target: &'static str, message: String },

    #[error("prediction failed: {message}")]
    PredictionFailure { message: String },
}

impl QosError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        QosError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn malformed(what: &'static str, message: impl ToString) -> Self {
        QosError::MalformedData {
            what,
            message: message.to_string(),
        }
    }

    pub fn upstream(target: &'static str, message: impl ToString) -> Self {
        QosError::UpstreamUnavailable {
            target,
            message: message.to_string(),
        }
    }

    pub fn prediction(message: impl ToString) -> Self {
        QosError::PredictionFailure {
            message: message.to_string(),
        }
    }

    /// Stable label for metrics and for mapping onto client-visible errors
    pub fn kind(&self) -> &'static str {
        match self {
            QosError::NotFound { .. } => "not_found",
            QosError::MalformedData { .. } => "malformed_data",
            QosError::UpstreamUnavailable { .. } => "upstream_unavailable",
            QosError::PredictionFailure { .. } => "prediction_failure",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, QosError::NotFound { .. })
    }
}

pub type QosResult<T> = std::result::Result<T, QosError>;
