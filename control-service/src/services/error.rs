use service_core::error::AppError;
use thiserror::Error;

/// Pipeline failures. `Clone` so single-flight waiters can share one
/// outcome.
#[derive(Debug, Clone, Error)]
pub enum ControlError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("authorization denied: {0}")]
    Authorization(String),

    #[error("credential resolution failed: {0}")]
    Credential(String),

    #[error("upstream platform call failed: {0}")]
    Upstream(String),

    #[error("secret sealing failed: {0}")]
    Encryption(String),
}

impl ControlError {
    /// Result string stored in the audit ledger for a failed attempt.
    pub fn audit_result(&self) -> String {
        format!("error: {}", self)
    }
}

impl From<ControlError> for AppError {
    fn from(err: ControlError) -> Self {
        match &err {
            ControlError::Validation(msg) => AppError::ValidationError(msg.clone()),
            ControlError::Authorization(_) => {
                AppError::Forbidden(anyhow::anyhow!("Not authorized for this action"))
            }
            // Upstream details are logged, never echoed to the caller.
            ControlError::UnknownAction(_)
            | ControlError::Credential(_)
            | ControlError::Upstream(_)
            | ControlError::Encryption(_) => {
                tracing::error!(error = %err, "GitHub action failed");
                AppError::InternalError(anyhow::anyhow!("GitHub action failed"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_results_are_error_tagged() {
        let err = ControlError::Authorization("user alice is not in team x".to_string());
        assert!(err.audit_result().starts_with("error: authorization denied"));

        let err = ControlError::UnknownAction("nonexistent".to_string());
        assert_eq!(err.audit_result(), "error: unknown action: nonexistent");
    }
}
