use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{collaborator} call failed: {message}")]
    CollaboratorFailure {
        collaborator: &'static str,
        message: String,
    },

    #[error("malformed model output: {message}")]
    MalformedModelOutput { message: String },

    #[error("cannot compute {metric} over an empty relevance matrix")]
    DivisionByZero { metric: &'static str },

    #[error("interrupted by user")]
    UserInterrupt,

    #[error("checkpoint write failed: {0}")]
    Checkpoint(String),
}

impl EvalError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::CollaboratorFailure {
            collaborator,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedModelOutput {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::CollaboratorFailure { .. } => "collaborator_failure",
            Self::MalformedModelOutput { .. } => "malformed_model_output",
            Self::DivisionByZero { .. } => "division_by_zero",
            Self::UserInterrupt => "user_interrupt",
            Self::Checkpoint(_) => "checkpoint",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EvalError;

    #[test]
    fn collaborator_failure_names_the_collaborator() {
        let error = EvalError::collaborator("qdrant", "HTTP 503: unavailable");
        assert_eq!(error.kind(), "collaborator_failure");
        assert_eq!(error.to_string(), "qdrant call failed: HTTP 503: unavailable");
    }

    #[test]
    fn division_by_zero_mentions_metric() {
        let error = EvalError::DivisionByZero { metric: "mrr" };
        assert!(error.to_string().contains("mrr"));
    }
}
