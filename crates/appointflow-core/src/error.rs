use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppointflowError {
    // Step errors
    #[error("Step failed: {step}: {message}")]
    StepFailed { step: String, message: String },

    #[error("Review failed: {0}")]
    Review(String),

    // Graph errors
    #[error("Graph misconfigured: {0}")]
    Graph(String),

    // Pause store errors
    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Run {run_id} is awaiting {actual}, not {expected}")]
    RunConflict {
        run_id: String,
        expected: String,
        actual: String,
    },

    #[error("Pause store error: {0}")]
    Store(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppointflowError {
    /// Stable snake_case name used in trace markers (`step_error:<kind>`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StepFailed { .. } => "step_failed",
            Self::Review(_) => "review",
            Self::Graph(_) => "graph",
            Self::RunNotFound(_) => "run_not_found",
            Self::RunConflict { .. } => "run_conflict",
            Self::Store(_) => "store",
            Self::Config(_) => "config",
            Self::ConfigNotFound(_) => "config_not_found",
            Self::Gateway(_) => "gateway",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppointflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        let err = AppointflowError::StepFailed {
            step: "draft".into(),
            message: "boom".into(),
        };
        assert_eq!(err.kind(), "step_failed");
        assert_eq!(err.to_string(), "Step failed: draft: boom");

        let io = AppointflowError::from(std::io::Error::other("disk"));
        assert_eq!(io.kind(), "io");
    }

    #[test]
    fn conflict_message_names_both_stages() {
        let err = AppointflowError::RunConflict {
            run_id: "r1".into(),
            expected: "slot".into(),
            actual: "review".into(),
        };
        assert_eq!(err.to_string(), "Run r1 is awaiting review, not slot");
    }
}
