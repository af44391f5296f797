use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A ratio whose denominator collapsed to zero; carries the metric label.
    #[error("metric '{metric}' is undefined for these inputs (division by zero)")]
    DegenerateInput { metric: &'static str },
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
