/// Error types for the decision engine
///
/// Insufficient data is never an error (it is an undefined series entry).
/// These variants cover the conditions that turn a whole evaluation into a
/// `skip` decision or that surface while loading configuration.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid signal: {reason}")]
    InvalidSignal { reason: String },

    #[error("malformed bar at index {index}: {reason}")]
    MalformedBar { index: usize, reason: String },

    #[error("insufficient data: have {bars} bars, need {minimum}")]
    InsufficientData { bars: usize, minimum: usize },

    #[error("computation failed: {reason}")]
    Computation { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
