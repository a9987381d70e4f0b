use thiserror::Error;

/// Failures the verification pipeline can hit.
///
/// None of these escape [`crate::engine::DecisionEngine::verify`]: the engine
/// folds every variant into a forged-by-default verdict whose `reason` names
/// the cause. Callers only see `EngineError` when they drive the lower-level
/// components directly.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// The corpus directory does not exist. The engine treats this as an
    /// empty corpus, not a failure.
    #[error("corpus directory unavailable: {path}")]
    CorpusUnavailable { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("verification cancelled")]
    Cancelled,
}

/// Rejected engine configuration.
///
/// Raised before any verification runs; a bad configuration never turns into
/// a verdict.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("similarity threshold {0} outside 0-100")]
    ThresholdOutOfRange(f64),

    #[error("pixel forgery floor {0} outside 0-100")]
    FloorOutOfRange(f64),

    #[error("weights must be finite: hash {hash}, size {size}")]
    NonFiniteWeight { hash: f64, size: f64 },

    #[error("weights must not be negative: hash {hash}, size {size}")]
    NegativeWeight { hash: f64, size: f64 },

    #[error("weights must sum to 1.0, got {0}")]
    WeightSum(f64),

    #[error("failed to read config file: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}
