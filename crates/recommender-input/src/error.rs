//! Error types for recommender input

/// Failure to parse a Kubernetes quantity string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),

    #[error("unknown suffix {suffix:?} in quantity {quantity:?}")]
    UnknownSuffix { quantity: String, suffix: String },

    #[error("negative quantity {0:?}")]
    Negative(String),

    #[error("quantity {0:?} is out of range")]
    Overflow(String),
}

/// Errors surfaced by the input layer
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, InputError>;
