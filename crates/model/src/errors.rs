use thiserror::Error;

/// Raised when a provider page does not have the expected shape.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PayloadError {
    #[error("malformed event page: {0}")]
    Decode(String),

    #[error("missing `{0}` in event page")]
    MissingField(&'static str),

    #[error("invalid charge amount `{value}` for charge type `{charge_type}`")]
    InvalidAmount { charge_type: String, value: String },

    #[error("refund amounts overflow the running total")]
    AmountOverflow,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("window start must be before its end (start: {start}, end: {end})")]
    Inverted { start: String, end: String },

    #[error("window span must be positive")]
    EmptySpan,
}
