use thiserror::Error;

/// Reasons a producer event is refused at ingestion.
///
/// These never escape the store's event hooks: the event is logged, counted
/// and dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// The event carried no `received_at`; it cannot take part in temporal matching.
    #[error("{kind} event without received_at timestamp")]
    MissingTimestamp { kind: &'static str },

    /// A decoded message with neither a protocol hash nor any content to fingerprint.
    #[error("decoded message has no identity (no hash, sender or text)")]
    NoIdentity,
}

/// Invalid correlation settings detected by `Config::validate`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a positive number of seconds, got {value}")]
    NonPositiveSeconds { field: &'static str, value: f64 },

    #[error("{field} must be greater than zero")]
    ZeroCapacity { field: &'static str },

    #[error("buffer_horizon_seconds ({horizon}) must not be shorter than temporal_window_seconds ({window})")]
    HorizonShorterThanWindow { horizon: f64, window: f64 },
}
