use thiserror::Error;

/// Closed set of error kinds the core can produce internally (spec §7).
/// Composition boundaries (the strategy engine's tick, discovery cycle, `main`)
/// use `anyhow::Result` and attach context the way the teacher does; this enum
/// exists so callers that care about *kind* (tests, the live adapter) can match
/// on it instead of string-sniffing an `anyhow::Error`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transient executor error: {0}")]
    TransientExecutor(String),

    #[error("order rejected: {0}")]
    RejectedOrder(String),

    #[error("invalid order book state: {0}")]
    InvalidOrderBookState(&'static str),

    #[error("config violation: {0}")]
    ConfigViolation(&'static str),

    #[error("exposure exhausted")]
    ExposureExhausted,

    #[error("order stale: no terminal status within timeout")]
    StaleOrder,

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("publisher error: {0}")]
    Publisher(String),
}
