use thiserror::Error;

/// Errors surfaced by the reliable-unicast engine's public API.
///
/// Per the error handling design, almost nothing here reaches an
/// application: transport failures, protocol errors, and duplicate/restart
/// conditions are logged and swallowed internally. What remains is the
/// small set of failures that make sense to refuse outright (bad wire
/// bytes, calling into a layer that was never started).
#[derive(Debug, Error)]
pub enum RunicastError {
    #[error("header too short: expected at least {expected} bytes, got {actual}")]
    HeaderTooShort { expected: usize, actual: usize },

    #[error("unknown header type byte: {0:#04x}")]
    UnknownHeaderType(u8),

    #[error("engine not started")]
    NotStarted,

    #[error("no tokio runtime available to arm timer")]
    NoRuntime,

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, RunicastError>;
