//! Error types for stream construction.

use thiserror::Error;

/// Errors raised synchronously when a shared stream is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An initial value was supplied without any replay capacity to hold it.
    #[error("an initial value requires a replay capacity of at least 1")]
    InitialWithoutReplay,

    /// A dropping overflow policy was combined with a zero-capacity buffer.
    #[error("overflow policies other than suspend require a positive buffer capacity")]
    ZeroCapacityOverflow,
}
