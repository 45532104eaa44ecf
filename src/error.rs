use thiserror::Error;

/// Errors raised by the collector core.
///
/// Scope of each variant:
/// - `Configuration`: fatal to one worker (bad symbol/pairing), or to the
///   run when raised while loading configuration
/// - `Transport`: one fetch failed; that round has no data for the asset
/// - `CountMismatch`: fatal to the whole run, raised before any task starts
/// - `Io`: presenter persistence failures
///
/// There is no decode variant: decoders degrade to empty output instead.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transport error for {identifier}: {message}")]
    Transport { identifier: String, message: String },

    #[error("count mismatch: {names} asset names but {sources} data sources")]
    CountMismatch { names: usize, sources: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CollectorError {
    pub fn transport(identifier: impl Into<String>, message: impl ToString) -> Self {
        CollectorError::Transport {
            identifier: identifier.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;
