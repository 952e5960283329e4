use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all Ivory operations.
#[derive(Debug, Error, Diagnostic)]
pub enum IvoryError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid engine settings (namespaces, resolvers, strategies).
    #[error("Configuration error: {message}")]
    #[diagnostic(help("Check your ivory.toml settings file"))]
    Config { message: String },

    /// A module descriptor could not be read or parsed.
    #[error("Descriptor error: {message}")]
    Descriptor { message: String },

    /// Dependency resolution failed (missing module, no matching revision, etc.).
    #[error("Dependency resolution failed: {message}")]
    Resolution { message: String },

    /// Network request failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// An artifact could not be downloaded or verified.
    #[error("Download failed: {message}")]
    Download { message: String },

    /// An API was used without the state it requires (e.g. no engine context bound).
    #[error("Illegal state: {message}")]
    IllegalState { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

impl IvoryError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }
}

/// Convenience alias for `miette::Result<T>`.
pub type IvoryResult<T> = miette::Result<T>;
