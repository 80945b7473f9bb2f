//! Crate-wide error type.
//!
//! One enum, one variant per error kind named in the design (configuration,
//! I/O, device, shape invariant, precondition, abort). Call sites attach
//! enough context to name the offending key, layer index, or VkResult so the
//! CLI boundary can report something actionable without re-deriving it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RichardError {
    #[error("configuration error at `{key}`: {message}")]
    Configuration { key: String, message: String },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("device error: {message}")]
    Device { message: String },

    #[error("shape invariant violated: {message}")]
    ShapeInvariant { message: String },

    #[error("precondition violated: {message}")]
    Precondition { message: String },

    #[error("aborted")]
    Abort,
}

pub type Result<T> = std::result::Result<T, RichardError>;

impl RichardError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        RichardError::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        RichardError::ShapeInvariant {
            message: message.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        RichardError::Precondition {
            message: message.into(),
        }
    }

    pub fn device(message: impl Into<String>) -> Self {
        RichardError::Device {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        RichardError::Io {
            path: path.into(),
            source,
        }
    }
}
