//! Error types and handling for Vermeer

/// Result type alias for Vermeer operations
pub type Result<T> = std::result::Result<T, VermeerError>;

/// Error types for the Vermeer buffer allocation and sharing layer
#[derive(Debug, thiserror::Error)]
pub enum VermeerError {
    /// A received handle failed structural validation. Deliberately carries
    /// no detail: a descriptor that fails validation must not be partially
    /// trusted, so callers get one generic rejection regardless of which
    /// check tripped.
    #[error("invalid buffer handle")]
    InvalidHandle,

    /// Operation is not valid for this handle's kind
    #[error("unsupported operation: {message}")]
    Unsupported { message: String },

    /// A process attempted to tear down a mapping it does not own
    #[error("cross-process violation: mapping owned by pid {owner}, caller is pid {caller}")]
    CrossProcessViolation { owner: u32, caller: u32 },

    /// The allocation/mapping backend is not reachable
    #[error("allocation backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// Memory allocation or mapping failures
    #[error("memory error: {message}")]
    Memory { message: String },

    /// Invalid parameters or configuration
    #[error("invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// I/O related errors (fd operations, mmap, etc.)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Serialization/deserialization errors (attribute area payloads)
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Platform-specific errors
    #[error("platform error: {message}")]
    Platform { message: String },
}

impl VermeerError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a cross-process violation error
    pub fn cross_process(owner: u32, caller: u32) -> Self {
        Self::CrossProcessViolation { owner, caller }
    }

    /// Create a backend-unavailable error
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Create a memory error
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a platform error
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for VermeerError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<bincode::Error> for VermeerError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(format!("bincode error: {}", err))
    }
}
