use thiserror::Error;

/// Result type alias for flux reconciliation operations
pub type Result<T> = std::result::Result<T, FluxError>;

/// Errors that can occur while decoding, merging or analysing flux captures
///
/// Per-sector CRC failures, missing sectors and false sync matches are not
/// errors: they are recorded as data on the decoded track. Only input
/// validation failures and caller-requested aborts surface here.
#[derive(Debug, Error)]
pub enum FluxError {
    /// I/O error occurred while reading a capture file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Empty or otherwise unusable input buffer
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not enough revolutions supplied for the requested analysis
    #[error("Not enough revolutions: found {found}, need at least {required}")]
    NotEnoughRevolutions {
        /// Number of revolutions supplied
        found: usize,
        /// Minimum number required
        required: usize,
    },

    /// Analysis length is zero or exceeds a revolution buffer
    #[error("Invalid length {length} (available: {available})")]
    InvalidLength {
        /// Requested length in bytes
        length: usize,
        /// Shortest revolution length in bytes
        available: usize,
    },

    /// Malformed parameter set
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Configuration could not be used
    #[error("Configuration error: {0}")]
    Config(String),

    /// A per-track callback requested that processing stop
    #[error("Aborted at cylinder {cylinder}, head {head}")]
    Aborted {
        /// Cylinder of the track that requested the abort
        cylinder: u8,
        /// Head of the track that requested the abort
        head: u8,
    },
}

impl FluxError {
    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        FluxError::InvalidInput(message.into())
    }

    /// Create an invalid parameters error
    pub fn invalid_params<S: Into<String>>(message: S) -> Self {
        FluxError::InvalidParams(message.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        FluxError::Config(message.into())
    }
}
