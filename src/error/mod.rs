use thiserror::Error;

#[cfg(test)]
pub mod testing;

/// Main error type for the action queue
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    // ============ Scheduling Errors (AQ0xx) ============
    /// An insert still references a transient instance that was never saved
    #[error(
        "Not-null property '{property_path}' of {entity}#{id} references a transient value \
         of type '{transient_entity}'; save the transient instance before flushing"
    )]
    UnresolvedReference {
        entity: String,
        id: String,
        transient_entity: String,
        property_path: String,
    },

    /// An insert was rejected by a pre-insert policy hook
    #[error("Insert of {entity}#{id} was vetoed")]
    VetoedInsert {
        entity: String,
        id: String,
    },

    // ============ Execution Errors (AQ1xx) ============
    /// An action effect failed
    #[error("Action on '{entity}' failed: {reason}")]
    ExecutionFailed {
        entity: String,
        reason: String,
    },

    /// Storage collaborator failed (batch flush)
    #[error("Storage operation '{operation}' failed: {reason}")]
    Storage {
        operation: String,
        reason: String,
    },

    // ============ Transaction Completion Errors (AQ2xx) ============
    /// A before/after completion callback failed
    #[error("{phase} transaction completion callback failed: {error}")]
    Callback {
        phase: CompletionPhase,
        error: String,
    },

    /// Second-level cache failure (recoverable during after-completion)
    #[error("Cache region '{region}' error: {reason}")]
    Cache {
        region: String,
        reason: String,
    },

    // ============ Snapshot Errors (AQ3xx) ============
    /// Serialization/deserialization failed
    #[error("Serialization error: {message}")]
    SerializationError {
        message: String,
    },

    /// Snapshot written by an incompatible format version
    #[error("Unsupported action queue snapshot version {found} (supported: {supported})")]
    UnsupportedSnapshotVersion {
        found: u32,
        supported: u32,
    },

    // ============ System Errors (AQ9xx) ============
    /// Configuration error (invalid setting value)
    #[error("Configuration error for '{setting}': {reason} (value: {value})")]
    ConfigError {
        setting: String,
        value: String,
        reason: String,
    },

    /// Internal error (assertion failure inside the queue)
    #[error("Internal error at {file}:{line}: {message}\nPlease report this bug.")]
    InternalError {
        message: String,
        file: &'static str,
        line: u32,
    },
}

/// Transaction boundary a callback ran at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPhase {
    Before,
    After,
}

impl std::fmt::Display for CompletionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionPhase::Before => write!(f, "before"),
            CompletionPhase::After => write!(f, "after"),
        }
    }
}

impl QueueError {
    /// Stable error code for this error
    pub fn code(&self) -> &'static str {
        use QueueError::*;
        match self {
            UnresolvedReference { .. } => "AQ001",
            VetoedInsert { .. } => "AQ002",

            ExecutionFailed { .. } => "AQ101",
            Storage { .. } => "AQ102",

            Callback { .. } => "AQ201",
            Cache { .. } => "AQ202",

            SerializationError { .. } => "AQ301",
            UnsupportedSnapshotVersion { .. } => "AQ302",

            ConfigError { .. } => "AQ901",
            InternalError { .. } => "AQ999",
        }
    }

    /// Whether an after-completion drain may log this error and keep going
    pub fn is_recoverable_cache_error(&self) -> bool {
        matches!(self, QueueError::Cache { .. })
    }

    /// Create internal error with file/line info
    pub fn internal(message: String, file: &'static str, line: u32) -> Self {
        QueueError::InternalError { message, file, line }
    }
}

/// Result type for action queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Convert serde_json::Error to QueueError
impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        QueueError::SerializationError {
            message: format!("JSON serialization error: {e}"),
        }
    }
}

/// Convert bincode::Error to QueueError
impl From<bincode::Error> for QueueError {
    fn from(e: bincode::Error) -> Self {
        QueueError::SerializationError {
            message: format!("Binary serialization error: {e}"),
        }
    }
}

/// Convert std::io::Error to QueueError
impl From<std::io::Error> for QueueError {
    fn from(e: std::io::Error) -> Self {
        QueueError::SerializationError {
            message: format!("I/O error: {e}"),
        }
    }
}

/// Helper macro for creating internal errors with automatic file/line
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::QueueError::internal($msg.to_string(), file!(), line!())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::QueueError::internal(format!($fmt, $($arg)*), file!(), line!())
    };
}
