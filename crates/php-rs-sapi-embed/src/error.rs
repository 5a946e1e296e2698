//! Errors raised by the embedding API.

use std::path::PathBuf;

use php_rs_vm::VmError;
use thiserror::Error;

/// A host value has no runtime representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("Unable to create value of unknown type '{0}'")]
    UnsupportedType(String),
}

impl serde::ser::Error for ConversionError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        ConversionError::UnsupportedType(msg.to_string())
    }
}

/// Failure while running code in a [`Context`](crate::Context).
#[derive(Debug, Error)]
pub enum ContextError {
    /// Parse error, uncaught exception or fatal error. The diagnostic has
    /// already been written to the log sink.
    #[error("{0}")]
    Execution(String),
    /// The script called exit() with this status.
    #[error("script exited with status {0}")]
    Exit(i64),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    /// The context, or the engine that owned it, was destroyed.
    #[error("context has been destroyed")]
    Destroyed,
    /// Called from a host callback while the context is running a script.
    #[error("context is already executing a script")]
    Busy,
}

impl From<VmError> for ContextError {
    fn from(err: VmError) -> Self {
        match err {
            VmError::Exit(code) => ContextError::Exit(code),
            VmError::Parse { message, .. } => ContextError::Execution(message),
            VmError::Uncaught { class, message } => {
                ContextError::Execution(format!("Uncaught {}: {}", class, message))
            }
            VmError::Fatal(message) => ContextError::Execution(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Only one engine may run per process.
    #[error("PHP engine already active in this process")]
    AlreadyActive,
    #[error("PHP engine has been destroyed")]
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiverError {
    /// A class with this name (compared case-insensitively) already exists.
    #[error("Failed to define duplicate receiver '{0}'")]
    Duplicate(String),
    /// The host constructor rejected its arguments.
    #[error("Failed to instantiate method receiver '{0}'")]
    Instantiation(String),
    #[error("Value '{0}' does not exist or is not addressable")]
    UnknownField(String),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
