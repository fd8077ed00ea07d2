use std::error::Error as StdError;
use std::fmt;
use std::io;

use crate::diagnostics::Diagnostic;

/// Unified error type for the exception-handling lowering core.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Config {
        message: String,
    },
    /// Lowering recorded error diagnostics for the translation unit.
    Lowering {
        diagnostics: Vec<Diagnostic>,
    },
}

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Construct a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Diagnostics carried by a lowering failure.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Error::Lowering { diagnostics } => diagnostics,
            _ => &[],
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Config { message } => write!(f, "configuration error: {message}"),
            Error::Lowering { diagnostics } => {
                let errors = diagnostics
                    .iter()
                    .filter(|diagnostic| diagnostic.severity.is_error())
                    .count();
                write!(f, "exception lowering failed with {errors} error(s)")?;
                if let Some(first) = diagnostics
                    .iter()
                    .find(|diagnostic| diagnostic.severity.is_error())
                {
                    write!(f, "; first: {first}")?;
                }
                Ok(())
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Config { .. } | Error::Lowering { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::config(error.to_string())
    }
}
