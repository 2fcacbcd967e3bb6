use super::ConflictingRequirement;
use crate::jvm;
use crate::jvm::BinaryName;
use std::fmt::{Display, Error as FmtError, Formatter};

/// Problems building the reference table of a module
///
/// Apart from I/O failures of the byte source, these are defects in the instrumentation (or in
/// how it was packaged), not conditions of the class-loading context being checked.
#[derive(Debug)]
pub enum Error {
    /// Class file bytes could not be read
    Io {
        class: BinaryName,
        error: std::io::Error,
    },

    /// Class file could not be decoded
    ClassFormat { class: BinaryName, error: jvm::Error },

    /// Two call sites disagree about the shape of a symbol
    ConflictingRequirement(ConflictingRequirement),

    /// A class name in a module declaration is not valid
    MalformedName(String),
}

impl Error {
    /// Will building again from the same class files fail the same way?
    ///
    /// Only read failures other than a missing class file are worth another attempt.
    pub fn is_permanent(&self) -> bool {
        match self {
            Error::Io { error, .. } => error.kind() == std::io::ErrorKind::NotFound,
            Error::ClassFormat { .. } | Error::ConflictingRequirement(_) | Error::MalformedName(_) => {
                true
            }
        }
    }
}

impl From<ConflictingRequirement> for Error {
    fn from(conflict: ConflictingRequirement) -> Error {
        Error::ConflictingRequirement(conflict)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Error::Io { class, error } => write!(f, "cannot read class {}: {}", class, error),
            Error::ClassFormat { class, error } => {
                write!(f, "cannot decode class {}: {}", class, error)
            }
            Error::ConflictingRequirement(conflict) => write!(f, "{}", conflict),
            Error::MalformedName(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { error, .. } => Some(error),
            Error::ClassFormat { error, .. } => Some(error),
            Error::ConflictingRequirement(_) | Error::MalformedName(_) => None,
        }
    }
}

/// Parse a class name given in either internal (`com/acme/Widget`) or source (`com.acme.Widget`)
/// form
pub fn class_name(name: &str) -> Result<BinaryName, Error> {
    BinaryName::from_source_name(name).map_err(Error::MalformedName)
}
