use std::fmt;

/// Coarse error classification, mirrored onto the wire-level error types the
/// REST surface reports (`parsing_exception`, `validation_exception`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request body or bulk metadata line.
    Parsing,
    /// Value cannot be coerced to its mapped type, or a retype was attempted.
    Validation,
    /// Internal invariant breach (out-of-range shard id, corrupt state).
    Runtime,
    /// Document with the requested ID is not present in any second-tier shard.
    IdNotFound,
    /// Underlying storage or I/O failure.
    Io,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into() }
    }

    pub fn parsing(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Parsing, context)
    }

    pub fn validation(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Validation, context)
    }

    pub fn runtime(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Runtime, context)
    }

    pub fn id_not_found(id: &str) -> Self {
        Error::new(ErrorKind::IdNotFound, format!("document [{id}] not found"))
    }

    pub fn is_id_not_found(&self) -> bool {
        self.kind == ErrorKind::IdNotFound
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Parsing, err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::new(ErrorKind::Parsing, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
