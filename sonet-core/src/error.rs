use std::fmt;

use serde::{Deserialize, Serialize};

/// What went wrong. Whether an error aborts execution depends only on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    StackOverflow,
    OutOfMemory,
    UndefinedFunction,
    FileNotFound,
    InvalidHandle,
    InvalidArgument,
    IndexOutOfRange,
    UndefinedVariable,
    DivisionByZero,
    Io,
    Audio,
}

impl ErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::StackOverflow | ErrorKind::OutOfMemory | ErrorKind::UndefinedFunction
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::StackOverflow => "stack overflow",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::UndefinedFunction => "undefined function",
            ErrorKind::FileNotFound => "file not found",
            ErrorKind::InvalidHandle => "invalid handle",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::IndexOutOfRange => "index out of range",
            ErrorKind::UndefinedVariable => "undefined variable",
            ErrorKind::DivisionByZero => "division by zero",
            ErrorKind::Io => "i/o error",
            ErrorKind::Audio => "audio error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}", file, self.line),
            None => write!(f, "line {}", self.line),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone)]
#[error("{kind}: {message}{}", .location.as_ref().map(|l| format!(" (at {l})")).unwrap_or_default())]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    /// Attach a location unless a deeper frame already did.
    pub fn at(mut self, location: Option<SourceLocation>) -> Self {
        if self.location.is_none() {
            self.location = location;
        }
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn undefined_function(name: &str) -> Self {
        Self::new(ErrorKind::UndefinedFunction, format!("`{name}` is not defined"))
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::OutOfMemory => ErrorKind::OutOfMemory,
            _ => ErrorKind::Io,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<crate::script::array::GrowError> for RuntimeError {
    fn from(e: crate::script::array::GrowError) -> Self {
        Self::new(ErrorKind::OutOfMemory, e.to_string())
    }
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_follows_kind() {
        assert!(RuntimeError::new(ErrorKind::StackOverflow, "x").is_fatal());
        assert!(RuntimeError::undefined_function("foo").is_fatal());
        assert!(!RuntimeError::new(ErrorKind::FileNotFound, "x").is_fatal());
        assert!(!RuntimeError::new(ErrorKind::DivisionByZero, "x").is_fatal());
    }

    #[test]
    fn display_includes_location() {
        let e = RuntimeError::invalid_argument("bad").at(Some(SourceLocation {
            file: Some("main.tfy".into()),
            line: 12,
        }));
        assert_eq!(e.to_string(), "invalid argument: bad (at main.tfy:12)");

        // the innermost location wins
        let e = e.at(Some(SourceLocation { file: None, line: 1 }));
        assert_eq!(e.location.unwrap().line, 12);
    }

    #[test]
    fn io_not_found_maps_to_file_not_found() {
        let e: RuntimeError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert_eq!(e.kind, ErrorKind::FileNotFound);
    }
}
