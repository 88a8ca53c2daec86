//! Purpose: Error model shared by the engine and the C boundary.
//! Exports: `Error`, `ErrorKind`, `Result`.
//! Role: Every fallible engine call returns `Result<T, Error>`; the boundary renders it as text.
//! Invariants: `Display` always starts with the kind label so the class survives as free text.
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    Construction,
    TypeMismatch,
    LengthMismatch,
    Compute,
    Unsupported,
    Corrupt,
    Io,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Internal => "Internal",
            ErrorKind::Usage => "Usage",
            ErrorKind::Construction => "Construction",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::LengthMismatch => "LengthMismatch",
            ErrorKind::Compute => "Compute",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::Corrupt => "Corrupt",
            ErrorKind::Io => "Io",
        }
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        Error::new(ErrorKind::TypeMismatch)
            .with_message(format!("expected {expected} but found {actual}"))
    }

    pub fn length_mismatch(expected: usize, actual: usize) -> Self {
        Error::new(ErrorKind::LengthMismatch).with_message(format!(
            "expected input array of size {expected} but received array of size {actual}"
        ))
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Error::new(ErrorKind::Unsupported).with_message(what)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.label())?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};

    #[test]
    fn display_leads_with_kind_label() {
        let err = Error::new(ErrorKind::Construction).with_message("invalid device string: 'gpu'");
        assert_eq!(err.to_string(), "Construction: invalid device string: 'gpu'");
    }

    #[test]
    fn display_without_message_is_just_the_label() {
        assert_eq!(Error::new(ErrorKind::Internal).to_string(), "Internal");
    }

    #[test]
    fn length_mismatch_names_both_sizes() {
        let err = Error::length_mismatch(2, 3);
        assert_eq!(err.kind(), ErrorKind::LengthMismatch);
        let text = err.to_string();
        assert!(text.contains("size 2"));
        assert!(text.contains("size 3"));
    }

    #[test]
    fn io_errors_carry_path_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::new(ErrorKind::Io)
            .with_message("failed to read tensor")
            .with_path("/tmp/missing.ctns")
            .with_source(io);
        let text = err.to_string();
        assert!(text.starts_with("Io: failed to read tensor"));
        assert!(text.contains("/tmp/missing.ctns"));
        assert!(text.ends_with("no such file"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
