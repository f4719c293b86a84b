use std::path::PathBuf;

use pdfmark_core::ParseError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::PdfError;

/// A terminal pipeline failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Cannot read {}: {source}", path.display())]
    DocumentRead {
        path: PathBuf,
        #[source]
        source: PdfError,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("Cannot read {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    #[error("{0}")]
    NoResult(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Error taxonomy reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "DocumentReadError")]
    DocumentRead,
    #[serde(rename = "ConfigError")]
    Config,
    #[serde(rename = "WriteError")]
    Write,
    #[serde(rename = "ParseError")]
    Parse,
    /// The run finished without anything to write.
    #[serde(rename = "NoResultError")]
    NoResult,
    #[serde(rename = "CancelledError")]
    Cancelled,
}

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Config(message.into())
    }

    pub fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        EngineError::Write {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::DocumentRead { .. } => ErrorKind::DocumentRead,
            // A bookmark or Markdown file that cannot be read is a bad argument.
            EngineError::Config(_) | EngineError::SourceUnreadable { .. } => ErrorKind::Config,
            EngineError::Parse { .. } => ErrorKind::Parse,
            EngineError::Write { .. } => ErrorKind::Write,
            EngineError::NoResult(_) => ErrorKind::NoResult,
            EngineError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn to_failure(&self) -> Failure {
        Failure {
            error_kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// The serializable form of an [`EngineError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub error_kind: ErrorKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_shape() {
        let failure = EngineError::config("no bookmark file given").to_failure();
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["errorKind"], "ConfigError");
        assert_eq!(json["message"], "Invalid configuration: no bookmark file given");
    }

    #[test]
    fn test_kinds() {
        let read = EngineError::DocumentRead {
            path: "in.pdf".into(),
            source: PdfError::Encrypted,
        };
        assert_eq!(read.kind(), ErrorKind::DocumentRead);
        assert_eq!(read.to_string(), "Cannot read in.pdf: Document is encrypted");

        let missing = EngineError::SourceUnreadable {
            path: "toc.txt".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(missing.kind(), ErrorKind::Config);
        assert_eq!(EngineError::write("out.pdf", "disk full").kind(), ErrorKind::Write);
    }

    #[test]
    fn test_no_result_failure() {
        let failure = EngineError::NoResult("No headings found".into()).to_failure();
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["errorKind"], "NoResultError");
        assert_eq!(json["message"], "No headings found");
    }
}
