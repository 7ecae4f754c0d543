//! Error types for the conversion pipeline.
//!
//! Every variant is a render failure from the caller's point of view; the
//! `Display` text is the engine message shown after the CLI's fixed prefix.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning HTML into PDF bytes.
#[derive(Error, Debug)]
pub enum Error {
    /// The input could not be accepted as an HTML document.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The layout solver rejected the box tree.
    #[error("layout failed: {0}")]
    Layout(String),

    /// The PDF writer did not produce a usable document.
    #[error("PDF serialization failed: {0}")]
    Pdf(String),

    /// Reading the input or writing the output failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<taffy::TaffyError> for Error {
    fn from(err: taffy::TaffyError) -> Self {
        Error::Layout(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::InvalidInput(format!("input is not UTF-8 text ({err})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_single_line() {
        let bad = String::from_utf8(vec![0x66, 0xff, 0x6f]).unwrap_err();
        let err = Error::from(bad);
        let msg = err.to_string();
        assert!(msg.starts_with("invalid input:"), "{msg}");
        assert!(!msg.contains('\n'));
    }
}
