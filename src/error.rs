//! Crate-wide error type.
//!
//! Every failure carries one of four kinds so callers can react or translate
//! to language-native exceptions: I/O trouble from the pull source, a grammar
//! violation in the input, an invalid argument, or a failure reported by a
//! user callback. Parse errors are never recoverable in place; after an error
//! the reader should be discarded.

use std::io;

/// Errors produced while reading mmCIF or BinaryCIF data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pull source failed, or ended before a promised span was delivered.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input violates the mmCIF or BinaryCIF grammar. Text-mode messages
    /// name the 1-based line where the problem was found.
    #[error("{0}")]
    FileFormat(String),

    /// An invalid argument reached the reader or one of its helpers.
    #[error("invalid value: {0}")]
    Value(String),

    /// A user callback reported failure; the message passes through untouched.
    #[error("{0}")]
    Callback(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "short read").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("short read"));
    }

    #[test]
    fn format_errors_display_verbatim() {
        let err = Error::FileFormat("Single-quoted string not terminated in file, line 3".into());
        assert_eq!(
            err.to_string(),
            "Single-quoted string not terminated in file, line 3"
        );
    }
}
