use std::io;

/// Errors produced while decoding, validating or re-encoding object files.
///
/// The parser never recovers from any of these: the first structural problem
/// aborts the whole parse.
#[derive(thiserror::Error, Debug)]
pub enum ElfError {
    /// Bad magic, unknown class/encoding, or a table that contradicts itself.
    #[error("format error: {0}")]
    Format(String),

    /// The input ends before a declared region does.
    #[error("truncated {what}: needs {needed} bytes at offset {offset}, only {available} available")]
    Truncated {
        what: &'static str,
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// An untrusted size or count is larger than the configured ceiling.
    #[error("{what} exceeds limit: declared {declared}, ceiling is {limit}")]
    LimitExceeded {
        what: &'static str,
        declared: u64,
        limit: u64,
    },

    /// A transformer option or output value outside what is allowed.
    #[error("invalid value: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ElfError>;

impl ElfError {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Short category label, used by the CLI and in tests.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Format(_) => "FormatError",
            Self::Truncated { .. } => "TruncatedError",
            Self::LimitExceeded { .. } => "LimitExceededError",
            Self::Validation(_) => "ValidationError",
            Self::Io(_) => "IOError",
        }
    }
}

/// Converts a short read into a `Truncated` error for `what`.
///
/// Fixed-size reads go through here; anything else is passed on as `Io`.
pub(crate) fn short_read(what: &'static str, offset: u64, needed: u64, available: u64) -> impl FnOnce(io::Error) -> ElfError {
    move |err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ElfError::Truncated {
                what,
                offset,
                needed,
                available: available.saturating_sub(offset),
            }
        } else {
            ElfError::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_read_maps_eof_to_truncated() {
        let err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let mapped = short_read("section header", 100, 64, 120)(err);
        match mapped {
            ElfError::Truncated {
                what,
                offset,
                needed,
                available,
            } => {
                assert_eq!(what, "section header");
                assert_eq!(offset, 100);
                assert_eq!(needed, 64);
                assert_eq!(available, 20);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_io_errors_pass_through() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let mapped = short_read("header", 0, 16, 0)(err);
        assert_eq!(mapped.kind(), "IOError");
    }
}
