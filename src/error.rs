use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by SMC and power source queries.
///
/// Nothing here is retried internally; a failed step aborts the query for
/// that key and the error is handed straight back to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// No matching service is registered with the kernel. On machines
    /// without an SMC (or when IOKit itself is unavailable) this is the
    /// first error a query can hit.
    #[error("SMC service is not available")]
    ServiceUnavailable,

    /// The service exists but refused the connection.
    #[error("SMC connection denied (kern_return {code:#010x})")]
    ConnectionDenied { code: i32 },

    /// The kernel extension reported a non-zero result for this key.
    /// Result 132 is the SMC's "key not found".
    #[error("SMC key {key:?} not recognized (result {result})")]
    UnknownKey { key: String, result: u8 },

    /// The structured call itself failed at the OS boundary.
    #[error("{operation} failed (kern_return {code:#010x})")]
    Transport { operation: &'static str, code: i32 },

    /// The value's four-character type tag has no known decoding.
    #[error("unsupported SMC data type {tag:?}")]
    UnsupportedType { tag: String },

    /// The value carries fewer bytes than its type tag requires.
    #[error("SMC value of type {tag:?} needs {expected} bytes, got {actual}")]
    TruncatedValue {
        tag: String,
        expected: usize,
        actual: usize,
    },

    /// SMC keys are exactly four ASCII characters.
    #[error("invalid SMC key {0:?}")]
    InvalidKey(String),

    /// The power source snapshot could not be obtained from the OS.
    #[error("power source information is not available")]
    PowerSourcesUnavailable,

    /// A power source description lacked one of the well-known fields.
    #[error("power source description missing {key:?}")]
    MissingDescriptionKey { key: &'static str },
}

impl Error {
    pub(crate) fn transport(operation: &'static str, code: i32) -> Self {
        Error::Transport { operation, code }
    }

    pub(crate) fn unknown_key(key: impl std::fmt::Display, result: u8) -> Self {
        Error::UnknownKey { key: key.to_string(), result }
    }

    pub(crate) fn unsupported_type(tag: impl std::fmt::Display) -> Self {
        Error::UnsupportedType { tag: tag.to_string() }
    }

    pub(crate) fn truncated(tag: impl std::fmt::Display, expected: usize, actual: usize) -> Self {
        Error::TruncatedValue { tag: tag.to_string(), expected, actual }
    }
}
