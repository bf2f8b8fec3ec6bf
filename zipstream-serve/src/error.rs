//! Error types for archive delivery

use thiserror::Error;

/// Errors raised while fetching payloads and emitting archive bytes.
#[derive(Debug, Error)]
pub enum Error {
    /// The upstream returned a non-success status for a member payload.
    #[error("upstream fetch for {uri} failed with status {status}")]
    UpstreamFailed {
        /// Source URI of the member being fetched.
        uri: String,
        /// HTTP status code the upstream answered with.
        status: u16,
    },

    /// The upstream body did not match the declared member size.
    #[error("upstream payload for {uri} was {actual} bytes, {declared} declared")]
    SizeMismatch {
        /// Source URI of the member being fetched.
        uri: String,
        /// Size declared in the member list.
        declared: u64,
        /// Bytes the upstream actually delivered.
        actual: u64,
    },

    /// A member URI could not be turned into a fetchable request.
    #[error("invalid member uri: {0}")]
    InvalidUri(String),

    /// The emitter already terminated abnormally; no further bytes exist.
    #[error("emission already terminated")]
    Aborted,

    /// Member-list or layout failure from the format layer.
    #[error(transparent)]
    Format(#[from] zipstream_format::Error),

    /// HTTP transport failure.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O failure while writing archive bytes out.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for delivery operations.
pub type Result<T> = std::result::Result<T, Error>;
