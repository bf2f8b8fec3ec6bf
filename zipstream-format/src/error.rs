//! Error types for member-list parsing and archive layout

use thiserror::Error;

/// Result type for format operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing a member list or planning a layout
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The textual member list did not reach an accepting state
    #[error("malformed member list at byte {offset}")]
    MalformedMemberList {
        /// Byte offset of the offending input byte
        offset: usize,
    },

    /// A filename (or its Unicode alternate) does not fit the ZIP name field
    #[error("filename of {len} bytes exceeds the 16-bit ZIP name field")]
    FilenameTooLong { len: usize },

    /// The member list is empty; an archive needs at least one entry
    #[error("empty member list")]
    EmptyMemberList,
}
