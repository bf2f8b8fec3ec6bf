//! Archive member descriptors
//!
//! A [`Member`] is one entry (file or pseudo-directory) destined for the
//! archive. Members are created by the member-list parser in declaration
//! order, annotated by the layout planner (offsets, Zip64 flags,
//! timestamps), and have their CRC filled in during emission when it was
//! not supplied up front.

/// URI token that marks a pseudo-directory entry.
pub const DIRECTORY_TOKEN: &[u8] = b"@directory";

/// One entry to include in the archive.
#[derive(Debug, Clone, Default)]
pub struct Member {
    /// Source locator for the payload fetch; empty for directories.
    pub uri: Vec<u8>,
    /// Query-equivalent arguments passed through to the fetch, undecoded.
    pub args: Vec<u8>,
    /// Name bytes exactly as they will appear in the ZIP name field.
    pub filename: Vec<u8>,
    /// Alternate Unicode form of the name, when `filename` holds a
    /// native-charset substitution. Rendered as a Unicode-path extra field.
    pub filename_utf8: Option<String>,
    /// Declared payload length in bytes; 0 for directories.
    pub size: u64,
    /// CRC-32 of the payload. When `missing_crc32` is set this holds the
    /// accumulator's running value until the payload has streamed through.
    pub crc32: u32,
    /// CRC was not supplied and must be computed on the fly; the final
    /// value is carried in a trailing data descriptor.
    pub missing_crc32: bool,
    /// Pseudo-directory entry: no payload is ever fetched for it.
    pub is_directory: bool,

    /// Absolute offset of this member's local file header.
    pub offset: u64,
    /// DOS-format write timestamp, shared by all members of one archive.
    pub dos_time: u32,
    /// Unix write timestamp for the extended-timestamp extra fields.
    pub unix_time: u32,
    /// Size does not fit a 32-bit field; Zip64 extras carry the real value.
    pub need_zip64: bool,
    /// Local-header offset does not fit a 32-bit field.
    pub need_zip64_offset: bool,
}

impl Member {
    /// Whether a payload fetch must be issued for this member.
    pub fn has_payload(&self) -> bool {
        !self.is_directory && self.size > 0
    }
}

/// Ordered member sequence produced by the parser.
#[derive(Debug, Clone, Default)]
pub struct MemberList {
    /// Members in declaration order.
    pub members: Vec<Member>,
    /// At least one member has a deferred CRC-32.
    pub missing_crc32: bool,
}
