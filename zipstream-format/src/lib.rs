//! # zipstream-format
//!
//! Byte-accurate planning and rendering of streamed ZIP archives.
//!
//! An archive is described up front by a plain-text member list (one line
//! per entry: CRC-32 or `-`, size, source URI, archive filename). From
//! that list the planner computes the position and length of every region
//! of the final archive before any payload byte exists, so the total
//! size, and any byte subrange, is known in advance. Payloads are stored
//! uncompressed; when a member's CRC is not supplied it is computed while
//! the payload streams through and emitted in a trailing data descriptor.
//!
//! ## Member List Format
//!
//! ```text
//! 1a2b3c4d 1024 /files/report.pdf?v=3 report.pdf
//! - 52428800 /files/video.mp4 holiday/video.mp4
//! 0 0 @directory holiday/
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use zipstream_format::{Layout, parse_member_list, render_piece, PieceKind};
//!
//! let list = parse_member_list(b"1a2b3c4d 5 /hello.txt hello.txt\n")?;
//! let layout = Layout::plan(list)?;
//!
//! assert_eq!(layout.pieces.len(), 3);
//! for piece in &layout.pieces {
//!     if piece.kind != PieceKind::Data {
//!         let bytes = render_piece(&layout, piece);
//!         assert_eq!(bytes.len() as u64, piece.len());
//!     }
//! }
//! # Ok::<(), zipstream_format::Error>(())
//! ```

pub mod crc;
pub mod error;
pub mod layout;
pub mod member;
pub mod parse;
pub mod records;
pub mod render;

pub use crc::CrcAccumulator;
pub use error::{Error, Result};
pub use layout::{Layout, Piece, PieceKind};
pub use member::{DIRECTORY_TOKEN, Member, MemberList};
pub use parse::parse_member_list;
pub use render::{central_directory, data_descriptor, local_file_header, render_piece};
