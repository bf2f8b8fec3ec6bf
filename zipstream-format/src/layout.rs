//! Archive layout planning
//!
//! Computes a byte-accurate plan of the archive before any payload is
//! available: every local header, data region, optional data descriptor
//! and the central directory become [`Piece`]s with absolute `[start, end)`
//! ranges. Pieces are contiguous and gapless by construction; their union
//! is exactly `[0, archive_size)`.

use time::OffsetDateTime;
use tracing::debug;

use crate::error::{Error, Result};
use crate::member::{Member, MemberList};
use crate::records::{
    CENTRAL_FILE_HEADER_LEN, DATA_DESCRIPTOR_LEN, DATA_DESCRIPTOR_ZIP64_LEN, EOCD_LEN,
    EXTRA_TIMESTAMP_CENTRAL_LEN, EXTRA_TIMESTAMP_LOCAL_LEN, EXTRA_UNICODE_PATH_FIXED_LEN,
    EXTRA_ZIP64_OFFSET_LEN, EXTRA_ZIP64_SIZES_LEN, EXTRA_ZIP64_SIZES_OFFSET_LEN,
    LOCAL_FILE_HEADER_LEN, ZIP64_EOCD_LEN, ZIP64_EOCD_LOCATOR_LEN, ZIP64_SENTINEL_U16,
    ZIP64_SENTINEL_U32, dos_time,
};

/// What a piece's bytes are made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceKind {
    /// Local file header, name and extra fields.
    Header,
    /// The member's payload, fetched lazily.
    Data,
    /// Trailing data descriptor for a deferred CRC.
    Trailer,
    /// Central directory entries, Zip64 records and the EOCD.
    CentralDirectory,
}

/// One contiguous region of archive output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    /// Region kind.
    pub kind: PieceKind,
    /// Index of the owning member; `None` for the central directory.
    pub member: Option<usize>,
    /// Absolute start offset, inclusive.
    pub start: u64,
    /// Absolute end offset, exclusive.
    pub end: u64,
}

impl Piece {
    /// Byte length of the piece.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// A directory's data piece spans zero bytes; that is legal.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// The fully planned archive: members, pieces and aggregate sizes.
///
/// Immutable after planning, except for member CRC fields which are
/// resolved while payloads stream through.
#[derive(Debug)]
pub struct Layout {
    /// Members in declaration order, annotated with offsets and flags.
    pub members: Vec<Member>,
    /// Pieces in ascending, contiguous order.
    pub pieces: Vec<Piece>,
    /// Total archive size in bytes.
    pub archive_size: u64,
    /// Absolute offset of the central directory piece.
    pub cd_offset: u64,
    /// Size of the central directory entries alone, without the EOCD or
    /// Zip64 records.
    pub cd_entries_size: u64,
    /// Zip64 records are in effect somewhere in the archive.
    pub zip64: bool,
    /// At least one member's CRC is deferred to a data descriptor.
    pub missing_crc32: bool,
}

impl Layout {
    /// Plan the archive with the current time as the write timestamp.
    pub fn plan(list: MemberList) -> Result<Self> {
        Self::plan_at(list, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Plan the archive with an explicit write timestamp. One timestamp is
    /// shared by all members of the archive.
    pub fn plan_at(list: MemberList, unix_time: i64) -> Result<Self> {
        let MemberList {
            mut members,
            missing_crc32,
        } = list;

        let dos = dos_time(unix_time);
        let unix = unix_time.clamp(0, i64::from(u32::MAX)) as u32;

        let mut pieces = Vec::with_capacity(members.len() * 3 + 1);
        let mut offset: u64 = 0;
        let mut cd_entries_size: u64 = 0;
        let mut zip64 = false;

        for (index, member) in members.iter_mut().enumerate() {
            check_name_lengths(member)?;

            member.offset = offset;
            member.dos_time = dos;
            member.unix_time = unix;

            if offset >= u64::from(ZIP64_SENTINEL_U32) {
                member.need_zip64_offset = true;
                zip64 = true;
            }
            if member.size >= u64::from(ZIP64_SENTINEL_U32) {
                member.need_zip64 = true;
                zip64 = true;
            }

            cd_entries_size += central_entry_len(member);

            let header_end = offset + local_header_len(member);
            pieces.push(Piece {
                kind: PieceKind::Header,
                member: Some(index),
                start: offset,
                end: header_end,
            });
            offset = header_end;

            let data_end = offset + member.size;
            pieces.push(Piece {
                kind: PieceKind::Data,
                member: Some(index),
                start: offset,
                end: data_end,
            });
            offset = data_end;

            if member.missing_crc32 {
                let trailer_end = offset
                    + if member.need_zip64 {
                        DATA_DESCRIPTOR_ZIP64_LEN
                    } else {
                        DATA_DESCRIPTOR_LEN
                    };
                pieces.push(Piece {
                    kind: PieceKind::Trailer,
                    member: Some(index),
                    start: offset,
                    end: trailer_end,
                });
                offset = trailer_end;
            }
        }

        zip64 |= offset >= u64::from(ZIP64_SENTINEL_U32)
            || members.len() >= usize::from(ZIP64_SENTINEL_U16);

        let mut cd_size = cd_entries_size + EOCD_LEN;
        if zip64 {
            cd_size += ZIP64_EOCD_LEN + ZIP64_EOCD_LOCATOR_LEN;
        }

        let cd_offset = offset;
        let archive_size = offset + cd_size;
        pieces.push(Piece {
            kind: PieceKind::CentralDirectory,
            member: None,
            start: cd_offset,
            end: archive_size,
        });

        debug!(
            members = members.len(),
            pieces = pieces.len(),
            archive_size,
            zip64,
            "planned archive layout"
        );

        Ok(Self {
            members,
            pieces,
            archive_size,
            cd_offset,
            cd_entries_size,
            zip64,
            missing_crc32,
        })
    }
}

/// Exact length of a member's local header piece: fixed header, name,
/// extended timestamp, plus Zip64 and Unicode-path extras when present.
pub(crate) fn local_header_len(member: &Member) -> u64 {
    LOCAL_FILE_HEADER_LEN
        + member.filename.len() as u64
        + EXTRA_TIMESTAMP_LOCAL_LEN
        + if member.need_zip64 {
            EXTRA_ZIP64_SIZES_LEN
        } else {
            0
        }
        + unicode_path_len(member)
}

/// Exact length of a member's central directory entry.
pub(crate) fn central_entry_len(member: &Member) -> u64 {
    CENTRAL_FILE_HEADER_LEN
        + member.filename.len() as u64
        + EXTRA_TIMESTAMP_CENTRAL_LEN
        + match (member.need_zip64_offset, member.need_zip64) {
            (true, true) => EXTRA_ZIP64_SIZES_OFFSET_LEN,
            (true, false) => EXTRA_ZIP64_OFFSET_LEN,
            (false, true) => EXTRA_ZIP64_SIZES_LEN,
            (false, false) => 0,
        }
        + unicode_path_len(member)
}

pub(crate) fn unicode_path_len(member: &Member) -> u64 {
    member
        .filename_utf8
        .as_ref()
        .map_or(0, |name| EXTRA_UNICODE_PATH_FIXED_LEN + name.len() as u64)
}

fn check_name_lengths(member: &Member) -> Result<()> {
    if member.filename.len() > usize::from(u16::MAX) {
        return Err(Error::FilenameTooLong {
            len: member.filename.len(),
        });
    }
    if let Some(name) = &member.filename_utf8 {
        // The whole extra-field block shares one 16-bit length field.
        let extras = EXTRA_TIMESTAMP_LOCAL_LEN
            + EXTRA_ZIP64_SIZES_LEN
            + EXTRA_UNICODE_PATH_FIXED_LEN
            + name.len() as u64;
        if extras > u64::from(u16::MAX) {
            return Err(Error::FilenameTooLong { len: name.len() });
        }
    }
    Ok(())
}
