//! ZIP record constants
//!
//! Fixed record sizes, signatures, flag bits and extra-field tags per the
//! ZIP/Zip64 APPNOTE layout. All multi-byte fields are little-endian on
//! the wire regardless of host byte order.

use time::OffsetDateTime;

/// Local file header signature (`PK\x03\x04`).
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4B50;
/// Data descriptor signature (`PK\x07\x08`).
pub const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4B50;
/// Central directory file header signature (`PK\x01\x02`).
pub const CENTRAL_FILE_HEADER_SIG: u32 = 0x0201_4B50;
/// End of central directory signature (`PK\x05\x06`).
pub const EOCD_SIG: u32 = 0x0605_4B50;
/// Zip64 end of central directory signature (`PK\x06\x06`).
pub const ZIP64_EOCD_SIG: u32 = 0x0606_4B50;
/// Zip64 end of central directory locator signature (`PK\x06\x07`).
pub const ZIP64_EOCD_LOCATOR_SIG: u32 = 0x0706_4B50;

/// Fixed size of a local file header, before name and extras.
pub const LOCAL_FILE_HEADER_LEN: u64 = 30;
/// Fixed size of a central directory file header, before name and extras.
pub const CENTRAL_FILE_HEADER_LEN: u64 = 46;
/// Fixed size of the classic end-of-central-directory record.
pub const EOCD_LEN: u64 = 22;
/// Fixed size of the Zip64 end-of-central-directory record.
pub const ZIP64_EOCD_LEN: u64 = 56;
/// Fixed size of the Zip64 end-of-central-directory locator.
pub const ZIP64_EOCD_LOCATOR_LEN: u64 = 20;
/// Data descriptor with 32-bit size fields.
pub const DATA_DESCRIPTOR_LEN: u64 = 16;
/// Data descriptor with 64-bit size fields.
pub const DATA_DESCRIPTOR_ZIP64_LEN: u64 = 24;

/// Extended-timestamp extra field, local variant (mtime + atime).
pub const EXTRA_TIMESTAMP_LOCAL_LEN: u64 = 13;
/// Extended-timestamp extra field, central variant (mtime only).
pub const EXTRA_TIMESTAMP_CENTRAL_LEN: u64 = 9;
/// Zip64 extra field carrying uncompressed + compressed sizes.
pub const EXTRA_ZIP64_SIZES_LEN: u64 = 20;
/// Zip64 extra field carrying the local-header offset only.
pub const EXTRA_ZIP64_OFFSET_LEN: u64 = 12;
/// Zip64 extra field carrying sizes and the local-header offset.
pub const EXTRA_ZIP64_SIZES_OFFSET_LEN: u64 = 28;
/// Unicode-path extra field, before the UTF-8 name bytes.
pub const EXTRA_UNICODE_PATH_FIXED_LEN: u64 = 9;

/// Extended-timestamp extra field tag ("UT").
pub const EXTRA_TIMESTAMP_TAG: u16 = 0x5455;
/// Zip64 extended-information extra field tag.
pub const EXTRA_ZIP64_TAG: u16 = 0x0001;
/// Info-ZIP Unicode path extra field tag ("up").
pub const EXTRA_UNICODE_PATH_TAG: u16 = 0x7075;
/// Extended-timestamp info bits: mtime and atime present.
pub const EXTRA_TIMESTAMP_INFO: u8 = 0x03;

/// Version needed to extract, stored entries.
pub const VERSION_DEFAULT: u16 = 10;
/// Version needed to extract when Zip64 fields are in play.
pub const VERSION_ZIP64: u16 = 45;
/// General-purpose flag: the name field is UTF-8.
pub const FLAG_UTF8_NAME: u16 = 0x0800;
/// General-purpose flag: CRC and sizes follow in a data descriptor.
pub const FLAG_MISSING_CRC32: u16 = 0x0008;
/// Compression method 0, stored.
pub const METHOD_STORED: u16 = 0;
/// External attributes for every entry (regular file, rw-r--r--).
pub const EXTERNAL_ATTRS_DEFAULT: u32 = 0x081a_4000;

/// 32-bit field value signalling "real value is in a Zip64 extra field".
pub const ZIP64_SENTINEL_U32: u32 = 0xFFFF_FFFF;
/// 16-bit count value signalling "real count is in the Zip64 EOCD".
pub const ZIP64_SENTINEL_U16: u16 = 0xFFFF;

/// Pack a unix timestamp into MS-DOS date/time format.
///
/// Two-second resolution; timestamps before the DOS epoch clamp to
/// 1980-01-01 00:00:00.
pub fn dos_time(unix_time: i64) -> u32 {
    let Ok(t) = OffsetDateTime::from_unix_timestamp(unix_time) else {
        return 1 << 21 | 1 << 16;
    };
    if t.year() < 1980 {
        return 1 << 21 | 1 << 16;
    }

    (u32::from(t.second()) >> 1)
        | (u32::from(t.minute()) << 5)
        | (u32::from(t.hour()) << 11)
        | (u32::from(t.day()) << 16)
        | ((u8::from(t.month()) as u32) << 21)
        | (((t.year() as u32) - 1980) << 25)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dos_time_known_value() {
        // 2024-03-15 12:34:56 UTC
        let dos = dos_time(1_710_506_096);
        assert_eq!(dos >> 25, 2024 - 1980);
        assert_eq!((dos >> 21) & 0x0F, 3);
        assert_eq!((dos >> 16) & 0x1F, 15);
        assert_eq!((dos >> 11) & 0x1F, 12);
        assert_eq!((dos >> 5) & 0x3F, 34);
        assert_eq!((dos & 0x1F) << 1, 56);
    }

    #[test]
    fn test_dos_time_clamps_before_epoch() {
        assert_eq!(dos_time(0), 1 << 21 | 1 << 16);
        assert_eq!(dos_time(i64::MIN), 1 << 21 | 1 << 16);
    }
}
