//! Chunk rendering
//!
//! Synthesizes the exact bytes of every non-payload region of the archive:
//! local file headers with their extra fields, data descriptors, central
//! directory entries, Zip64 EOCD records and the classic EOCD. All fields
//! are written little-endian, field by field; a rendered piece is always
//! exactly as long as the layout planner said it would be.

use bytes::{BufMut, Bytes, BytesMut};

use crate::layout::{Layout, Piece, PieceKind, central_entry_len, local_header_len, unicode_path_len};
use crate::member::Member;
use crate::records::{
    CENTRAL_FILE_HEADER_SIG, DATA_DESCRIPTOR_LEN, DATA_DESCRIPTOR_SIG, DATA_DESCRIPTOR_ZIP64_LEN,
    EOCD_SIG, EXTERNAL_ATTRS_DEFAULT, EXTRA_TIMESTAMP_CENTRAL_LEN, EXTRA_TIMESTAMP_INFO,
    EXTRA_TIMESTAMP_LOCAL_LEN, EXTRA_TIMESTAMP_TAG, EXTRA_UNICODE_PATH_TAG, EXTRA_ZIP64_OFFSET_LEN,
    EXTRA_ZIP64_SIZES_LEN, EXTRA_ZIP64_SIZES_OFFSET_LEN, EXTRA_ZIP64_TAG, FLAG_MISSING_CRC32,
    FLAG_UTF8_NAME, LOCAL_FILE_HEADER_SIG, METHOD_STORED, VERSION_DEFAULT, VERSION_ZIP64,
    ZIP64_EOCD_LOCATOR_SIG, ZIP64_EOCD_SIG, ZIP64_SENTINEL_U16, ZIP64_SENTINEL_U32,
};

/// Render the bytes of a synthetic (non-data) piece.
///
/// Data pieces carry payload bytes resolved elsewhere; asking for one
/// yields an empty buffer.
pub fn render_piece(layout: &Layout, piece: &Piece) -> Bytes {
    match piece.kind {
        PieceKind::Header => piece
            .member
            .map_or_else(Bytes::new, |i| local_file_header(&layout.members[i])),
        PieceKind::Trailer => piece
            .member
            .map_or_else(Bytes::new, |i| data_descriptor(&layout.members[i])),
        PieceKind::CentralDirectory => central_directory(layout),
        PieceKind::Data => {
            debug_assert!(false, "data pieces are not rendered");
            Bytes::new()
        }
    }
}

/// General-purpose flag bits for a member.
///
/// The UTF-8 name bit is set unless a native-charset name was substituted
/// (in which case the Unicode-path extra carries the UTF-8 form).
fn member_flags(member: &Member, include_missing_crc: bool) -> u16 {
    let mut flags = 0;
    if member.filename_utf8.is_none() {
        flags |= FLAG_UTF8_NAME;
    }
    if include_missing_crc && member.missing_crc32 {
        flags |= FLAG_MISSING_CRC32;
    }
    flags
}

/// Local file header record: fixed header, filename, extended timestamp,
/// then Zip64 sizes and Unicode-path extras when applicable.
///
/// To appease all ZIP software, the header carries the file sizes even
/// when the missing-CRC flag bit says all three fields could be zeroed.
pub fn local_file_header(member: &Member) -> Bytes {
    let len = local_header_len(member) as usize;
    let mut buf = BytesMut::with_capacity(len);

    let extra_len = EXTRA_TIMESTAMP_LOCAL_LEN
        + if member.need_zip64 {
            EXTRA_ZIP64_SIZES_LEN
        } else {
            0
        }
        + unicode_path_len(member);

    buf.put_u32_le(LOCAL_FILE_HEADER_SIG);
    buf.put_u16_le(if member.need_zip64 {
        VERSION_ZIP64
    } else {
        VERSION_DEFAULT
    });
    buf.put_u16_le(member_flags(member, true));
    buf.put_u16_le(METHOD_STORED);
    buf.put_u32_le(member.dos_time);
    buf.put_u32_le(if member.missing_crc32 { 0 } else { member.crc32 });
    if member.need_zip64 {
        buf.put_u32_le(ZIP64_SENTINEL_U32);
        buf.put_u32_le(ZIP64_SENTINEL_U32);
    } else {
        buf.put_u32_le(member.size as u32);
        buf.put_u32_le(member.size as u32);
    }
    buf.put_u16_le(member.filename.len() as u16);
    buf.put_u16_le(extra_len as u16);
    buf.put_slice(&member.filename);

    put_timestamp_local(&mut buf, member);
    if member.need_zip64 {
        put_zip64_sizes(&mut buf, member);
    }
    put_unicode_path(&mut buf, member);

    debug_assert_eq!(buf.len(), len);
    buf.freeze()
}

/// Data descriptor following a member whose CRC was deferred; 32- or
/// 64-bit size fields per the member's Zip64 need.
pub fn data_descriptor(member: &Member) -> Bytes {
    let len = if member.need_zip64 {
        DATA_DESCRIPTOR_ZIP64_LEN as usize
    } else {
        DATA_DESCRIPTOR_LEN as usize
    };
    let mut buf = BytesMut::with_capacity(len);

    buf.put_u32_le(DATA_DESCRIPTOR_SIG);
    buf.put_u32_le(member.crc32);
    if member.need_zip64 {
        buf.put_u64_le(member.size);
        buf.put_u64_le(member.size);
    } else {
        buf.put_u32_le(member.size as u32);
        buf.put_u32_le(member.size as u32);
    }

    debug_assert_eq!(buf.len(), len);
    buf.freeze()
}

/// The whole archive footer: one central directory entry per member, the
/// Zip64 EOCD record and locator when Zip64 is in effect, then the
/// classic EOCD.
pub fn central_directory(layout: &Layout) -> Bytes {
    let len = (layout.archive_size - layout.cd_offset) as usize;
    let mut buf = BytesMut::with_capacity(len);

    for member in &layout.members {
        put_central_entry(&mut buf, member);
    }

    let entries = layout.members.len() as u64;

    if layout.zip64 {
        buf.put_u32_le(ZIP64_EOCD_SIG);
        // Record size excludes the signature and the size field itself.
        buf.put_u64_le(44);
        buf.put_u16_le(VERSION_ZIP64);
        buf.put_u16_le(VERSION_ZIP64);
        buf.put_u32_le(0); // this disk
        buf.put_u32_le(0); // disk with central directory start
        buf.put_u64_le(entries);
        buf.put_u64_le(entries);
        buf.put_u64_le(layout.cd_entries_size);
        buf.put_u64_le(layout.cd_offset);

        buf.put_u32_le(ZIP64_EOCD_LOCATOR_SIG);
        buf.put_u32_le(0); // disk with the Zip64 EOCD
        buf.put_u64_le(layout.cd_offset + layout.cd_entries_size);
        buf.put_u32_le(1); // total disks
    }

    buf.put_u32_le(EOCD_SIG);
    buf.put_u16_le(0); // this disk
    buf.put_u16_le(0); // disk with central directory start
    let entries16 = if entries < u64::from(ZIP64_SENTINEL_U16) {
        entries as u16
    } else {
        ZIP64_SENTINEL_U16
    };
    buf.put_u16_le(entries16);
    buf.put_u16_le(entries16);
    buf.put_u32_le(if layout.cd_entries_size < u64::from(ZIP64_SENTINEL_U32) {
        layout.cd_entries_size as u32
    } else {
        ZIP64_SENTINEL_U32
    });
    buf.put_u32_le(if layout.cd_offset < u64::from(ZIP64_SENTINEL_U32) {
        layout.cd_offset as u32
    } else {
        ZIP64_SENTINEL_U32
    });
    buf.put_u16_le(0); // comment length

    debug_assert_eq!(buf.len(), len);
    buf.freeze()
}

fn put_central_entry(buf: &mut BytesMut, member: &Member) {
    let start = buf.len();

    let zip64_extra_len = match (member.need_zip64_offset, member.need_zip64) {
        (true, true) => EXTRA_ZIP64_SIZES_OFFSET_LEN,
        (true, false) => EXTRA_ZIP64_OFFSET_LEN,
        (false, true) => EXTRA_ZIP64_SIZES_LEN,
        (false, false) => 0,
    };
    let extra_len = EXTRA_TIMESTAMP_CENTRAL_LEN + zip64_extra_len + unicode_path_len(member);

    buf.put_u32_le(CENTRAL_FILE_HEADER_SIG);
    buf.put_u16_le(VERSION_ZIP64); // version made by
    buf.put_u16_le(if member.need_zip64 {
        VERSION_ZIP64
    } else {
        VERSION_DEFAULT
    });
    // By central-directory time the CRC is known, so the missing-CRC bit
    // is cleared here even when the local header carried it.
    buf.put_u16_le(member_flags(member, false));
    buf.put_u16_le(METHOD_STORED);
    buf.put_u32_le(member.dos_time);
    buf.put_u32_le(member.crc32);
    if member.need_zip64 {
        buf.put_u32_le(ZIP64_SENTINEL_U32);
        buf.put_u32_le(ZIP64_SENTINEL_U32);
    } else {
        buf.put_u32_le(member.size as u32);
        buf.put_u32_le(member.size as u32);
    }
    buf.put_u16_le(member.filename.len() as u16);
    buf.put_u16_le(extra_len as u16);
    buf.put_u16_le(0); // comment length
    buf.put_u16_le(0); // disk number start
    buf.put_u16_le(0); // internal attributes
    buf.put_u32_le(EXTERNAL_ATTRS_DEFAULT);
    buf.put_u32_le(if member.need_zip64_offset {
        ZIP64_SENTINEL_U32
    } else {
        member.offset as u32
    });
    buf.put_slice(&member.filename);

    // Central extended timestamp carries the mtime only.
    buf.put_u16_le(EXTRA_TIMESTAMP_TAG);
    buf.put_u16_le((EXTRA_TIMESTAMP_CENTRAL_LEN - 4) as u16);
    buf.put_u8(EXTRA_TIMESTAMP_INFO);
    buf.put_u32_le(member.unix_time);

    match (member.need_zip64_offset, member.need_zip64) {
        (true, true) => {
            buf.put_u16_le(EXTRA_ZIP64_TAG);
            buf.put_u16_le((EXTRA_ZIP64_SIZES_OFFSET_LEN - 4) as u16);
            buf.put_u64_le(member.size);
            buf.put_u64_le(member.size);
            buf.put_u64_le(member.offset);
        }
        (true, false) => {
            buf.put_u16_le(EXTRA_ZIP64_TAG);
            buf.put_u16_le((EXTRA_ZIP64_OFFSET_LEN - 4) as u16);
            buf.put_u64_le(member.offset);
        }
        (false, true) => put_zip64_sizes(buf, member),
        (false, false) => {}
    }

    put_unicode_path(buf, member);

    debug_assert_eq!(buf.len() - start, central_entry_len(member) as usize);
}

fn put_timestamp_local(buf: &mut BytesMut, member: &Member) {
    buf.put_u16_le(EXTRA_TIMESTAMP_TAG);
    buf.put_u16_le((EXTRA_TIMESTAMP_LOCAL_LEN - 4) as u16);
    buf.put_u8(EXTRA_TIMESTAMP_INFO);
    buf.put_u32_le(member.unix_time); // mtime
    buf.put_u32_le(member.unix_time); // atime
}

/// Zip64 sizes-only extra field. Uncompressed size precedes compressed
/// size in this record, unlike everywhere else in the format.
fn put_zip64_sizes(buf: &mut BytesMut, member: &Member) {
    buf.put_u16_le(EXTRA_ZIP64_TAG);
    buf.put_u16_le((EXTRA_ZIP64_SIZES_LEN - 4) as u16);
    buf.put_u64_le(member.size);
    buf.put_u64_le(member.size);
}

fn put_unicode_path(buf: &mut BytesMut, member: &Member) {
    if let Some(name) = &member.filename_utf8 {
        buf.put_u16_le(EXTRA_UNICODE_PATH_TAG);
        buf.put_u16_le((5 + name.len()) as u16);
        buf.put_u8(1); // version
        buf.put_u32_le(crc32fast::hash(name.as_bytes()));
        buf.put_slice(name.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layout;
    use crate::member::MemberList;
    use crate::parse::parse_member_list;
    use pretty_assertions::assert_eq;

    fn plan(input: &[u8]) -> Layout {
        Layout::plan_at(parse_member_list(input).unwrap(), 1_700_000_000).unwrap()
    }

    #[test]
    fn test_local_header_known_bytes() {
        let layout = plan(b"deadbeef 4 /a a\n");
        let header = local_file_header(&layout.members[0]);

        assert_eq!(header.len(), 30 + 1 + 13);
        assert_eq!(&header[0..4], b"PK\x03\x04");
        assert_eq!(u16::from_le_bytes([header[4], header[5]]), 10); // version
        assert_eq!(u16::from_le_bytes([header[6], header[7]]), 0x0800); // utf-8 flag
        assert_eq!(u16::from_le_bytes([header[8], header[9]]), 0); // stored
        assert_eq!(
            u32::from_le_bytes([header[14], header[15], header[16], header[17]]),
            0xdeadbeef
        );
        assert_eq!(
            u32::from_le_bytes([header[18], header[19], header[20], header[21]]),
            4
        );
        assert_eq!(u16::from_le_bytes([header[26], header[27]]), 1); // name len
        assert_eq!(u16::from_le_bytes([header[28], header[29]]), 13); // extra len
        assert_eq!(header[30], b'a');
        // Extended timestamp extra
        assert_eq!(&header[31..33], &0x5455u16.to_le_bytes());
        assert_eq!(&header[33..35], &9u16.to_le_bytes());
        assert_eq!(header[35], 0x03);
        assert_eq!(&header[36..40], &1_700_000_000u32.to_le_bytes());
        assert_eq!(&header[40..44], &1_700_000_000u32.to_le_bytes());
    }

    #[test]
    fn test_local_header_missing_crc_flag_and_zero_crc() {
        let layout = plan(b"- 4 /a a\n");
        let header = local_file_header(&layout.members[0]);

        assert_eq!(u16::from_le_bytes([header[6], header[7]]), 0x0800 | 0x0008);
        assert_eq!(&header[14..18], &[0, 0, 0, 0]);
        // Sizes stay populated even with the missing-CRC bit set.
        assert_eq!(
            u32::from_le_bytes([header[18], header[19], header[20], header[21]]),
            4
        );
    }

    #[test]
    fn test_local_header_zip64_sentinels_and_extra() {
        let list = MemberList {
            members: vec![crate::member::Member {
                uri: b"/big".to_vec(),
                filename: b"big".to_vec(),
                size: u64::from(u32::MAX),
                ..Default::default()
            }],
            missing_crc32: false,
        };
        let layout = Layout::plan_at(list, 1_700_000_000).unwrap();
        let header = local_file_header(&layout.members[0]);

        assert_eq!(u16::from_le_bytes([header[4], header[5]]), 45);
        assert_eq!(&header[18..22], &[0xFF; 4]);
        assert_eq!(&header[22..26], &[0xFF; 4]);
        // Zip64 extra follows the extended timestamp.
        let zip64 = &header[30 + 3 + 13..];
        assert_eq!(&zip64[0..2], &1u16.to_le_bytes());
        assert_eq!(&zip64[2..4], &16u16.to_le_bytes());
        assert_eq!(&zip64[4..12], &u64::from(u32::MAX).to_le_bytes());
        assert_eq!(&zip64[12..20], &u64::from(u32::MAX).to_le_bytes());
    }

    #[test]
    fn test_unicode_path_extra() {
        let mut list = parse_member_list(b"0 1 /a nai_ve.txt\n").unwrap();
        list.members[0].filename_utf8 = Some("naïve.txt".to_string());
        let layout = Layout::plan_at(list, 1_700_000_000).unwrap();
        let header = local_file_header(&layout.members[0]);

        let name = "naïve.txt".as_bytes();
        let tail = &header[header.len() - (9 + name.len())..];
        assert_eq!(&tail[0..2], &0x7075u16.to_le_bytes());
        assert_eq!(&tail[2..4], &((5 + name.len()) as u16).to_le_bytes());
        assert_eq!(tail[4], 1);
        assert_eq!(&tail[5..9], &crc32fast::hash(name).to_le_bytes());
        assert_eq!(&tail[9..], name);
        // Native name substituted, so the UTF-8 flag is clear.
        assert_eq!(u16::from_le_bytes([header[6], header[7]]) & 0x0800, 0);
    }

    #[test]
    fn test_data_descriptor_32_bit() {
        let mut layout = plan(b"- 5 /a a\n");
        layout.members[0].crc32 = 0x8587_D865;
        let descriptor = data_descriptor(&layout.members[0]);

        assert_eq!(descriptor.len(), 16);
        assert_eq!(&descriptor[0..4], b"PK\x07\x08");
        assert_eq!(&descriptor[4..8], &0x8587_D865u32.to_le_bytes());
        assert_eq!(&descriptor[8..12], &5u32.to_le_bytes());
        assert_eq!(&descriptor[12..16], &5u32.to_le_bytes());
    }

    #[test]
    fn test_central_directory_classic_eocd() {
        let layout = plan(b"11111111 10 /a a.txt\n22222222 20 /b b.txt\n");
        let cd = central_directory(&layout);

        assert_eq!(cd.len() as u64, layout.archive_size - layout.cd_offset);
        assert_eq!(&cd[0..4], b"PK\x01\x02");

        let eocd = &cd[cd.len() - 22..];
        assert_eq!(&eocd[0..4], b"PK\x05\x06");
        assert_eq!(u16::from_le_bytes([eocd[8], eocd[9]]), 2);
        assert_eq!(u16::from_le_bytes([eocd[10], eocd[11]]), 2);
        assert_eq!(
            u32::from_le_bytes([eocd[12], eocd[13], eocd[14], eocd[15]]) as u64,
            layout.cd_entries_size
        );
        assert_eq!(
            u32::from_le_bytes([eocd[16], eocd[17], eocd[18], eocd[19]]) as u64,
            layout.cd_offset
        );
    }

    #[test]
    fn test_central_directory_zip64_records() {
        let list = MemberList {
            members: vec![crate::member::Member {
                uri: b"/big".to_vec(),
                filename: b"big".to_vec(),
                size: u64::from(u32::MAX),
                ..Default::default()
            }],
            missing_crc32: false,
        };
        let layout = Layout::plan_at(list, 1_700_000_000).unwrap();
        let cd = central_directory(&layout);

        // Entry, then Zip64 EOCD + locator, then classic EOCD.
        let zip64_eocd = &cd[cd.len() - 22 - 20 - 56..];
        assert_eq!(&zip64_eocd[0..4], b"PK\x06\x06");
        assert_eq!(&zip64_eocd[4..12], &44u64.to_le_bytes());
        assert_eq!(&zip64_eocd[24..32], &1u64.to_le_bytes()); // entries on this disk
        assert_eq!(&zip64_eocd[40..48], &layout.cd_entries_size.to_le_bytes());
        assert_eq!(&zip64_eocd[48..56], &layout.cd_offset.to_le_bytes());

        let locator = &cd[cd.len() - 22 - 20..cd.len() - 22];
        assert_eq!(&locator[0..4], b"PK\x06\x07");
        assert_eq!(
            &locator[8..16],
            &(layout.cd_offset + layout.cd_entries_size).to_le_bytes()
        );

        // Classic EOCD carries the real (small) values here.
        let eocd = &cd[cd.len() - 22..];
        assert_eq!(u16::from_le_bytes([eocd[8], eocd[9]]), 1);
    }

    #[test]
    fn test_central_entry_clears_missing_crc_flag() {
        let mut layout = plan(b"- 5 /a a\n");
        layout.members[0].crc32 = 0x8587_D865;
        let cd = central_directory(&layout);

        assert_eq!(u16::from_le_bytes([cd[8], cd[9]]), 0x0800);
        assert_eq!(&cd[16..20], &0x8587_D865u32.to_le_bytes());
    }

    #[test]
    fn test_render_piece_dispatch() {
        let layout = plan(b"0 3 /a a\n");
        let header = render_piece(&layout, &layout.pieces[0]);
        let cd = render_piece(&layout, &layout.pieces[2]);

        assert_eq!(header.len() as u64, layout.pieces[0].len());
        assert_eq!(cd.len() as u64, layout.pieces[2].len());
    }
}
