//! Member-list parser
//!
//! Parses the line-oriented member-list protocol into an ordered
//! [`MemberList`]. One member per line, single-space separated:
//!
//! ```text
//! <CRC32-hex-or-"-"> <decimal-size> <uri>[?<args>] <filename>\n
//! ```
//!
//! Lines end with `\r\n` or `\n`; the final line may omit the terminator.
//! The URI is percent/`+`-decoded once, in place; args and filename are
//! taken verbatim. A CRC field of `-` defers the checksum to a trailing
//! data descriptor. A URI of `@directory` declares a pseudo-directory.

use tracing::debug;

use crate::error::{Error, Result};
use crate::member::{DIRECTORY_TOKEN, Member, MemberList};

/// Parser states, one per protocol field position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Start of a line: `-` or the first CRC hex digit.
    LineStart,
    /// Consuming CRC hex digits until the field separator.
    CrcDigits,
    /// After a lone `-`: only the field separator may follow.
    AfterDash,
    /// First size digit (at least one is required).
    SizeFirst,
    /// Remaining size digits until the field separator.
    SizeDigits,
    /// First URI byte (at least one is required).
    UriFirst,
    /// Remaining URI bytes until `?` or the field separator.
    UriBytes,
    /// Query arguments until the field separator.
    ArgsBytes,
    /// Filename bytes until end of line.
    FilenameBytes,
    /// After `\r`: only `\n` may follow.
    AfterCr,
}

/// In-progress member fields for the current line.
#[derive(Default)]
struct Line {
    crc32: u32,
    missing_crc32: bool,
    size: u64,
    uri: Vec<u8>,
    args: Vec<u8>,
    filename: Vec<u8>,
}

impl Line {
    fn finish(mut self, list: &mut MemberList) {
        decode_in_place(&mut self.uri);

        let mut member = Member {
            args: self.args,
            filename: self.filename,
            size: self.size,
            crc32: self.crc32,
            missing_crc32: self.missing_crc32,
            ..Member::default()
        };

        if self.uri == DIRECTORY_TOKEN {
            // No payload is ever fetched for a pseudo-directory; its size
            // and CRC are fixed at zero and the CRC is always known.
            member.is_directory = true;
            member.size = 0;
            member.crc32 = 0;
            member.missing_crc32 = false;
            member.args.clear();
        } else {
            member.uri = self.uri;
            list.missing_crc32 |= member.missing_crc32;
        }

        list.members.push(member);
    }
}

/// Parse a complete member list.
///
/// The whole list must be in `input`; the caller is responsible for
/// assembling it from however many fragments it arrived in. On any
/// malformed line the partial result is discarded.
///
/// # Examples
///
/// ```
/// let list = zipstream_format::parse_member_list(
///     b"1a2b3c4d 12 /files/report.pdf report.pdf\n- 5 /tmp/x?v=1 x.bin\n",
/// )?;
/// assert_eq!(list.members.len(), 2);
/// assert!(list.members[1].missing_crc32);
/// assert!(list.missing_crc32);
/// # Ok::<(), zipstream_format::Error>(())
/// ```
pub fn parse_member_list(input: &[u8]) -> Result<MemberList> {
    let mut list = MemberList::default();
    let mut state = State::LineStart;
    let mut line = Line::default();

    for (offset, &b) in input.iter().enumerate() {
        let malformed = || Err(Error::MalformedMemberList { offset });

        state = match (state, b) {
            (State::LineStart, b'-') => {
                line.missing_crc32 = true;
                // Running CRC starts at all-ones; finalized by xor once the
                // payload has streamed through.
                line.crc32 = !0;
                State::AfterDash
            }
            // Blank lines between records are tolerated.
            (State::LineStart, b'\r' | b'\n') => State::LineStart,
            (State::LineStart | State::CrcDigits, _) if b.is_ascii_hexdigit() => {
                line.crc32 = line
                    .crc32
                    .wrapping_mul(16)
                    .wrapping_add(hex_value(b));
                State::CrcDigits
            }
            (State::CrcDigits | State::AfterDash, b' ') => State::SizeFirst,

            (State::SizeFirst | State::SizeDigits, b'0'..=b'9') => {
                line.size = line
                    .size
                    .checked_mul(10)
                    .and_then(|s| s.checked_add(u64::from(b - b'0')))
                    .ok_or(Error::MalformedMemberList { offset })?;
                State::SizeDigits
            }
            (State::SizeDigits, b' ') => State::UriFirst,

            (State::UriFirst, b' ' | b'?' | b'\r' | b'\n') => return malformed(),
            (State::UriFirst, _) => {
                line.uri.push(b);
                State::UriBytes
            }
            (State::UriBytes, b'?') => State::ArgsBytes,
            (State::UriBytes, b' ') => State::FilenameBytes,
            (State::UriBytes, b'\r' | b'\n') => return malformed(),
            (State::UriBytes, _) => {
                line.uri.push(b);
                State::UriBytes
            }

            (State::ArgsBytes, b' ') => State::FilenameBytes,
            (State::ArgsBytes, b'\r' | b'\n') => return malformed(),
            (State::ArgsBytes, _) => {
                line.args.push(b);
                State::ArgsBytes
            }

            (State::FilenameBytes, b'\n') | (State::AfterCr, b'\n') => {
                std::mem::take(&mut line).finish(&mut list);
                State::LineStart
            }
            (State::FilenameBytes, b'\r') => State::AfterCr,
            (State::FilenameBytes, 0) => return malformed(),
            (State::FilenameBytes, _) => {
                line.filename.push(b);
                State::FilenameBytes
            }

            _ => return malformed(),
        };
    }

    // The final line may omit its terminator; any other mid-field end of
    // input leaves an incomplete member behind.
    match state {
        State::FilenameBytes => line.finish(&mut list),
        State::LineStart => {}
        _ => {
            return Err(Error::MalformedMemberList {
                offset: input.len(),
            });
        }
    }

    if list.members.is_empty() {
        return Err(Error::EmptyMemberList);
    }

    debug!(
        members = list.members.len(),
        missing_crc32 = list.missing_crc32,
        "parsed member list"
    );

    Ok(list)
}

fn hex_value(b: u8) -> u32 {
    match b {
        b'0'..=b'9' => u32::from(b - b'0'),
        b'a'..=b'f' => u32::from(b - b'a' + 10),
        _ => u32::from(b - b'A' + 10),
    }
}

/// Destructive percent/`+` decode: decoded length never exceeds the
/// encoded length, and the decode runs exactly once over the field.
fn decode_in_place(buf: &mut Vec<u8>) {
    let mut read = 0;
    let mut write = 0;

    while read < buf.len() {
        let mut b = buf[read];
        if b == b'+' {
            b = b' ';
        }
        if b == b'%'
            && read + 2 < buf.len()
            && buf[read + 1].is_ascii_hexdigit()
            && buf[read + 2].is_ascii_hexdigit()
        {
            b = (hex_value(buf[read + 1]) * 16 + hex_value(buf[read + 2])) as u8;
            read += 2;
        }
        buf[write] = b;
        write += 1;
        read += 1;
    }

    buf.truncate(write);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_line() {
        let list = parse_member_list(b"deadbeef 42 /data/a.txt a.txt\n").unwrap();

        assert_eq!(list.members.len(), 1);
        let m = &list.members[0];
        assert_eq!(m.crc32, 0xdeadbeef);
        assert_eq!(m.size, 42);
        assert_eq!(m.uri, b"/data/a.txt");
        assert_eq!(m.args, b"");
        assert_eq!(m.filename, b"a.txt");
        assert!(!m.missing_crc32);
        assert!(!list.missing_crc32);
    }

    #[test]
    fn test_parse_args_and_crlf() {
        let list = parse_member_list(b"0 0 /x?foo=bar&v=2 some file.bin\r\n").unwrap();

        let m = &list.members[0];
        assert_eq!(m.uri, b"/x");
        assert_eq!(m.args, b"foo=bar&v=2");
        // Filenames may contain spaces; they run to end of line.
        assert_eq!(m.filename, b"some file.bin");
    }

    #[test]
    fn test_parse_missing_crc() {
        let list = parse_member_list(b"- 5 /a b\n").unwrap();

        let m = &list.members[0];
        assert!(m.missing_crc32);
        assert_eq!(m.crc32, !0);
        assert!(list.missing_crc32);
    }

    #[test]
    fn test_parse_multiple_lines_without_final_newline() {
        let list = parse_member_list(b"1 1 /a a\n2 2 /b b").unwrap();

        assert_eq!(list.members.len(), 2);
        assert_eq!(list.members[1].crc32, 2);
        assert_eq!(list.members[1].filename, b"b");
    }

    #[test]
    fn test_parse_percent_decoding() {
        let list = parse_member_list(b"0 1 /a%20b+c%2F?q=%20 name\n").unwrap();

        let m = &list.members[0];
        // URI is decoded; args are not.
        assert_eq!(m.uri, b"/a b c/");
        assert_eq!(m.args, b"q=%20");
    }

    #[test]
    fn test_parse_incomplete_percent_kept_verbatim() {
        let list = parse_member_list(b"0 1 /a%2 name\n").unwrap();
        assert_eq!(list.members[0].uri, b"/a%2");
    }

    #[test]
    fn test_parse_directory_entry() {
        let list = parse_member_list(b"- 9 @directory?junk=1 photos/\n").unwrap();

        let m = &list.members[0];
        assert!(m.is_directory);
        assert_eq!(m.size, 0);
        assert_eq!(m.crc32, 0);
        assert!(!m.missing_crc32);
        assert!(m.uri.is_empty());
        assert!(m.args.is_empty());
        assert_eq!(m.filename, b"photos/");
        // A directory's deferred-CRC marker must not poison the list flag.
        assert!(!list.missing_crc32);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            &b""[..],
            b"nothex 1 /a b\n",
            b"- \n",
            b"12 /a b\n",      // missing size field separator placement
            b"12  1 /a b\n",   // double space
            b"12 1  b\n",      // empty uri
            b"12 1 /a b\rx\n", // CR not followed by LF
            b"12 1 /a",        // EOF mid-uri
            b"12 1\n",         // line ends before uri
        ] {
            assert!(parse_member_list(bad).is_err(), "accepted: {bad:?}");
        }
    }

    #[test]
    fn test_parse_error_offset() {
        let err = parse_member_list(b"0 1 /a b\nzz -\n").unwrap_err();
        assert_eq!(err, Error::MalformedMemberList { offset: 12 });
    }

    #[test]
    fn test_parse_size_overflow() {
        let line = format!("0 {}0 /a b\n", u64::MAX);
        assert!(parse_member_list(line.as_bytes()).is_err());
    }

    #[test]
    fn test_decode_in_place_idempotent_input_shapes() {
        let mut v = b"%2541".to_vec();
        decode_in_place(&mut v);
        // Decodes once: "%41" survives as literal text.
        assert_eq!(v, b"%41");
    }
}
