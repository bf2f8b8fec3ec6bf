//! multipart/byteranges framing
//!
//! When a request carries more than one satisfiable range, each range's
//! bytes are preceded by a boundary record naming the part's content
//! type and position, and the body terminates with a closing boundary.
//! All framing is sized exactly, so the response content length is known
//! before the first byte is emitted.

use bytes::Bytes;

use crate::range::ByteRange;

/// Boundary state for one multi-range response.
#[derive(Debug, Clone)]
pub struct Multipart {
    boundary: String,
}

impl Multipart {
    /// Create framing with a fresh random boundary.
    pub fn new() -> Self {
        Self::with_boundary(format!("{:020}", rand::random::<u64>()))
    }

    /// Create framing with a caller-chosen boundary. Tests use this to
    /// get deterministic output.
    pub fn with_boundary(boundary: String) -> Self {
        Self { boundary }
    }

    /// The boundary token, for the `Content-Type` header parameter.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// The record that precedes one range's bytes.
    pub fn record(&self, range: ByteRange, archive_size: u64) -> Bytes {
        Bytes::from(format!(
            "\r\n--{}\r\nContent-Type: application/zip\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
            self.boundary,
            range.start,
            range.end - 1,
            archive_size,
        ))
    }

    /// The closing boundary after the last range's bytes.
    pub fn terminator(&self) -> Bytes {
        Bytes::from(format!("\r\n--{}--\r\n", self.boundary))
    }

    /// Exact body length of the whole multipart response.
    pub fn total_length(&self, ranges: &[ByteRange], archive_size: u64) -> u64 {
        ranges
            .iter()
            .map(|r| self.record(*r, archive_size).len() as u64 + r.len())
            .sum::<u64>()
            + self.terminator().len() as u64
    }
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_framing_is_exact() {
        let multipart = Multipart::with_boundary("00000000000000000042".to_string());
        let record = multipart.record(ByteRange { start: 10, end: 20 }, 100);

        assert_eq!(
            record,
            Bytes::from_static(
                b"\r\n--00000000000000000042\r\n\
                  Content-Type: application/zip\r\n\
                  Content-Range: bytes 10-19/100\r\n\r\n"
            )
        );
        assert_eq!(
            multipart.terminator(),
            Bytes::from_static(b"\r\n--00000000000000000042--\r\n")
        );
    }

    #[test]
    fn test_total_length_matches_emitted_parts() {
        let multipart = Multipart::with_boundary("00000000000000000042".to_string());
        let ranges = [
            ByteRange { start: 0, end: 5 },
            ByteRange { start: 90, end: 100 },
        ];

        let mut body = 0;
        for range in &ranges {
            body += multipart.record(*range, 100).len() as u64 + range.len();
        }
        body += multipart.terminator().len() as u64;

        assert_eq!(multipart.total_length(&ranges, 100), body);
    }

    #[test]
    fn test_fresh_boundaries_are_twenty_digits() {
        let multipart = Multipart::new();
        assert_eq!(multipart.boundary().len(), 20);
        assert!(multipart.boundary().bytes().all(|b| b.is_ascii_digit()));
    }
}
