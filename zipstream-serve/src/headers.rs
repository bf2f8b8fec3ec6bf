//! Response head computation
//!
//! The HTTP shell around the emitter needs a handful of computed values:
//! status, content type, exact content length and the `Content-Range`
//! value where one applies. Archives are synthesized per request, so
//! they are never cacheable and revalidate every time.

use zipstream_format::Layout;

use crate::multipart::Multipart;
use crate::range::ByteRange;

/// Cache directive sent with every archive response.
pub const CACHE_CONTROL: &str = "max-age=0";

/// HTTP status the response should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// 200, full archive.
    Ok,
    /// 206, one or more ranges.
    PartialContent,
    /// 416, no satisfiable range.
    RangeNotSatisfiable,
}

/// Computed header values for one archive response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Status code for the response line.
    pub status: ResponseStatus,
    /// `Content-Type` value.
    pub content_type: String,
    /// Exact body length in bytes.
    pub content_length: u64,
    /// `Content-Range` value, set for single-range and 416 responses.
    pub content_range: Option<String>,
    /// Whether `Accept-Ranges: bytes` may be advertised. False when any
    /// member CRC is deferred, since ranges are refused for such archives.
    pub accept_ranges: bool,
}

impl ResponseHead {
    /// Head for a full-archive 200 response.
    pub fn full(layout: &Layout) -> Self {
        Self {
            status: ResponseStatus::Ok,
            content_type: "application/zip".to_string(),
            content_length: layout.archive_size,
            content_range: None,
            accept_ranges: !layout.missing_crc32,
        }
    }

    /// Head for a single-range 206 response.
    pub fn single_range(layout: &Layout, range: ByteRange) -> Self {
        Self {
            status: ResponseStatus::PartialContent,
            content_type: "application/zip".to_string(),
            content_length: range.len(),
            content_range: Some(format!(
                "bytes {}-{}/{}",
                range.start,
                range.end - 1,
                layout.archive_size
            )),
            accept_ranges: true,
        }
    }

    /// Head for a multi-range 206 response framed with boundaries.
    pub fn multi_range(layout: &Layout, ranges: &[ByteRange], multipart: &Multipart) -> Self {
        Self {
            status: ResponseStatus::PartialContent,
            content_type: format!(
                "multipart/byteranges; boundary={}",
                multipart.boundary()
            ),
            content_length: multipart.total_length(ranges, layout.archive_size),
            content_range: None,
            accept_ranges: true,
        }
    }

    /// Head for a 416 response carrying the true size.
    pub fn unsatisfiable(archive_size: u64) -> Self {
        Self {
            status: ResponseStatus::RangeNotSatisfiable,
            content_type: "application/zip".to_string(),
            content_length: 0,
            content_range: Some(format!("bytes */{archive_size}")),
            accept_ranges: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use zipstream_format::parse_member_list;

    fn layout(input: &[u8]) -> Layout {
        Layout::plan_at(parse_member_list(input).unwrap(), 1_700_000_000).unwrap()
    }

    #[test]
    fn test_full_head() {
        let layout = layout(b"11111111 10 /a a.txt\n");
        let head = ResponseHead::full(&layout);

        assert_eq!(head.status, ResponseStatus::Ok);
        assert_eq!(head.content_type, "application/zip");
        assert_eq!(head.content_length, layout.archive_size);
        assert_eq!(head.content_range, None);
        assert!(head.accept_ranges);
    }

    #[test]
    fn test_deferred_crc_disables_accept_ranges() {
        let layout = layout(b"- 10 /a a.txt\n");
        assert!(!ResponseHead::full(&layout).accept_ranges);
    }

    #[test]
    fn test_single_range_head() {
        let layout = layout(b"11111111 10 /a a.txt\n");
        let head = ResponseHead::single_range(&layout, ByteRange { start: 5, end: 15 });

        assert_eq!(head.status, ResponseStatus::PartialContent);
        assert_eq!(head.content_length, 10);
        assert_eq!(
            head.content_range.as_deref(),
            Some(format!("bytes 5-14/{}", layout.archive_size).as_str())
        );
    }

    #[test]
    fn test_multi_range_head() {
        let layout = layout(b"11111111 10 /a a.txt\n");
        let multipart = Multipart::with_boundary("00000000000000000042".to_string());
        let ranges = [
            ByteRange { start: 0, end: 4 },
            ByteRange { start: 8, end: 12 },
        ];
        let head = ResponseHead::multi_range(&layout, &ranges, &multipart);

        assert_eq!(
            head.content_type,
            "multipart/byteranges; boundary=00000000000000000042"
        );
        assert_eq!(
            head.content_length,
            multipart.total_length(&ranges, layout.archive_size)
        );
        assert_eq!(head.content_range, None);
    }

    #[test]
    fn test_unsatisfiable_head() {
        let head = ResponseHead::unsatisfiable(1234);
        assert_eq!(head.status, ResponseStatus::RangeNotSatisfiable);
        assert_eq!(head.content_length, 0);
        assert_eq!(head.content_range.as_deref(), Some("bytes */1234"));
    }
}
