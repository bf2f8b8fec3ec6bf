//! Byte-range parsing and resolution
//!
//! Maps an HTTP `Range` header onto the planned archive. Parsing is a
//! strict state machine over the `bytes=` form; resolution turns each
//! raw expression into a half-open `[start, end)` interval against the
//! archive size. One bad expression poisons the whole header.
//!
//! Ranges are refused wholesale when any member CRC is deferred, since
//! the trailing descriptors cannot be positioned until the payloads have
//! streamed through once; such requests degrade to full-content delivery.

use tracing::debug;
use zipstream_format::Layout;

/// A single range expression as written in the header, before resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawRange {
    /// `bytes=<start>-<end>`, both inclusive positions.
    Explicit { start: u64, end: u64 },
    /// `bytes=<start>-`, open-ended.
    Prefix { start: u64 },
    /// `bytes=-<len>`, the final `len` bytes.
    Suffix { len: u64 },
}

/// A resolved half-open byte interval `[start, end)` of the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset, inclusive.
    pub start: u64,
    /// One past the last byte offset.
    pub end: u64,
}

impl ByteRange {
    /// Byte length of the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// A resolved range is never empty; this exists for completeness.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether the range overlaps the region `[start, end)`.
    pub fn intersects(&self, start: u64, end: u64) -> bool {
        !(end <= self.start || self.end <= start)
    }

    /// Clamp the region `[start, end)` to this range.
    pub fn clamp(&self, start: u64, end: u64) -> (u64, u64) {
        (start.max(self.start), end.min(self.end))
    }
}

/// What a request's `Range` header means for this archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No `Range` header; the whole archive is delivered.
    None,
    /// One or more satisfiable ranges, in header order.
    Satisfiable(Vec<ByteRange>),
    /// No expression was satisfiable; answer 416 with `bytes */{size}`.
    Unsatisfiable {
        /// True archive size for the `Content-Range` value.
        archive_size: u64,
    },
    /// A CRC is deferred somewhere, so the header was ignored outright
    /// and the whole archive is delivered.
    IgnoredDeferredCrc,
}

/// Resolve a request's optional `Range` header against a planned layout.
pub fn resolve_ranges(header: Option<&str>, layout: &Layout) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::None;
    };
    if layout.missing_crc32 {
        debug!("ignoring range header, archive has deferred checksums");
        return RangeOutcome::IgnoredDeferredCrc;
    }

    // A header that does not parse is as unsatisfiable as a bad range.
    let Some(raw) = parse_range_header(header) else {
        debug!(header, "unparseable range header");
        return RangeOutcome::Unsatisfiable {
            archive_size: layout.archive_size,
        };
    };

    let size = layout.archive_size;
    let mut ranges = Vec::with_capacity(raw.len());
    for range in raw {
        let (start, end) = match range {
            RawRange::Suffix { len } => {
                if len > size {
                    return RangeOutcome::Unsatisfiable { archive_size: size };
                }
                (size - len, size)
            }
            RawRange::Prefix { start } => (start, size),
            RawRange::Explicit { start, end } => {
                // A last-byte-pos one past the end is tolerated; some
                // download accelerators send it. Saturate so a u64::MAX
                // last-byte-pos cannot wrap.
                (start, end.saturating_add(1).min(size))
            }
        };
        if start >= size || start >= end {
            return RangeOutcome::Unsatisfiable { archive_size: size };
        }
        ranges.push(ByteRange { start, end });
    }

    if ranges.is_empty() {
        return RangeOutcome::Unsatisfiable { archive_size: size };
    }
    RangeOutcome::Satisfiable(ranges)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FirstByteOrDash,
    FirstByteDigits,
    LastByteOrEnd,
    LastByteDigits,
    SuffixDigits,
    AfterRange,
}

/// Parse a `Range` header value into its raw expressions.
///
/// Returns `None` when the value is not a well-formed `bytes=` range
/// list; resolution answers that with 416. Digits accumulate with
/// overflow checks so a hostile header cannot wrap an offset.
pub fn parse_range_header(header: &str) -> Option<Vec<RawRange>> {
    let rest = header.strip_prefix("bytes=")?;

    let mut ranges = Vec::new();
    let mut state = State::FirstByteOrDash;
    let mut first: u64 = 0;
    let mut last: u64 = 0;

    let flush = |state: State, first: u64, last: u64, ranges: &mut Vec<RawRange>| match state {
        State::LastByteOrEnd => ranges.push(RawRange::Prefix { start: first }),
        State::LastByteDigits => ranges.push(RawRange::Explicit {
            start: first,
            end: last,
        }),
        State::SuffixDigits => ranges.push(RawRange::Suffix { len: last }),
        _ => {}
    };

    for byte in rest.bytes() {
        state = match (state, byte) {
            (State::FirstByteOrDash | State::AfterRange, b' ') => state,
            (State::FirstByteOrDash | State::AfterRange, b'-') => {
                last = 0;
                State::SuffixDigits
            }
            (State::FirstByteOrDash | State::AfterRange, b'0'..=b'9') => {
                first = u64::from(byte - b'0');
                State::FirstByteDigits
            }
            (State::FirstByteDigits, b'0'..=b'9') => {
                first = first.checked_mul(10)?.checked_add(u64::from(byte - b'0'))?;
                state
            }
            (State::FirstByteDigits, b'-') => State::LastByteOrEnd,
            (State::LastByteOrEnd, b'0'..=b'9') => {
                last = u64::from(byte - b'0');
                State::LastByteDigits
            }
            (State::LastByteDigits | State::SuffixDigits, b'0'..=b'9') => {
                last = last.checked_mul(10)?.checked_add(u64::from(byte - b'0'))?;
                state
            }
            (
                State::LastByteOrEnd | State::LastByteDigits | State::SuffixDigits,
                b',',
            ) => {
                flush(state, first, last, &mut ranges);
                State::AfterRange
            }
            _ => return None,
        };
    }

    match state {
        State::LastByteOrEnd | State::LastByteDigits | State::SuffixDigits => {
            flush(state, first, last, &mut ranges);
        }
        _ => return None,
    }

    Some(ranges)
}
