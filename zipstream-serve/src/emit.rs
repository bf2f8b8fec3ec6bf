//! Resumable archive emission
//!
//! [`ZipEmitter`] walks the planned pieces and produces the response
//! body chunk by chunk. Synthetic pieces render locally; data pieces
//! suspend on the payload fetch, and a fetched member may span many
//! `next_chunk` calls. The cursor (current range, current piece, the
//! in-flight stream) lives in the emitter, so emission resumes exactly
//! where it left off after every chunk.
//!
//! At most one payload fetch is outstanding at a time; `&mut self` on
//! the pull loop enforces that structurally. Dropping the emitter drops
//! the in-flight stream, cancelling the transfer.

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};
use zipstream_format::{CrcAccumulator, Layout, Piece, PieceKind, render_piece};

use crate::error::{Error, Result};
use crate::fetch::{PayloadFetcher, PayloadStream};
use crate::headers::ResponseHead;
use crate::multipart::Multipart;
use crate::range::{ByteRange, RangeOutcome};

/// Where the emitter is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitState {
    /// Layout planned, nothing emitted yet.
    Planned,
    /// At least one chunk produced.
    Emitting,
    /// All requested bytes produced.
    Done,
    /// Terminated abnormally; bytes already produced stay produced.
    Aborted,
}

struct InFlight {
    stream: PayloadStream,
    crc: Option<CrcAccumulator>,
    member: usize,
    piece_start: u64,
    received: u64,
}

/// Pull-driven emitter for one archive response.
pub struct ZipEmitter<F> {
    fetcher: F,
    layout: Layout,
    ranges: Vec<ByteRange>,
    multipart: Option<Multipart>,
    head: ResponseHead,
    state: EmitState,
    range_i: usize,
    piece_i: usize,
    boundary_sent: bool,
    terminator_sent: bool,
    in_flight: Option<InFlight>,
}

impl<F: PayloadFetcher> ZipEmitter<F> {
    /// Emit the whole archive.
    pub fn new(fetcher: F, layout: Layout) -> Self {
        let head = ResponseHead::full(&layout);
        let archive_size = layout.archive_size;
        Self {
            fetcher,
            layout,
            ranges: vec![ByteRange {
                start: 0,
                end: archive_size,
            }],
            multipart: None,
            head,
            state: EmitState::Planned,
            range_i: 0,
            piece_i: 0,
            boundary_sent: false,
            terminator_sent: false,
            in_flight: None,
        }
    }

    /// Emit the given resolved ranges, with multipart framing when there
    /// is more than one. Ranges never coexist with deferred CRCs.
    pub fn with_ranges(fetcher: F, layout: Layout, ranges: Vec<ByteRange>) -> Self {
        debug_assert!(!ranges.is_empty());
        debug_assert!(!layout.missing_crc32);

        let (multipart, head) = match ranges.as_slice() {
            [single] => (None, ResponseHead::single_range(&layout, *single)),
            many => {
                let multipart = Multipart::new();
                let head = ResponseHead::multi_range(&layout, many, &multipart);
                (Some(multipart), head)
            }
        };
        Self {
            fetcher,
            layout,
            ranges,
            multipart,
            head,
            state: EmitState::Planned,
            range_i: 0,
            piece_i: 0,
            boundary_sent: false,
            terminator_sent: false,
            in_flight: None,
        }
    }

    /// Build the emitter a resolved range outcome calls for. An
    /// unsatisfiable outcome yields an emitter with an empty body whose
    /// head carries the 416 values.
    pub fn from_outcome(fetcher: F, layout: Layout, outcome: RangeOutcome) -> Self {
        match outcome {
            RangeOutcome::None | RangeOutcome::IgnoredDeferredCrc => Self::new(fetcher, layout),
            RangeOutcome::Satisfiable(ranges) => Self::with_ranges(fetcher, layout, ranges),
            RangeOutcome::Unsatisfiable { archive_size } => {
                let head = ResponseHead::unsatisfiable(archive_size);
                let mut emitter = Self::new(fetcher, layout);
                emitter.ranges.clear();
                emitter.head = head;
                emitter.state = EmitState::Done;
                emitter
            }
        }
    }

    /// The planned layout behind this emitter.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EmitState {
        self.state
    }

    /// Header values for the response this emitter produces.
    pub fn response_head(&self) -> &ResponseHead {
        &self.head
    }

    /// Produce the next body chunk, or `None` when the body is complete.
    ///
    /// After an error the emitter is aborted and every further call
    /// fails with [`Error::Aborted`].
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.state {
            EmitState::Done => return Ok(None),
            EmitState::Aborted => return Err(Error::Aborted),
            EmitState::Planned => self.state = EmitState::Emitting,
            EmitState::Emitting => {}
        }

        loop {
            let Some(&range) = self.ranges.get(self.range_i) else {
                if let Some(multipart) = &self.multipart {
                    if !self.terminator_sent {
                        self.terminator_sent = true;
                        return Ok(Some(multipart.terminator()));
                    }
                }
                self.state = EmitState::Done;
                return Ok(None);
            };

            if let Some(multipart) = &self.multipart {
                if !self.boundary_sent {
                    self.boundary_sent = true;
                    return Ok(Some(multipart.record(range, self.layout.archive_size)));
                }
            }

            if self.in_flight.is_some() {
                if let Some(chunk) = self.pull_payload(range).await? {
                    return Ok(Some(chunk));
                }
                continue;
            }

            let Some(&piece) = self.layout.pieces.get(self.piece_i) else {
                self.next_range();
                continue;
            };

            // Pieces are sorted, so reaching one past the range finishes it.
            if piece.start >= range.end {
                self.next_range();
                continue;
            }
            if piece.is_empty() || !range.intersects(piece.start, piece.end) {
                // An empty data piece never streams, so a deferred CRC
                // must still be finalized here or the trailer would carry
                // the running-complement init value.
                if piece.kind == PieceKind::Data && piece.is_empty() {
                    if let Some(index) = piece.member {
                        let member = &mut self.layout.members[index];
                        if member.missing_crc32 {
                            member.crc32 = CrcAccumulator::new().finalize();
                        }
                    }
                }
                self.piece_i += 1;
                continue;
            }

            if piece.kind == PieceKind::Data {
                self.start_fetch(piece).await?;
            } else {
                self.piece_i += 1;
                let bytes = render_piece(&self.layout, &piece);
                let (start, end) = range.clamp(piece.start, piece.end);
                let chunk = bytes.slice((start - piece.start) as usize..(end - piece.start) as usize);
                if !chunk.is_empty() {
                    return Ok(Some(chunk));
                }
            }
        }
    }

    /// Drive the emitter to completion into an async writer, returning
    /// the number of body bytes written.
    pub async fn write_to<W: AsyncWrite + Unpin>(&mut self, writer: &mut W) -> Result<u64> {
        let mut written = 0;
        while let Some(chunk) = self.next_chunk().await? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(written)
    }

    fn next_range(&mut self) {
        self.range_i += 1;
        self.piece_i = 0;
        self.boundary_sent = false;
    }

    async fn start_fetch(&mut self, piece: Piece) -> Result<()> {
        let Some(index) = piece.member else {
            self.piece_i += 1;
            return Ok(());
        };
        let member = &self.layout.members[index];
        debug!(
            uri = %String::from_utf8_lossy(&member.uri),
            size = member.size,
            "fetching member payload"
        );

        match self.fetcher.fetch(&member.uri, &member.args).await {
            Ok(stream) => {
                self.in_flight = Some(InFlight {
                    stream,
                    crc: member.missing_crc32.then(CrcAccumulator::new),
                    member: index,
                    piece_start: piece.start,
                    received: 0,
                });
                Ok(())
            }
            Err(err) => {
                self.state = EmitState::Aborted;
                Err(err)
            }
        }
    }

    /// Pull from the in-flight payload stream until a chunk lands inside
    /// the range or the stream ends. Returns `None` once the data piece
    /// is fully consumed and the cursor has moved past it.
    async fn pull_payload(&mut self, range: ByteRange) -> Result<Option<Bytes>> {
        let Some(mut flight) = self.in_flight.take() else {
            return Ok(None);
        };
        let declared = self.layout.members[flight.member].size;

        loop {
            // Nothing left in range and no CRC pending: drop the stream
            // instead of draining the rest of the payload.
            if flight.crc.is_none() && flight.piece_start + flight.received >= range.end {
                trace!("dropping payload stream past range end");
                self.piece_i += 1;
                return Ok(None);
            }

            match flight.stream.next().await {
                Some(Ok(chunk)) => {
                    let chunk_start = flight.piece_start + flight.received;
                    flight.received += chunk.len() as u64;
                    if flight.received > declared {
                        self.state = EmitState::Aborted;
                        return Err(self.size_mismatch(flight.member, flight.received));
                    }
                    if let Some(crc) = flight.crc.as_mut() {
                        crc.update(&chunk);
                    }

                    let chunk_end = chunk_start + chunk.len() as u64;
                    if !range.intersects(chunk_start, chunk_end) {
                        continue;
                    }
                    let (start, end) = range.clamp(chunk_start, chunk_end);
                    let trimmed =
                        chunk.slice((start - chunk_start) as usize..(end - chunk_start) as usize);
                    if trimmed.is_empty() {
                        continue;
                    }
                    self.in_flight = Some(flight);
                    return Ok(Some(trimmed));
                }
                Some(Err(err)) => {
                    self.state = EmitState::Aborted;
                    return Err(err);
                }
                None => {
                    if flight.received != declared {
                        self.state = EmitState::Aborted;
                        return Err(self.size_mismatch(flight.member, flight.received));
                    }
                    if let Some(crc) = flight.crc.take() {
                        self.layout.members[flight.member].crc32 = crc.finalize();
                    }
                    trace!(bytes = flight.received, "member payload complete");
                    self.piece_i += 1;
                    return Ok(None);
                }
            }
        }
    }

    fn size_mismatch(&self, member: usize, actual: u64) -> Error {
        let member = &self.layout.members[member];
        Error::SizeMismatch {
            uri: String::from_utf8_lossy(&member.uri).into_owned(),
            declared: member.size,
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;
    use pretty_assertions::assert_eq;
    use zipstream_format::parse_member_list;

    fn emitter(input: &[u8], fetcher: StaticFetcher) -> ZipEmitter<StaticFetcher> {
        let layout =
            Layout::plan_at(parse_member_list(input).unwrap(), 1_700_000_000).unwrap();
        ZipEmitter::new(fetcher, layout)
    }

    #[tokio::test]
    async fn test_full_emission_matches_planned_size() {
        let fetcher = StaticFetcher::new().insert(&b"/a"[..], &b"abcde"[..]);
        let mut emitter = emitter(b"8587d865 5 /a a.txt\n", fetcher);
        assert_eq!(emitter.state(), EmitState::Planned);

        let mut body = Vec::new();
        let written = emitter.write_to(&mut body).await.unwrap();

        assert_eq!(emitter.state(), EmitState::Done);
        assert_eq!(written, emitter.layout().archive_size);
        assert_eq!(body.len() as u64, emitter.layout().archive_size);
    }

    #[tokio::test]
    async fn test_upstream_failure_aborts() {
        let mut emitter = emitter(b"8587d865 5 /a a.txt\n", StaticFetcher::new());

        let mut failed = false;
        loop {
            match emitter.next_chunk().await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(Error::UpstreamFailed { status: 404, .. }) if !failed => failed = true,
                Err(Error::Aborted) => break,
                Err(err) => panic!("unexpected error: {err}"),
            }
        }

        assert!(failed);
        assert_eq!(emitter.state(), EmitState::Aborted);
    }

    #[tokio::test]
    async fn test_short_payload_is_a_size_mismatch() {
        let fetcher = StaticFetcher::new().insert(&b"/a"[..], &b"abc"[..]);
        let mut emitter = emitter(b"8587d865 5 /a a.txt\n", fetcher);

        let err = loop {
            match emitter.next_chunk().await {
                Ok(Some(_)) => {}
                Ok(None) => panic!("emission completed despite short payload"),
                Err(err) => break err,
            }
        };
        assert!(matches!(
            err,
            Error::SizeMismatch {
                declared: 5,
                actual: 3,
                ..
            }
        ));
        assert_eq!(emitter.state(), EmitState::Aborted);
    }

    #[tokio::test]
    async fn test_unsatisfiable_outcome_has_empty_body() {
        let layout =
            Layout::plan_at(parse_member_list(b"8587d865 5 /a a.txt\n").unwrap(), 1_700_000_000)
                .unwrap();
        let size = layout.archive_size;
        let mut emitter = ZipEmitter::from_outcome(
            StaticFetcher::new(),
            layout,
            RangeOutcome::Unsatisfiable { archive_size: size },
        );

        assert_eq!(emitter.response_head().content_length, 0);
        assert_eq!(
            emitter.response_head().content_range.as_deref(),
            Some(format!("bytes */{size}").as_str())
        );
        assert_eq!(emitter.next_chunk().await.unwrap(), None);
    }
}
