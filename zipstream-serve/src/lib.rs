//! # zipstream-serve
//!
//! Delivery layer for streamed ZIP archives: resolves HTTP `Range`
//! headers against a planned layout, frames multi-range responses as
//! `multipart/byteranges`, and drives emission with lazily fetched
//! member payloads.
//!
//! The emitter is pull-driven. Each call to
//! [`ZipEmitter::next_chunk`] produces the next body chunk, suspending
//! only on the payload fetch; at most one fetch is outstanding at a
//! time, and dropping the emitter cancels it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zipstream_format::{Layout, parse_member_list};
//! use zipstream_serve::{HttpFetcher, ZipEmitter, resolve_ranges};
//!
//! # async fn serve(range_header: Option<&str>) -> zipstream_serve::Result<()> {
//! let list = parse_member_list(b"1a2b3c4d 1024 /files/report.pdf report.pdf\n")?;
//! let layout = Layout::plan(list)?;
//!
//! let outcome = resolve_ranges(range_header, &layout);
//! let fetcher = HttpFetcher::new("http://upstream.internal")?;
//! let mut emitter = ZipEmitter::from_outcome(fetcher, layout, outcome);
//!
//! let head = emitter.response_head().clone();
//! while let Some(chunk) = emitter.next_chunk().await? {
//!     // hand chunk to the connection
//!     let _ = (&head, chunk);
//! }
//! # Ok(())
//! # }
//! ```

pub mod emit;
pub mod error;
pub mod fetch;
pub mod headers;
pub mod multipart;
pub mod range;

pub use emit::{EmitState, ZipEmitter};
pub use error::{Error, Result};
pub use fetch::{HttpFetcher, PayloadFetcher, PayloadStream, StaticFetcher};
pub use headers::{CACHE_CONTROL, ResponseHead, ResponseStatus};
pub use multipart::Multipart;
pub use range::{ByteRange, RangeOutcome, RawRange, parse_range_header, resolve_ranges};
