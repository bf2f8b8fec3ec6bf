//! Incremental CRC-32 for deferred checksums
//!
//! Members declared with a `-` CRC have their checksum computed while the
//! payload streams through, then written into the trailing data
//! descriptor. A truncated stream must never be finalized.

use crc32fast::Hasher;

/// Running CRC-32 state for one member's payload.
#[derive(Debug, Default)]
pub struct CrcAccumulator {
    hasher: Hasher,
    bytes_seen: u64,
}

impl CrcAccumulator {
    /// Fresh accumulator in the all-ones initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of payload bytes.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes_seen += chunk.len() as u64;
    }

    /// Payload bytes fed so far.
    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    /// Final CRC-32, xored out of its running-complement form.
    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}
