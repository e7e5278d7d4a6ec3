// bslice - Backward Slicing Toolkit
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Backward chunked reader
//!
//! Reads fixed-width values that were written in forward order and yields
//! them most-recently-written first. The source is consumed one chunk of `B`
//! values at a time, starting from the last (possibly partial) chunk and
//! stepping `B` values towards the start after each chunk is exhausted:
//!
//! ```text
//!  values:  [ 0 .. B ) [ B .. 2B ) ... [ nB .. K )
//!  reads:        n+1th      nth           1st
//!  yield:   back-to-front inside every chunk
//! ```
//!
//! Memory is bounded by `B` values and the number of seeks by `⌈K/B⌉`,
//! whatever the length `K` of the source.

use std::io::{Read, Seek, SeekFrom};

use tracing::trace;

use crate::{
    MultiplexedStore, RegionId, RegionReader, TraceError, TraceResult, TraceValue,
};

/// Lazy reverse-order iterator over a forward-written value source.
///
/// Values are read in chunks of `chunk_size`, starting from the end of the
/// source and seeking one chunk further back each time the buffer runs dry.
/// At most one chunk is held in memory, whatever the length of the source.
///
/// The iterator is not restartable: construct a new reader to iterate again.
/// An I/O failure is yielded once as an `Err` and ends the iteration.
#[derive(Debug)]
pub struct BackwardChunkedReader<V: TraceValue, R = Box<dyn RegionReader>> {
    source: R,
    buf: Vec<V>,
    /// Values of `buf` not yet yielded; the next one is `buf[pending - 1]`.
    pending: usize,
    /// Index (in values) of `buf[0]` within the source.
    chunk_start: u64,
    chunk_size: usize,
    chunk_reads: usize,
    failed: bool,
}

impl<V: TraceValue, R: Read + Seek> BackwardChunkedReader<V, R> {
    /// Create a reader over the first `byte_len` bytes of `source`
    ///
    /// `chunk_size` is the number of values read per bulk read; it is clamped
    /// to at least one. A source holding zero values yields nothing.
    pub fn new(source: R, byte_len: u64, chunk_size: usize) -> TraceResult<Self> {
        let width = V::WIDTH as u64;
        if byte_len % width != 0 {
            return Err(TraceError::TruncatedSequence((byte_len % width) as usize));
        }
        let total = byte_len / width;
        let chunk_size = chunk_size.max(1);

        let capacity = total.min(chunk_size as u64) as usize;
        let mut reader = Self {
            source,
            buf: vec![V::default(); capacity],
            pending: 0,
            chunk_start: 0,
            chunk_size,
            chunk_reads: 0,
            failed: false,
        };

        if total > 0 {
            let last_chunk = (total - 1) / chunk_size as u64 * chunk_size as u64;
            reader.load_chunk(last_chunk, (total - last_chunk) as usize)?;
        }
        Ok(reader)
    }

    fn load_chunk(&mut self, start: u64, count: usize) -> TraceResult<()> {
        self.source.seek(SeekFrom::Start(start * V::WIDTH as u64))?;
        V::read_into(&mut self.source, &mut self.buf[..count])?;
        self.chunk_start = start;
        self.pending = count;
        self.chunk_reads += 1;
        trace!(start, count, "loaded backward chunk");
        Ok(())
    }

    /// Number of bulk reads performed so far
    pub fn chunk_reads(&self) -> usize {
        self.chunk_reads
    }

    /// Number of values the reader buffers at most
    pub fn buffer_capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of values not yet yielded
    pub fn remaining(&self) -> u64 {
        if self.failed {
            0
        } else {
            self.chunk_start + self.pending as u64
        }
    }

    /// Release the underlying source
    pub fn close(self) {
        drop(self.source);
    }
}

impl<V: TraceValue> BackwardChunkedReader<V> {
    /// Create a reader over a whole region of `store`
    pub fn over_region(
        store: &dyn MultiplexedStore,
        region: RegionId,
        chunk_size: usize,
    ) -> TraceResult<Self> {
        let len = store.region_len(region)?;
        if len % V::WIDTH as u64 != 0 {
            return Err(TraceError::MisalignedRegion { region, len, kind: V::KIND });
        }
        let source = store.reader(region, 0)?;
        Self::new(source, len, chunk_size)
    }
}

impl<V: TraceValue, R: Read + Seek> Iterator for BackwardChunkedReader<V, R> {
    type Item = TraceResult<V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.pending == 0 {
            if self.chunk_start == 0 {
                return None;
            }
            let start = self.chunk_start - self.chunk_size as u64;
            if let Err(err) = self.load_chunk(start, self.chunk_size) {
                self.failed = true;
                return Some(Err(err));
            }
        }
        self.pending -= 1;
        Some(Ok(self.buf[self.pending]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining() as usize;
        (remaining, Some(remaining))
    }
}
