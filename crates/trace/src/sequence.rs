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

//! Trace sequences and the adaptive storage policy
//!
//! A sequence records values in forward order while the program runs and is
//! replayed most-recent-first afterwards. Sealing is where the two meet:
//!
//! ```text
//!                trace()                       seal()
//!  Buffered ──(> buffer_threshold)──► Streaming ──────► Sealed
//!     │                                                   ▲
//!     └──────────────────── seal() ───────────────────────┘
//! ```
//!
//! - A sequence that never left memory is reversed in memory and stored raw.
//! - A streaming sequence is read back with a [`BackwardChunkedReader`] into a
//!   fresh region. Up to `small_sequence_threshold` values are accumulated in
//!   memory first; if the whole sequence fits there and within
//!   `raw_threshold`, it is stored raw. Anything larger is streamed through a
//!   gzip encoder. The forward-order region is released afterwards.
//!
//! Either way the sealed region holds the values in replay order, so replay
//! is a single forward scan.
//!
//! A storage error while spilling, streaming or sealing moves the sequence to
//! a failed state instead. Its regions are released and every later `trace`,
//! `seal` or header request reports [`TraceError::SequenceFailed`].

use std::{
    io::{BufWriter, Write},
    mem,
    sync::Arc,
};

use bslice_common::{TraceConfig, ValueKind};
use flate2::{write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{
    value::encode_all, BackwardChunkedReader, Encoding, HeaderEntry, MultiplexedStore, RegionId,
    RegionReader, RegionWriter, SharedStore, StorageRecord, TraceError, TraceResult, TraceValue,
};

/// Counters describing one sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStats {
    /// Kind of the values, `None` for disabled sequences
    pub kind: Option<ValueKind>,
    /// Number of values recorded
    pub values: u64,
    /// Whether the sequence outgrew its in-memory buffer
    pub spilled: bool,
    /// Encoding chosen at seal time
    pub encoding: Option<Encoding>,
    /// Size of the sealed region in bytes
    pub stored_bytes: u64,
}

enum State<V> {
    /// Values still held in memory
    Buffered(Vec<V>),
    /// Values written through to a forward-order region
    Streaming { region: RegionId, pending: Vec<u8> },
    /// `None` when the sequence was empty and owns no region
    Sealed(Option<StorageRecord>),
    /// A storage error lost values; the sequence owns no region
    Failed,
}

/// An append-only sequence of values of one kind
pub struct ValueSequence<V: TraceValue> {
    store: SharedStore,
    config: Arc<TraceConfig>,
    state: State<V>,
    stats: SequenceStats,
}

impl<V: TraceValue> std::fmt::Debug for ValueSequence<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueSequence")
            .field("kind", &V::KIND)
            .field("sealed", &self.is_sealed())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<V: TraceValue> ValueSequence<V> {
    /// Create an open, empty sequence
    pub fn new(store: SharedStore, config: Arc<TraceConfig>) -> Self {
        Self {
            store,
            config,
            state: State::Buffered(Vec::new()),
            stats: SequenceStats { kind: Some(V::KIND), ..Default::default() },
        }
    }

    /// Whether [`Self::seal`] has completed
    pub fn is_sealed(&self) -> bool {
        matches!(self.state, State::Sealed(_))
    }

    /// Whether a storage error made the sequence unusable
    pub fn is_failed(&self) -> bool {
        matches!(self.state, State::Failed)
    }

    /// Counters of the sequence
    pub fn stats(&self) -> SequenceStats {
        self.stats
    }

    /// Placement of the sealed sequence, `None` while open or when empty
    pub fn record(&self) -> Option<StorageRecord> {
        match self.state {
            State::Sealed(record) => record,
            _ => None,
        }
    }

    /// Append a value.
    ///
    /// The first append past `buffer_threshold` moves the buffered prefix to a
    /// freshly allocated region; from then on values are written through in
    /// `write_buffer_size` batches. A storage error on either path fails the
    /// sequence: the values recorded so far are lost and every later call
    /// reports [`TraceError::SequenceFailed`].
    pub fn trace(&mut self, value: V) -> TraceResult<()> {
        match &mut self.state {
            State::Buffered(values) => {
                values.push(value);
                if values.len() > self.config.buffer_threshold {
                    let bytes = encode_all(values.iter().copied());
                    let region = match self.spill(&bytes) {
                        Ok(region) => region,
                        Err(err) => {
                            self.fail(None, &err);
                            return Err(err);
                        }
                    };
                    trace!(kind = %V::KIND, region = %region, "trace sequence switched to storage");
                    self.stats.spilled = true;
                    self.state = State::Streaming {
                        region,
                        pending: Vec::with_capacity(self.config.write_buffer_size),
                    };
                }
            }
            State::Streaming { region, pending } => {
                value.write_to(pending)?;
                if pending.len() >= self.config.write_buffer_size {
                    let region = *region;
                    let flushed = self.store.append(region, pending);
                    pending.clear();
                    if let Err(err) = flushed {
                        self.fail(Some(region), &err);
                        return Err(err);
                    }
                }
            }
            State::Sealed(_) => return Err(TraceError::SequenceSealed),
            State::Failed => return Err(TraceError::SequenceFailed),
        }
        self.stats.values += 1;
        Ok(())
    }

    /// Reorder the values for backward replay and commit the storage record.
    ///
    /// A sequence that never left memory is reversed in memory and written
    /// raw. A streaming sequence is read back chunk by chunk into a new
    /// region, raw or gzip-compressed depending on its size, and its
    /// forward-order region is released.
    ///
    /// Returns `None` for an empty sequence, which owns no region. Sealing
    /// twice is reported as [`TraceError::SequenceSealed`]. If storage fails
    /// part way, every region the sequence owned is released and the
    /// sequence is left failed, so it can never be mistaken for an empty one.
    pub fn seal(&mut self) -> TraceResult<Option<StorageRecord>> {
        let record = match mem::replace(&mut self.state, State::Failed) {
            State::Sealed(previous) => {
                self.state = State::Sealed(previous);
                return Err(TraceError::SequenceSealed);
            }
            State::Failed => return Err(TraceError::SequenceFailed),
            State::Buffered(values) if values.is_empty() => None,
            State::Buffered(values) => Some(self.seal_buffered(&values)),
            State::Streaming { region, pending } => Some(self.seal_streaming(region, &pending)),
        };

        let record = match record.transpose().and_then(|record| self.measure(record)) {
            Ok(record) => record,
            Err(err) => {
                self.fail(None, &err);
                return Err(err);
            }
        };
        self.state = State::Sealed(record);

        debug!(
            kind = %V::KIND,
            values = self.stats.values,
            spilled = self.stats.spilled,
            encoding = ?self.stats.encoding,
            stored_bytes = self.stats.stored_bytes,
            "sealed trace sequence"
        );
        Ok(record)
    }

    /// Header entry of the sealed sequence
    pub fn header_entry(&self) -> TraceResult<HeaderEntry> {
        match self.state {
            State::Sealed(Some(record)) => Ok(HeaderEntry::Stored(record)),
            State::Sealed(None) => Ok(HeaderEntry::Disabled),
            State::Failed => Err(TraceError::SequenceFailed),
            State::Buffered(_) | State::Streaming { .. } => Err(TraceError::SequenceOpen),
        }
    }

    /// Move the buffered prefix into a new region
    fn spill(&self, bytes: &[u8]) -> TraceResult<RegionId> {
        let region = self.store.allocate_region()?;
        if let Err(err) = self.store.append(region, bytes) {
            self.discard(region);
            return Err(err);
        }
        Ok(region)
    }

    fn seal_buffered(&self, values: &[V]) -> TraceResult<StorageRecord> {
        let region = self.store.allocate_region()?;
        if let Err(err) = self.store.append(region, &encode_all(values.iter().rev().copied())) {
            self.discard(region);
            return Err(err);
        }
        Ok(StorageRecord { kind: V::KIND, encoding: Encoding::Raw, region })
    }

    fn seal_streaming(&self, forward: RegionId, pending: &[u8]) -> TraceResult<StorageRecord> {
        let flushed =
            if pending.is_empty() { Ok(()) } else { self.store.append(forward, pending) };
        let record = match flushed.and_then(|()| self.reverse_region(forward)) {
            Ok(record) => record,
            Err(err) => {
                self.discard(forward);
                return Err(err);
            }
        };
        if let Err(err) = self.store.release(forward) {
            self.discard(record.region);
            return Err(err);
        }
        Ok(record)
    }

    /// Record the sealed size, dropping the region if it cannot be measured
    fn measure(&mut self, record: Option<StorageRecord>) -> TraceResult<Option<StorageRecord>> {
        if let Some(record) = record {
            match self.store.region_len(record.region) {
                Ok(bytes) => {
                    self.stats.encoding = Some(record.encoding);
                    self.stats.stored_bytes = bytes;
                }
                Err(err) => {
                    self.discard(record.region);
                    return Err(err);
                }
            }
        }
        Ok(record)
    }

    /// Copy a forward-order region backwards into a fresh region
    fn reverse_region(&self, forward: RegionId) -> TraceResult<StorageRecord> {
        let store: &dyn MultiplexedStore = self.store.as_ref();
        let chunk_size = self.config.backward_chunk_size;
        let reader = BackwardChunkedReader::<V>::over_region(store, forward, chunk_size)?;
        let reversed = store.allocate_region()?;
        match self.write_reversed(reader, reversed) {
            Ok(encoding) => Ok(StorageRecord { kind: V::KIND, encoding, region: reversed }),
            Err(err) => {
                self.discard(reversed);
                Err(err)
            }
        }
    }

    fn write_reversed(
        &self,
        mut reader: BackwardChunkedReader<V, Box<dyn RegionReader>>,
        reversed: RegionId,
    ) -> TraceResult<Encoding> {
        let store: &dyn MultiplexedStore = self.store.as_ref();

        let mut head = Vec::new();
        if reader.remaining() <= self.config.small_sequence_threshold as u64 {
            head = reader.by_ref().collect::<TraceResult<Vec<V>>>()?;
            if head.len() <= self.config.raw_threshold {
                store.append(reversed, &encode_all(head.into_iter()))?;
                reader.close();
                return Ok(Encoding::Raw);
            }
        }

        let sink = BufWriter::with_capacity(
            self.config.write_buffer_size,
            RegionWriter::new(store, reversed),
        );
        let mut encoder = GzEncoder::new(sink, Compression::new(self.config.compression_level));
        for value in head {
            value.write_to(&mut encoder)?;
        }
        for value in reader {
            value?.write_to(&mut encoder)?;
        }
        encoder.finish()?.into_inner().map_err(|err| err.into_error())?;
        Ok(Encoding::Compressed)
    }

    /// Give up on the sequence after a storage error
    fn fail(&mut self, region: Option<RegionId>, err: &TraceError) {
        self.state = State::Failed;
        if let Some(region) = region {
            self.discard(region);
        }
        warn!(kind = %V::KIND, values = self.stats.values, %err, "trace sequence failed");
    }

    /// Release a region on an error path; the original error wins
    fn discard(&self, region: RegionId) {
        if let Err(err) = self.store.release(region) {
            warn!(region = %region, %err, "could not release region of a failed sequence");
        }
    }
}

/// A trace sequence of either kind, or the no-op sequence
#[derive(Debug)]
pub enum TraceSequence {
    /// Discards everything; seals to a disabled header entry
    Disabled,
    /// 32-bit values
    Int(ValueSequence<i32>),
    /// 64-bit values
    Long(ValueSequence<i64>),
}

impl TraceSequence {
    /// Create an open sequence of `kind`
    pub fn open(kind: ValueKind, store: SharedStore, config: Arc<TraceConfig>) -> Self {
        match kind {
            ValueKind::Int => Self::Int(ValueSequence::new(store, config)),
            ValueKind::Long => Self::Long(ValueSequence::new(store, config)),
        }
    }

    /// Kind of the sequence, `None` when disabled
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Disabled => None,
            Self::Int(_) => Some(ValueKind::Int),
            Self::Long(_) => Some(ValueKind::Long),
        }
    }

    /// Whether this is the no-op sequence
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Append a 32-bit value
    pub fn trace_int(&mut self, value: i32) -> TraceResult<()> {
        match self {
            Self::Disabled => Ok(()),
            Self::Int(seq) => seq.trace(value),
            Self::Long(_) => {
                Err(TraceError::KindMismatch { expected: ValueKind::Long, actual: ValueKind::Int })
            }
        }
    }

    /// Append a 64-bit value
    pub fn trace_long(&mut self, value: i64) -> TraceResult<()> {
        match self {
            Self::Disabled => Ok(()),
            Self::Long(seq) => seq.trace(value),
            Self::Int(_) => {
                Err(TraceError::KindMismatch { expected: ValueKind::Int, actual: ValueKind::Long })
            }
        }
    }

    /// Whether the sequence no longer accepts values
    ///
    /// The no-op sequence never counts as sealed, so sealing it stays a no-op.
    pub fn is_sealed(&self) -> bool {
        match self {
            Self::Disabled => false,
            Self::Int(seq) => seq.is_sealed(),
            Self::Long(seq) => seq.is_sealed(),
        }
    }

    /// Seal the sequence; a no-op for the disabled sequence
    pub fn seal(&mut self) -> TraceResult<()> {
        match self {
            Self::Disabled => Ok(()),
            Self::Int(seq) => seq.seal().map(drop),
            Self::Long(seq) => seq.seal().map(drop),
        }
    }

    /// Header entry of the sealed sequence
    ///
    /// Only the no-op sequence and a sealed empty sequence produce
    /// [`HeaderEntry::Disabled`]; a failed sequence reports
    /// [`TraceError::SequenceFailed`].
    pub fn header_entry(&self) -> TraceResult<HeaderEntry> {
        match self {
            Self::Disabled => Ok(HeaderEntry::Disabled),
            Self::Int(seq) => seq.header_entry(),
            Self::Long(seq) => seq.header_entry(),
        }
    }

    /// Counters of the sequence
    pub fn stats(&self) -> SequenceStats {
        match self {
            Self::Disabled => SequenceStats::default(),
            Self::Int(seq) => seq.stats(),
            Self::Long(seq) => seq.stats(),
        }
    }
}
