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

//! Replay of sealed sequences, most recent value first.

use std::{
    io::{BufReader, ErrorKind},
    marker::PhantomData,
};

use bslice_common::ValueKind;
use flate2::read::GzDecoder;

use crate::{
    value::read_value_or_eof, Encoding, HeaderEntry, MultiplexedStore, RegionReader, TraceError,
    TraceResult, TraceValue,
};

enum Source {
    Empty,
    Raw(BufReader<Box<dyn RegionReader>>),
    Compressed(GzDecoder<BufReader<Box<dyn RegionReader>>>),
}

/// Lazy iterator over the values of a sealed sequence in replay order
///
/// Corrupt or truncated payloads are reported as an `Err` item, after which
/// the iterator ends.
pub struct ReplayValues<V: TraceValue> {
    source: Source,
    yielded: u64,
    _marker: PhantomData<V>,
}

impl<V: TraceValue> std::fmt::Debug for ReplayValues<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            Source::Empty => "empty",
            Source::Raw(_) => "raw",
            Source::Compressed(_) => "compressed",
        };
        f.debug_struct("ReplayValues")
            .field("kind", &V::KIND)
            .field("source", &source)
            .field("yielded", &self.yielded)
            .finish()
    }
}

impl<V: TraceValue> ReplayValues<V> {
    fn new(source: Source) -> Self {
        Self { source, yielded: 0, _marker: PhantomData }
    }

    /// An iterator yielding nothing
    pub fn empty() -> Self {
        Self::new(Source::Empty)
    }

    /// Number of values yielded so far
    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    fn read_next(&mut self) -> TraceResult<Option<V>> {
        match &mut self.source {
            Source::Empty => Ok(None),
            Source::Raw(input) => read_value_or_eof(input),
            Source::Compressed(input) => read_value_or_eof(input).map_err(corrupt_payload),
        }
    }
}

/// gzip reports malformed payloads as I/O errors of these kinds.
fn corrupt_payload(err: TraceError) -> TraceError {
    match err {
        TraceError::StorageIo(io)
            if matches!(
                io.kind(),
                ErrorKind::InvalidData | ErrorKind::InvalidInput | ErrorKind::UnexpectedEof
            ) =>
        {
            TraceError::CorruptSequence(io.to_string())
        }
        TraceError::TruncatedSequence(n) => {
            TraceError::CorruptSequence(format!("payload ends inside a value ({n} trailing bytes)"))
        }
        other => other,
    }
}

impl<V: TraceValue> Iterator for ReplayValues<V> {
    type Item = TraceResult<V>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(value)) => {
                self.yielded += 1;
                Some(Ok(value))
            }
            Ok(None) => {
                self.source = Source::Empty;
                None
            }
            Err(err) => {
                self.source = Source::Empty;
                Some(Err(err))
            }
        }
    }
}

/// Open a sealed sequence for replay
///
/// Disabled entries replay as empty. Entries with an unknown tag fail with
/// [`TraceError::UnsupportedEncoding`] and entries of another kind with
/// [`TraceError::KindMismatch`].
pub fn replay_sequence<V: TraceValue>(
    store: &dyn MultiplexedStore,
    entry: &HeaderEntry,
) -> TraceResult<ReplayValues<V>> {
    let record = match entry {
        HeaderEntry::Disabled => return Ok(ReplayValues::empty()),
        HeaderEntry::Unsupported { tag, .. } => return Err(TraceError::UnsupportedEncoding(*tag)),
        HeaderEntry::Stored(record) => record,
    };
    if record.kind != V::KIND {
        return Err(TraceError::KindMismatch { expected: record.kind, actual: V::KIND });
    }

    let source = match record.encoding {
        Encoding::Raw => {
            let len = store.region_len(record.region)?;
            if len % V::WIDTH as u64 != 0 {
                return Err(TraceError::MisalignedRegion {
                    region: record.region,
                    len,
                    kind: V::KIND,
                });
            }
            Source::Raw(BufReader::new(store.reader(record.region, 0)?))
        }
        Encoding::Compressed => {
            Source::Compressed(GzDecoder::new(BufReader::new(store.reader(record.region, 0)?)))
        }
    };
    Ok(ReplayValues::new(source))
}

/// Replayed values of either kind, widened to `i64`
#[derive(Debug)]
pub enum WidenedValues {
    /// Replay of a 32-bit sequence
    Int(ReplayValues<i32>),
    /// Replay of a 64-bit sequence
    Long(ReplayValues<i64>),
}

impl Iterator for WidenedValues {
    type Item = TraceResult<i64>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Int(values) => values.next().map(|v| v.map(i64::from)),
            Self::Long(values) => values.next(),
        }
    }
}

/// Open any entry for replay without knowing its kind up front
pub fn replay_widened(
    store: &dyn MultiplexedStore,
    entry: &HeaderEntry,
) -> TraceResult<WidenedValues> {
    let kind = match entry {
        HeaderEntry::Stored(record) => record.kind,
        _ => ValueKind::Long,
    };
    Ok(match kind {
        ValueKind::Int => WidenedValues::Int(replay_sequence(store, entry)?),
        ValueKind::Long => WidenedValues::Long(replay_sequence(store, entry)?),
    })
}
