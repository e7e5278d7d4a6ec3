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

//! Errors raised while recording, sealing or replaying trace sequences.

use std::io;

use bslice_common::ValueKind;
use thiserror::Error;

use crate::RegionId;

/// Result alias used throughout the trace store
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors that can occur while recording, sealing or replaying a sequence.
///
/// Every variant is fatal to the sequence it was raised for. Other sequences
/// of the same trace stay usable.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Allocation, read, write or seek failure against the storage collaborator
    #[error("storage I/O failed: {0}")]
    StorageIo(#[from] io::Error),

    /// A value was appended to, or a reseal attempted on, a sealed sequence
    #[error("trace sequence is already sealed")]
    SequenceSealed,

    /// A storage error cost the sequence some of its values
    #[error("trace sequence failed after a storage error; its values are lost")]
    SequenceFailed,

    /// The header of a sequence was requested before the sequence was sealed
    #[error("trace sequence has not been sealed yet")]
    SequenceOpen,

    /// A header tag this reader does not understand
    #[error("unsupported sequence encoding tag {0:#04x}")]
    UnsupportedEncoding(u8),

    /// The storage collaborator does not know the region
    #[error("unknown storage region {0}")]
    UnknownRegion(RegionId),

    /// A value of one kind was traced into a sequence of another kind
    #[error("cannot record a {actual} value into a {expected} sequence")]
    KindMismatch {
        /// Kind of the sequence
        expected: ValueKind,
        /// Kind of the value that was traced
        actual: ValueKind,
    },

    /// A raw region whose length is not a multiple of the value width
    #[error("region {region} holds {len} bytes, not a multiple of the {kind} width")]
    MisalignedRegion {
        /// The offending region
        region: RegionId,
        /// Its length in bytes
        len: u64,
        /// Kind the region was expected to contain
        kind: ValueKind,
    },

    /// A sequence ended in the middle of a value
    #[error("sequence ends inside a value ({0} trailing bytes)")]
    TruncatedSequence(usize),

    /// A compressed sequence whose payload does not decode
    #[error("corrupt compressed sequence: {0}")]
    CorruptSequence(String),

    /// The per-thread header could not be decoded
    #[error("malformed trace header: {0}")]
    MalformedHeader(String),

    /// The trace directory manifest could not be read or written
    #[error("malformed trace manifest: {0}")]
    MalformedManifest(String),
}

impl TraceError {
    /// Whether the error reports an I/O failure of the storage collaborator
    pub fn is_storage_io(&self) -> bool {
        matches!(self, Self::StorageIo(_))
    }
}
