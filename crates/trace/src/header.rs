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

//! Per-thread trace header
//!
//! The header tells the replay side where every sequence of a thread lives:
//!
//! ```text
//! header := count:leb128 entry*
//! entry  := 0x00                      ; disabled, carries no data
//!         | tag:u8 region:u32be       ; tag = kind bits | compressed bit
//! ```
//!
//! | tag    | meaning          |
//! |--------|------------------|
//! | `0x02` | int, raw         |
//! | `0x03` | int, compressed  |
//! | `0x04` | long, raw        |
//! | `0x05` | long, compressed |
//!
//! A disabled factory writes a header with zero entries, i.e. the single
//! byte `0x00`. Unknown non-zero tags are still followed by a region id, so
//! the entries after them remain decodable.

use std::{
    fmt,
    io::{self, ErrorKind, Read, Write},
};

use bslice_common::ValueKind;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::{RegionId, TraceError, TraceResult};

/// Tag byte of a disabled (or empty) sequence
pub const TAG_DISABLED: u8 = 0x00;
const TAG_INT: u8 = 0x02;
const TAG_LONG: u8 = 0x04;
const TAG_COMPRESSED_BIT: u8 = 0x01;

/// How the values of a sealed sequence are laid out in their region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Fixed-width big-endian values, most recent first
    Raw,
    /// A gzip stream of the raw encoding
    Compressed,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("raw"),
            Self::Compressed => f.write_str("compressed"),
        }
    }
}

/// Placement of a sealed sequence: kind, encoding and storage region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageRecord {
    /// Kind of the stored values
    pub kind: ValueKind,
    /// Layout of the region
    pub encoding: Encoding,
    /// Region holding the reversed values
    pub region: RegionId,
}

impl StorageRecord {
    /// Tag byte written for this record
    pub fn tag(&self) -> u8 {
        let kind_bits = match self.kind {
            ValueKind::Int => TAG_INT,
            ValueKind::Long => TAG_LONG,
        };
        match self.encoding {
            Encoding::Raw => kind_bits,
            Encoding::Compressed => kind_bits | TAG_COMPRESSED_BIT,
        }
    }

    /// Decode the kind and encoding carried by a non-disabled tag
    pub fn from_tag(tag: u8, region: RegionId) -> TraceResult<Self> {
        let kind = match tag & !TAG_COMPRESSED_BIT {
            TAG_INT => ValueKind::Int,
            TAG_LONG => ValueKind::Long,
            _ => return Err(TraceError::UnsupportedEncoding(tag)),
        };
        let encoding =
            if tag & TAG_COMPRESSED_BIT != 0 { Encoding::Compressed } else { Encoding::Raw };
        Ok(Self { kind, encoding, region })
    }
}

/// One entry of a per-thread header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderEntry {
    /// The sequence carries no data and replays as empty
    Disabled,
    /// The sequence is stored in a region
    Stored(StorageRecord),
    /// A tag this version does not understand; replaying it fails
    Unsupported {
        /// The raw tag byte
        tag: u8,
        /// The region reference that followed it
        region: RegionId,
    },
}

impl HeaderEntry {
    /// Tag byte of the entry
    pub fn tag(&self) -> u8 {
        match self {
            Self::Disabled => TAG_DISABLED,
            Self::Stored(record) => record.tag(),
            Self::Unsupported { tag, .. } => *tag,
        }
    }

    /// Region referenced by the entry, if any
    pub fn region(&self) -> Option<RegionId> {
        match self {
            Self::Disabled => None,
            Self::Stored(record) => Some(record.region),
            Self::Unsupported { region, .. } => Some(*region),
        }
    }

    /// Write the entry
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        out.write_u8(self.tag())?;
        if let Some(region) = self.region() {
            out.write_u32::<BigEndian>(region.0)?;
        }
        Ok(())
    }

    /// Read one entry
    pub fn read_from<R: Read + ?Sized>(input: &mut R) -> TraceResult<Self> {
        let tag = input.read_u8().map_err(header_eof)?;
        if tag == TAG_DISABLED {
            return Ok(Self::Disabled);
        }
        let region = RegionId(input.read_u32::<BigEndian>().map_err(header_eof)?);
        Ok(match StorageRecord::from_tag(tag, region) {
            Ok(record) => Self::Stored(record),
            Err(_) => Self::Unsupported { tag, region },
        })
    }
}

/// Write a whole per-thread header
pub fn write_thread_header<W: Write + ?Sized>(
    out: &mut W,
    entries: &[HeaderEntry],
) -> io::Result<()> {
    write_leb128(out, entries.len() as u64)?;
    for entry in entries {
        entry.write_to(out)?;
    }
    Ok(())
}

/// Read a whole per-thread header
pub fn read_thread_header<R: Read + ?Sized>(input: &mut R) -> TraceResult<Vec<HeaderEntry>> {
    let count = read_leb128(input)?;
    let count = usize::try_from(count)
        .map_err(|_| TraceError::MalformedHeader(format!("entry count {count} is too large")))?;
    // The count is untrusted; let the vector grow as entries actually decode.
    let mut entries = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        entries.push(HeaderEntry::read_from(input)?);
    }
    Ok(entries)
}

fn header_eof(err: io::Error) -> TraceError {
    if err.kind() == ErrorKind::UnexpectedEof {
        TraceError::MalformedHeader("unexpected end of header".to_string())
    } else {
        TraceError::StorageIo(err)
    }
}

fn write_leb128<W: Write + ?Sized>(out: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            return out.write_u8(byte);
        }
        out.write_u8(byte | 0x80)?;
    }
}

fn read_leb128<R: Read + ?Sized>(input: &mut R) -> TraceResult<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = input.read_u8().map_err(header_eof)?;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(TraceError::MalformedHeader("entry count overflows 64 bits".to_string()))
}
