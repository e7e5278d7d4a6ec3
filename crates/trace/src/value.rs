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

//! Fixed-width value encoding
//!
//! Values are stored big-endian, one after the other, with no framing. A
//! region holding `K` values of kind `k` is exactly `K * k.width()` bytes long.

use std::{
    fmt,
    io::{self, ErrorKind, Read, Write},
};

use bslice_common::ValueKind;
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use crate::{TraceError, TraceResult};

/// Largest width of any [`TraceValue`]
pub const MAX_VALUE_WIDTH: usize = 8;

/// A primitive value that can be recorded into a trace sequence
pub trait TraceValue:
    Copy + Default + fmt::Debug + fmt::Display + PartialEq + Send + Sync + 'static
{
    /// Kind tag of sequences holding this value type
    const KIND: ValueKind;

    /// Encoded width in bytes
    const WIDTH: usize;

    /// Encode one value
    fn write_to<W: Write + ?Sized>(self, out: &mut W) -> io::Result<()>;

    /// Fill `dst` with consecutive values decoded from `input`
    fn read_into<R: Read + ?Sized>(input: &mut R, dst: &mut [Self]) -> io::Result<()>;

    /// Decode one value from exactly [`Self::WIDTH`] bytes
    fn decode(bytes: &[u8]) -> Self;
}

impl TraceValue for i32 {
    const KIND: ValueKind = ValueKind::Int;
    const WIDTH: usize = 4;

    fn write_to<W: Write + ?Sized>(self, out: &mut W) -> io::Result<()> {
        out.write_i32::<BigEndian>(self)
    }

    fn read_into<R: Read + ?Sized>(input: &mut R, dst: &mut [Self]) -> io::Result<()> {
        input.read_i32_into::<BigEndian>(dst)
    }

    fn decode(bytes: &[u8]) -> Self {
        BigEndian::read_i32(bytes)
    }
}

impl TraceValue for i64 {
    const KIND: ValueKind = ValueKind::Long;
    const WIDTH: usize = 8;

    fn write_to<W: Write + ?Sized>(self, out: &mut W) -> io::Result<()> {
        out.write_i64::<BigEndian>(self)
    }

    fn read_into<R: Read + ?Sized>(input: &mut R, dst: &mut [Self]) -> io::Result<()> {
        input.read_i64_into::<BigEndian>(dst)
    }

    fn decode(bytes: &[u8]) -> Self {
        BigEndian::read_i64(bytes)
    }
}

/// Read the next value of a forward stream, or `None` at a clean end.
///
/// A stream that ends inside a value is reported as
/// [`TraceError::TruncatedSequence`] rather than silently dropped.
pub(crate) fn read_value_or_eof<V: TraceValue, R: Read + ?Sized>(
    input: &mut R,
) -> TraceResult<Option<V>> {
    let mut buf = [0u8; MAX_VALUE_WIDTH];
    let buf = &mut buf[..V::WIDTH];
    let mut filled = 0;
    while filled < V::WIDTH {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(None),
        n if n == V::WIDTH => Ok(Some(V::decode(buf))),
        n => Err(TraceError::TruncatedSequence(n)),
    }
}

/// Encode `values` into a freshly allocated byte vector
pub(crate) fn encode_all<V: TraceValue>(values: impl Iterator<Item = V>) -> Vec<u8> {
    let (lower, _) = values.size_hint();
    let mut bytes = Vec::with_capacity(lower * V::WIDTH);
    for value in values {
        // Writing into a Vec cannot fail.
        let _ = value.write_to(&mut bytes);
    }
    bytes
}
