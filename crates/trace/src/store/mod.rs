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

//! Multiplexed storage
//!
//! A [`MultiplexedStore`] presents many independent append-only byte regions,
//! each readable at random offsets. Trace sequences only ever append to a
//! region while recording, and only read it after it has been sealed, so the
//! store never has to reconcile concurrent readers and writers of one region.
//!
//! Two implementations are provided:
//! - [`MemoryStore`] keeps every region in memory
//! - [`DirectoryStore`] keeps one file per region under a root directory

mod directory;
mod memory;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

use std::{
    fmt,
    io::{self, Read, Seek, Write},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::TraceResult;

/// Identifier of one region inside a multiplexed store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A seekable reader over one region
pub trait RegionReader: Read + Seek + Send {}

impl<T: Read + Seek + Send> RegionReader for T {}

/// Storage collaborator of the trace store
///
/// Implementations must be safe to share between recording threads; each
/// region, however, is only ever touched by the thread owning its sequence.
pub trait MultiplexedStore: Send + Sync + fmt::Debug {
    /// Allocate a fresh, empty region
    fn allocate_region(&self) -> TraceResult<RegionId>;

    /// Append bytes at the end of a region
    fn append(&self, region: RegionId, bytes: &[u8]) -> TraceResult<()>;

    /// Current length of a region in bytes
    fn region_len(&self, region: RegionId) -> TraceResult<u64>;

    /// Open a reader positioned at `start_offset` within the region
    fn reader(&self, region: RegionId, start_offset: u64) -> TraceResult<Box<dyn RegionReader>>;

    /// Release a region; its id must not be used afterwards
    fn release(&self, region: RegionId) -> TraceResult<()>;
}

/// Shared handle to a store, as held by factories and sequences
pub type SharedStore = Arc<dyn MultiplexedStore>;

/// [`Write`] adapter appending to one region
///
/// Every `write` call becomes one [`MultiplexedStore::append`]; wrap it in a
/// `BufWriter` when writing many small pieces.
pub struct RegionWriter<'a> {
    store: &'a dyn MultiplexedStore,
    region: RegionId,
    written: u64,
}

impl<'a> RegionWriter<'a> {
    /// Create a writer appending to `region`
    pub fn new(store: &'a dyn MultiplexedStore, region: RegionId) -> Self {
        Self { store, region, written: 0 }
    }

    /// Number of bytes appended through this writer
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Write for RegionWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.store.append(self.region, buf).map_err(into_io)?;
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Carry a store error through an `io::Write` boundary.
fn into_io(err: crate::TraceError) -> io::Error {
    match err {
        crate::TraceError::StorageIo(io) => io,
        other => io::Error::other(other),
    }
}
