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

//! In-memory multiplexed store.

use std::{
    collections::HashMap,
    io::Cursor,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;
use tracing::trace;

use super::{MultiplexedStore, RegionId, RegionReader};
use crate::{TraceError, TraceResult};

/// Bytes of one region, shared with the readers opened on it
#[derive(Debug, Clone, Default)]
struct RegionBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for RegionBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A [`MultiplexedStore`] that keeps all regions in memory
///
/// Readers work on a snapshot of the region taken when they are opened.
#[derive(Debug, Default)]
pub struct MemoryStore {
    regions: RwLock<HashMap<RegionId, RegionBytes>>,
    next_id: AtomicU32,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (allocated and not yet released) regions
    pub fn region_count(&self) -> usize {
        self.regions.read().len()
    }

    /// Total number of bytes held by live regions
    pub fn total_bytes(&self) -> u64 {
        self.regions.read().values().map(|r| r.0.len() as u64).sum()
    }

    /// Copy of a region's content
    pub fn region_bytes(&self, region: RegionId) -> TraceResult<Vec<u8>> {
        self.regions
            .read()
            .get(&region)
            .map(|r| r.0.as_ref().clone())
            .ok_or(TraceError::UnknownRegion(region))
    }

    /// Overwrite a region's content
    pub fn replace_region(&self, region: RegionId, bytes: Vec<u8>) -> TraceResult<()> {
        let mut regions = self.regions.write();
        let slot = regions.get_mut(&region).ok_or(TraceError::UnknownRegion(region))?;
        *slot = RegionBytes(Arc::new(bytes));
        Ok(())
    }
}

impl MultiplexedStore for MemoryStore {
    fn allocate_region(&self) -> TraceResult<RegionId> {
        let id = RegionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.regions.write().insert(id, RegionBytes::default());
        trace!(region = %id, "allocated in-memory region");
        Ok(id)
    }

    fn append(&self, region: RegionId, bytes: &[u8]) -> TraceResult<()> {
        let mut regions = self.regions.write();
        let slot = regions.get_mut(&region).ok_or(TraceError::UnknownRegion(region))?;
        Arc::make_mut(&mut slot.0).extend_from_slice(bytes);
        Ok(())
    }

    fn region_len(&self, region: RegionId) -> TraceResult<u64> {
        self.regions
            .read()
            .get(&region)
            .map(|r| r.0.len() as u64)
            .ok_or(TraceError::UnknownRegion(region))
    }

    fn reader(&self, region: RegionId, start_offset: u64) -> TraceResult<Box<dyn RegionReader>> {
        let bytes =
            self.regions.read().get(&region).cloned().ok_or(TraceError::UnknownRegion(region))?;
        let mut cursor = Cursor::new(bytes);
        cursor.set_position(start_offset);
        Ok(Box::new(cursor))
    }

    fn release(&self, region: RegionId) -> TraceResult<()> {
        self.regions.write().remove(&region).ok_or(TraceError::UnknownRegion(region))?;
        trace!(region = %region, "released in-memory region");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};

    #[test]
    fn test_regions_are_independent() {
        let store = MemoryStore::new();
        let a = store.allocate_region().unwrap();
        let b = store.allocate_region().unwrap();
        assert_ne!(a, b);

        store.append(a, b"hello").unwrap();
        store.append(b, b"xy").unwrap();
        store.append(a, b" world").unwrap();

        assert_eq!(store.region_len(a).unwrap(), 11);
        assert_eq!(store.region_len(b).unwrap(), 2);
        assert_eq!(store.total_bytes(), 13);
    }

    #[test]
    fn test_reader_starts_at_offset_and_seeks() {
        let store = MemoryStore::new();
        let region = store.allocate_region().unwrap();
        store.append(region, b"0123456789").unwrap();

        let mut reader = store.reader(region, 4).unwrap();
        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"456");

        reader.seek(SeekFrom::Start(1)).unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"123");
    }

    #[test]
    fn test_reader_is_a_snapshot() {
        let store = MemoryStore::new();
        let region = store.allocate_region().unwrap();
        store.append(region, b"abc").unwrap();

        let mut reader = store.reader(region, 0).unwrap();
        store.append(region, b"def").unwrap();

        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"abc");
        assert_eq!(store.region_bytes(region).unwrap(), b"abcdef");
    }

    #[test]
    fn test_release_forgets_region() {
        let store = MemoryStore::new();
        let region = store.allocate_region().unwrap();
        store.release(region).unwrap();

        assert_eq!(store.region_count(), 0);
        assert!(matches!(store.append(region, b"x"), Err(TraceError::UnknownRegion(_))));
        assert!(matches!(store.release(region), Err(TraceError::UnknownRegion(_))));
    }
}
