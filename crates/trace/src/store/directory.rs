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

//! File-backed multiplexed store: one file per region.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufReader, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU32, Ordering},
};

use tracing::{debug, trace};

use super::{MultiplexedStore, RegionId, RegionReader};
use crate::{TraceError, TraceResult};

const REGION_PREFIX: &str = "region-";
const REGION_SUFFIX: &str = ".bin";

/// A [`MultiplexedStore`] persisting each region as `region-<id>.bin`
///
/// Opening an existing directory keeps its regions readable and continues
/// allocating after the highest id found.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    next_id: AtomicU32,
}

impl DirectoryStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> TraceResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let mut next_id = 0;
        for entry in fs::read_dir(&root)? {
            let name = entry?.file_name();
            if let Some(id) = name.to_str().and_then(parse_region_file_name) {
                next_id = next_id.max(id + 1);
            }
        }

        debug!(root = %root.display(), next_id, "opened directory store");
        Ok(Self { root, next_id: AtomicU32::new(next_id) })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `region`
    pub fn region_path(&self, region: RegionId) -> PathBuf {
        self.root.join(format!("{REGION_PREFIX}{}{REGION_SUFFIX}", region.0))
    }

    fn existing_region_path(&self, region: RegionId) -> TraceResult<PathBuf> {
        let path = self.region_path(region);
        if path.is_file() {
            Ok(path)
        } else {
            Err(TraceError::UnknownRegion(region))
        }
    }
}

fn parse_region_file_name(name: &str) -> Option<u32> {
    name.strip_prefix(REGION_PREFIX)?.strip_suffix(REGION_SUFFIX)?.parse().ok()
}

fn not_found_as_unknown(region: RegionId) -> impl FnOnce(io::Error) -> TraceError {
    move |err| match err.kind() {
        io::ErrorKind::NotFound => TraceError::UnknownRegion(region),
        _ => TraceError::StorageIo(err),
    }
}

impl MultiplexedStore for DirectoryStore {
    fn allocate_region(&self) -> TraceResult<RegionId> {
        let id = RegionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        OpenOptions::new().write(true).create_new(true).open(self.region_path(id))?;
        trace!(region = %id, "allocated region file");
        Ok(id)
    }

    fn append(&self, region: RegionId, bytes: &[u8]) -> TraceResult<()> {
        let path = self.existing_region_path(region)?;
        let mut file =
            OpenOptions::new().append(true).open(path).map_err(not_found_as_unknown(region))?;
        file.write_all(bytes)?;
        Ok(())
    }

    fn region_len(&self, region: RegionId) -> TraceResult<u64> {
        let metadata =
            fs::metadata(self.region_path(region)).map_err(not_found_as_unknown(region))?;
        Ok(metadata.len())
    }

    fn reader(&self, region: RegionId, start_offset: u64) -> TraceResult<Box<dyn RegionReader>> {
        let mut file = File::open(self.region_path(region)).map_err(not_found_as_unknown(region))?;
        file.seek(SeekFrom::Start(start_offset))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn release(&self, region: RegionId) -> TraceResult<()> {
        fs::remove_file(self.region_path(region)).map_err(not_found_as_unknown(region))?;
        trace!(region = %region, "removed region file");
        Ok(())
    }
}
