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

//! On-disk trace directories
//!
//! ```text
//! <root>/
//!   threads.toml        manifest: thread id -> header file
//!   thread-<id>.hdr     per-thread header
//!   region-<id>.bin     sealed sequence payloads
//! ```

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use bslice_common::TraceConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    header::read_thread_header, replay_sequence, replay_widened, DirectoryStore, HeaderEntry,
    ReplayValues, ThreadKey, TraceError, TraceResult, TraceSequenceFactory, TraceValue,
    WidenedValues,
};

/// File name of the manifest inside a trace directory
pub const MANIFEST_FILE: &str = "threads.toml";

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    #[serde(default, rename = "thread")]
    threads: Vec<ManifestThread>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestThread {
    id: u64,
    header: String,
}

/// A persisted trace opened for replay
#[derive(Debug)]
pub struct TraceDirectory {
    store: Arc<DirectoryStore>,
    threads: BTreeMap<ThreadKey, Vec<HeaderEntry>>,
}

impl TraceDirectory {
    /// Create a factory recording into a fresh trace directory at `root`
    pub fn recorder(
        root: impl AsRef<Path>,
        config: TraceConfig,
    ) -> TraceResult<TraceSequenceFactory> {
        let store = DirectoryStore::open(root.as_ref())?;
        Ok(TraceSequenceFactory::new(Arc::new(store), config))
    }

    /// Seal every thread of `factory` and write its headers and manifest to `root`
    ///
    /// `root` should be the directory the factory's store writes its regions
    /// to, as set up by [`Self::recorder`].
    pub fn persist(factory: &TraceSequenceFactory, root: impl AsRef<Path>) -> TraceResult<()> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        factory.seal_all()?;

        let mut manifest = Manifest { version: MANIFEST_VERSION, threads: Vec::new() };
        for thread in factory.threads() {
            let header = header_file_name(thread);
            let mut out = BufWriter::new(File::create(root.join(&header))?);
            factory.write_header(thread, &mut out)?;
            out.flush()?;
            manifest.threads.push(ManifestThread { id: thread.0, header });
        }

        let content = toml::to_string_pretty(&manifest)
            .map_err(|err| TraceError::MalformedManifest(err.to_string()))?;
        fs::write(root.join(MANIFEST_FILE), content)?;

        info!(root = %root.display(), threads = manifest.threads.len(), "persisted trace");
        Ok(())
    }

    /// Open a trace directory written by [`Self::persist`]
    pub fn open(root: impl Into<PathBuf>) -> TraceResult<Self> {
        let root = root.into();
        let content = fs::read_to_string(root.join(MANIFEST_FILE))?;
        let manifest: Manifest = toml::from_str(&content)
            .map_err(|err| TraceError::MalformedManifest(err.to_string()))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(TraceError::MalformedManifest(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }

        let mut threads = BTreeMap::new();
        for thread in manifest.threads {
            let mut input = BufReader::new(File::open(root.join(&thread.header))?);
            let entries = read_thread_header(&mut input)?;
            threads.insert(ThreadKey(thread.id), entries);
        }

        debug!(root = %root.display(), threads = threads.len(), "opened trace directory");
        Ok(Self { store: Arc::new(DirectoryStore::open(root)?), threads })
    }

    /// Store holding the sealed regions
    pub fn store(&self) -> &Arc<DirectoryStore> {
        &self.store
    }

    /// Recorded threads, sorted
    pub fn threads(&self) -> impl Iterator<Item = ThreadKey> + '_ {
        self.threads.keys().copied()
    }

    /// Header entries of `thread`
    pub fn entries(&self, thread: ThreadKey) -> Option<&[HeaderEntry]> {
        self.threads.get(&thread).map(Vec::as_slice)
    }

    /// Replay sequence `index` of `thread`
    pub fn replay<V: TraceValue>(
        &self,
        thread: ThreadKey,
        index: usize,
    ) -> TraceResult<ReplayValues<V>> {
        replay_sequence(self.store.as_ref(), &self.entry(thread, index)?)
    }

    /// Replay sequence `index` of `thread`, widened to `i64`
    pub fn replay_widened(&self, thread: ThreadKey, index: usize) -> TraceResult<WidenedValues> {
        replay_widened(self.store.as_ref(), &self.entry(thread, index)?)
    }

    fn entry(&self, thread: ThreadKey, index: usize) -> TraceResult<HeaderEntry> {
        self.entries(thread).and_then(|entries| entries.get(index)).copied().ok_or_else(|| {
            TraceError::MalformedManifest(format!("{thread} has no sequence {index}"))
        })
    }
}

fn header_file_name(thread: ThreadKey) -> String {
    format!("{thread}.hdr")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bslice_common::ValueKind;

    #[test]
    fn test_persist_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let factory = TraceDirectory::recorder(dir.path(), TraceConfig::default()).unwrap();
        factory.with_thread(ThreadKey(9), |f| {
            for v in 0..20 {
                f.sequence_for(ValueKind::Int).trace_int(v).unwrap();
            }
        });
        TraceDirectory::persist(&factory, dir.path()).unwrap();
        assert!(dir.path().join("thread-9.hdr").is_file());

        let trace = TraceDirectory::open(dir.path()).unwrap();
        assert_eq!(trace.threads().collect::<Vec<_>>(), vec![ThreadKey(9)]);
        let values: Vec<i32> = trace.replay(ThreadKey(9), 0).unwrap().map(Result::unwrap).collect();
        assert_eq!(values, (0..20).rev().collect::<Vec<_>>());
        assert!(trace.replay::<i32>(ThreadKey(9), 1).is_err());
    }

    #[test]
    fn test_missing_or_bad_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(TraceDirectory::open(dir.path()), Err(TraceError::StorageIo(_))));

        fs::write(dir.path().join(MANIFEST_FILE), "version = 99\n").unwrap();
        assert!(matches!(TraceDirectory::open(dir.path()), Err(TraceError::MalformedManifest(_))));

        fs::write(dir.path().join(MANIFEST_FILE), "version = [").unwrap();
        assert!(matches!(TraceDirectory::open(dir.path()), Err(TraceError::MalformedManifest(_))));
    }
}
