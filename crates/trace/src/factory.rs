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

//! Trace sequence factories
//!
//! [`TraceSequenceFactory`] is the process-wide entry point. It hands every
//! traced thread its own [`ThreadTraceFactory`], which creates, seals and
//! describes the sequences of that thread. Only the thread directory is
//! shared; a thread factory is only ever locked by its own thread while
//! recording, and by the finishing code once recording has stopped.

use std::{collections::HashMap, fmt, io::Write, sync::Arc};

use bslice_common::{TraceConfig, ValueKind};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    header::write_thread_header, HeaderEntry, SequenceStats, SharedStore, TraceResult,
    TraceSequence,
};

/// Identity of a traced thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadKey(pub u64);

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread-{}", self.0)
    }
}

/// Handle of a sequence within its thread factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceId(usize);

impl SequenceId {
    /// Position of the sequence in the thread header
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Backend {
    store: SharedStore,
    config: Arc<TraceConfig>,
}

/// Creates and owns the sequences of one thread
#[derive(Debug)]
pub struct ThreadTraceFactory {
    thread: ThreadKey,
    /// `None` for the disabled factory
    backend: Option<Backend>,
    sequences: Vec<TraceSequence>,
    by_kind: HashMap<ValueKind, SequenceId>,
}

impl ThreadTraceFactory {
    fn new(thread: ThreadKey, backend: Option<Backend>) -> Self {
        Self { thread, backend, sequences: Vec::new(), by_kind: HashMap::new() }
    }

    /// A factory whose sequences discard everything
    pub fn disabled(thread: ThreadKey) -> Self {
        Self::new(thread, None)
    }

    /// Thread this factory records for
    pub fn thread(&self) -> ThreadKey {
        self.thread
    }

    /// Whether sequences created here record anything
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Create a new sequence of `kind`
    ///
    /// Disabled factories, and kinds disabled by configuration, get the no-op
    /// sequence. Storage is only allocated once a sequence needs it.
    pub fn create_sequence(&mut self, kind: ValueKind) -> SequenceId {
        let sequence = match &self.backend {
            Some(backend) if backend.config.is_enabled(kind) => {
                TraceSequence::open(kind, backend.store.clone(), backend.config.clone())
            }
            _ => TraceSequence::Disabled,
        };
        let id = SequenceId(self.sequences.len());
        self.sequences.push(sequence);
        trace!(thread = %self.thread, %kind, index = id.0, "created trace sequence");
        id
    }

    /// The sequence of `kind` shared by all call sites of this thread
    pub fn sequence_for(&mut self, kind: ValueKind) -> &mut TraceSequence {
        let id = match self.by_kind.get(&kind) {
            Some(id) => *id,
            None => {
                let id = self.create_sequence(kind);
                self.by_kind.insert(kind, id);
                id
            }
        };
        &mut self.sequences[id.0]
    }

    /// Look up a sequence created by this factory
    pub fn sequence_mut(&mut self, id: SequenceId) -> Option<&mut TraceSequence> {
        self.sequences.get_mut(id.0)
    }

    /// Number of sequences created so far
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Whether no sequence has been created
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Seal every sequence not sealed yet
    pub fn seal(&mut self) -> TraceResult<()> {
        for sequence in self.sequences.iter_mut().filter(|s| !s.is_sealed()) {
            sequence.seal()?;
        }
        debug!(thread = %self.thread, sequences = self.sequences.len(), "sealed thread trace");
        Ok(())
    }

    /// Header entries of the sealed sequences, in creation order
    pub fn header_entries(&self) -> TraceResult<Vec<HeaderEntry>> {
        if !self.is_enabled() {
            return Ok(Vec::new());
        }
        self.sequences.iter().map(TraceSequence::header_entry).collect()
    }

    /// Write the per-thread header
    ///
    /// A disabled factory writes the single "no data" byte.
    pub fn serialize_header<W: Write + ?Sized>(&self, out: &mut W) -> TraceResult<()> {
        let entries = self.header_entries()?;
        write_thread_header(out, &entries)?;
        Ok(())
    }

    /// Counters of every sequence, in creation order
    pub fn stats(&self) -> Vec<SequenceStats> {
        self.sequences.iter().map(TraceSequence::stats).collect()
    }
}

/// Shared handle to one thread's factory
pub type SharedThreadFactory = Arc<Mutex<ThreadTraceFactory>>;

/// Process-wide directory of per-thread factories.
///
/// Each thread gets its own [`ThreadTraceFactory`] behind a mutex, created on
/// first use, so recording threads never contend with each other. All of
/// them share one store and one [`TraceConfig`]. A factory built with
/// [`TraceSequenceFactory::disabled`] hands out disabled thread factories
/// whose headers say "no data".
pub struct TraceSequenceFactory {
    backend: Option<Backend>,
    threads: DashMap<ThreadKey, SharedThreadFactory>,
}

impl fmt::Debug for TraceSequenceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceSequenceFactory")
            .field("enabled", &self.is_enabled())
            .field("threads", &self.threads.len())
            .finish()
    }
}

impl TraceSequenceFactory {
    /// Create a factory recording into `store`
    pub fn new(store: SharedStore, config: TraceConfig) -> Self {
        debug!(?config, "created trace sequence factory");
        Self { backend: Some(Backend { store, config: Arc::new(config) }), threads: DashMap::new() }
    }

    /// Create a factory whose threads record nothing
    pub fn disabled() -> Self {
        Self { backend: None, threads: DashMap::new() }
    }

    /// Whether the factory records anything
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Store the sequences are recorded into
    pub fn store(&self) -> Option<&SharedStore> {
        self.backend.as_ref().map(|b| &b.store)
    }

    /// Active configuration
    pub fn config(&self) -> Option<&TraceConfig> {
        self.backend.as_ref().map(|b| b.config.as_ref())
    }

    /// The factory of `thread`, created on first access
    pub fn for_thread(&self, thread: ThreadKey) -> SharedThreadFactory {
        self.threads
            .entry(thread)
            .or_insert_with(|| {
                trace!(%thread, "registered traced thread");
                Arc::new(Mutex::new(ThreadTraceFactory::new(thread, self.backend.clone())))
            })
            .clone()
    }

    /// Run `f` against the factory of `thread`
    pub fn with_thread<R>(
        &self,
        thread: ThreadKey,
        f: impl FnOnce(&mut ThreadTraceFactory) -> R,
    ) -> R {
        let factory = self.for_thread(thread);
        let mut guard = factory.lock();
        f(&mut guard)
    }

    /// Threads seen so far, sorted
    pub fn threads(&self) -> Vec<ThreadKey> {
        let mut threads: Vec<_> = self.threads.iter().map(|e| *e.key()).collect();
        threads.sort_unstable();
        threads
    }

    /// Seal every thread, in thread order.
    ///
    /// Stops at the first error. Threads sealed before it stay sealed, and a
    /// sequence that failed keeps failing on the next call.
    pub fn seal_all(&self) -> TraceResult<()> {
        for thread in self.threads() {
            self.with_thread(thread, ThreadTraceFactory::seal)?;
        }
        Ok(())
    }

    /// Write the header of `thread`
    pub fn write_header<W: Write + ?Sized>(
        &self,
        thread: ThreadKey,
        out: &mut W,
    ) -> TraceResult<()> {
        self.with_thread(thread, |factory| factory.serialize_header(out))
    }
}
