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

//! # bslice Trace Store
//!
//! Capture, storage and backward replay of dynamic trace values.
//!
//! While a traced program runs, every thread appends the dynamic operands of
//! its instructions to per-kind [`TraceSequence`]s handed out by a
//! [`TraceSequenceFactory`]. When the thread finishes, each sequence is
//! sealed: its values are reordered so the most recent one comes first, and
//! stored raw or gzip-compressed depending on their size. A per-thread
//! header records where every sequence went.
//!
//! The slicer then replays each sequence with [`replay_sequence`], walking
//! the execution backwards without ever holding a whole sequence in memory.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bslice_common::{TraceConfig, ValueKind};
//! use bslice_trace::{MemoryStore, ThreadKey, TraceSequenceFactory};
//!
//! let factory = TraceSequenceFactory::new(Arc::new(MemoryStore::new()), TraceConfig::default());
//! factory.with_thread(ThreadKey(1), |f| f.sequence_for(ValueKind::Int).trace_int(42))?;
//! factory.seal_all()?;
//! ```

pub mod backward;
pub mod error;
pub mod factory;
pub mod header;
pub mod persist;
pub mod replay;
pub mod sequence;
pub mod store;
pub mod value;

pub use backward::BackwardChunkedReader;
pub use error::{TraceError, TraceResult};
pub use factory::{
    SequenceId, SharedThreadFactory, ThreadKey, ThreadTraceFactory, TraceSequenceFactory,
};
pub use header::{Encoding, HeaderEntry, StorageRecord};
pub use persist::{TraceDirectory, MANIFEST_FILE};
pub use replay::{replay_sequence, replay_widened, ReplayValues, WidenedValues};
pub use sequence::{SequenceStats, TraceSequence, ValueSequence};
pub use store::{
    DirectoryStore, MemoryStore, MultiplexedStore, RegionId, RegionReader, RegionWriter,
    SharedStore,
};
pub use value::TraceValue;
