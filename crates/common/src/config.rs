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

//! Configuration of trace recording and sealing
//!
//! All thresholds are expressed in *values*, not bytes, so one configuration
//! applies to every [`ValueKind`]. They are tuning knobs: none of them changes
//! what a replay yields, only where and how the values are stored.
//!
//! Configuration files are TOML:
//!
//! ```toml
//! buffer_threshold = 500
//! small_sequence_threshold = 512
//! raw_threshold = 504
//! backward_chunk_size = 4096
//! write_buffer_size = 4096
//! compression_level = 6
//! disabled_kinds = ["long"]
//! ```

use std::{fs, path::Path};

use eyre::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ValueKind;

/// Default number of values a sequence buffers in memory before it switches
/// to direct-to-storage mode.
pub const DEFAULT_BUFFER_THRESHOLD: usize = 500;

/// Default size (in values) below which a stored sequence is reversed in
/// memory at seal time.
pub const DEFAULT_SMALL_SEQUENCE_THRESHOLD: usize = 512;

/// Default size (in values) up to which a reversed sequence is stored raw.
pub const DEFAULT_RAW_THRESHOLD: usize = 504;

/// Default number of values per chunk read by the backward reader.
pub const DEFAULT_BACKWARD_CHUNK_SIZE: usize = 4 * 1024;

/// Default number of bytes a streaming sequence buffers per region append.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4 * 1024;

/// Default DEFLATE compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Trace recording configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Values kept in memory before a sequence is backed by a storage region
    pub buffer_threshold: usize,
    /// Stored sequences up to this many values are reversed in memory at seal time
    pub small_sequence_threshold: usize,
    /// Reversed sequences up to this many values are stored uncompressed
    pub raw_threshold: usize,
    /// Values per chunk read by the backward chunked reader
    pub backward_chunk_size: usize,
    /// Bytes buffered by a streaming sequence before each region append
    pub write_buffer_size: usize,
    /// DEFLATE level used for compressed sequences (0-9)
    pub compression_level: u32,
    /// Kinds whose sequences are handed out as no-op sequences
    pub disabled_kinds: Vec<ValueKind>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            buffer_threshold: DEFAULT_BUFFER_THRESHOLD,
            small_sequence_threshold: DEFAULT_SMALL_SEQUENCE_THRESHOLD,
            raw_threshold: DEFAULT_RAW_THRESHOLD,
            backward_chunk_size: DEFAULT_BACKWARD_CHUNK_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            disabled_kinds: Vec::new(),
        }
    }
}

impl TraceConfig {
    /// Set the in-memory buffer threshold
    pub fn with_buffer_threshold(mut self, values: usize) -> Self {
        self.buffer_threshold = values;
        self
    }

    /// Set both seal-time thresholds (`T_small`, `T_raw`)
    pub fn with_seal_thresholds(mut self, small_sequence: usize, raw: usize) -> Self {
        self.small_sequence_threshold = small_sequence;
        self.raw_threshold = raw;
        self
    }

    /// Set the chunk size of the backward reader
    pub fn with_backward_chunk_size(mut self, values: usize) -> Self {
        self.backward_chunk_size = values;
        self
    }

    /// Set the compression level
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Record `kind` through no-op sequences
    pub fn with_disabled_kind(mut self, kind: ValueKind) -> Self {
        if !self.disabled_kinds.contains(&kind) {
            self.disabled_kinds.push(kind);
        }
        self
    }

    /// Whether sequences of `kind` are recorded
    pub fn is_enabled(&self, kind: ValueKind) -> bool {
        !self.disabled_kinds.contains(&kind)
    }

    /// Check the invariants between the thresholds
    pub fn validate(&self) -> Result<()> {
        ensure!(self.buffer_threshold > 0, "buffer_threshold must be positive");
        ensure!(self.backward_chunk_size > 0, "backward_chunk_size must be positive");
        ensure!(self.write_buffer_size > 0, "write_buffer_size must be positive");
        ensure!(
            self.raw_threshold <= self.small_sequence_threshold,
            "raw_threshold ({}) must not exceed small_sequence_threshold ({})",
            self.raw_threshold,
            self.small_sequence_threshold
        );
        ensure!(
            self.compression_level <= 9,
            "compression_level must be within 0..=9, got {}",
            self.compression_level
        );
        Ok(())
    }

    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;

        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;
        config.validate().with_context(|| format!("Invalid configuration in {path:?}"))?;

        debug!("Loaded trace configuration from {:?}", path);
        Ok(config)
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {path:?}"))?;

        debug!("Saved trace configuration to {:?}", path);
        Ok(())
    }
}
