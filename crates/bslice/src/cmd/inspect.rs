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


//! Inspect command - list the sequences of a trace directory

use std::path::Path;

use bslice_trace::{HeaderEntry, MultiplexedStore, ThreadKey, TraceDirectory, TraceResult};
use eyre::{Result, WrapErr};

/// Print every thread of the trace in `dir` with its header entries
pub fn inspect_trace(dir: &Path, count: bool) -> Result<()> {
    let trace = TraceDirectory::open(dir)
        .wrap_err_with(|| format!("Failed to open trace directory {}", dir.display()))?;

    println!("Trace directory: {}", dir.display());
    for thread in trace.threads() {
        let entries = trace.entries(thread).unwrap_or_default();
        println!("{thread}: {} sequences", entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let mut line = format!("  [{index}] {}", describe_entry(&trace, entry));
            if count {
                match count_values(&trace, thread, index) {
                    Ok(values) => line.push_str(&format!(", {values} values")),
                    Err(err) => line.push_str(&format!(", unreadable: {err}")),
                }
            }
            println!("{line}");
        }
    }
    Ok(())
}

fn describe_entry(trace: &TraceDirectory, entry: &HeaderEntry) -> String {
    match entry {
        HeaderEntry::Disabled => "disabled (tag 0x00)".to_string(),
        HeaderEntry::Stored(record) => {
            let size = match trace.store().region_len(record.region) {
                Ok(bytes) => format!("{bytes} bytes"),
                Err(_) => "missing".to_string(),
            };
            format!(
                "{} {} (tag {:#04x}) region {}, {size}",
                record.kind,
                record.encoding,
                record.tag(),
                record.region
            )
        }
        HeaderEntry::Unsupported { tag, region } => {
            format!("unsupported (tag {tag:#04x}) region {region}")
        }
    }
}

fn count_values(trace: &TraceDirectory, thread: ThreadKey, index: usize) -> TraceResult<u64> {
    let mut values = 0;
    for value in trace.replay_widened(thread, index)? {
        value?;
        values += 1;
    }
    Ok(values)
}
