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


//! Dump command - print replayed values

use std::{
    io::{self, BufWriter, Write},
    path::Path,
};

use bslice_trace::{ThreadKey, TraceDirectory};
use eyre::{bail, Result, WrapErr};
use tracing::warn;

/// Print the values of every sequence, most recent first
///
/// Sequences that fail to replay are reported and skipped; the command
/// fails once all readable sequences have been printed.
pub fn dump_trace(dir: &Path, thread: Option<u64>, limit: Option<usize>) -> Result<()> {
    let trace = TraceDirectory::open(dir)
        .wrap_err_with(|| format!("Failed to open trace directory {}", dir.display()))?;

    let threads: Vec<ThreadKey> = match thread {
        Some(id) => {
            let key = ThreadKey(id);
            if trace.entries(key).is_none() {
                bail!("{key} is not recorded in {}", dir.display());
            }
            vec![key]
        }
        None => trace.threads().collect(),
    };

    let mut out = BufWriter::new(io::stdout().lock());
    let mut failed = 0usize;
    for thread in threads {
        let entries = trace.entries(thread).unwrap_or_default();
        for (index, entry) in entries.iter().enumerate() {
            writeln!(out, "# {thread} sequence {index} (tag {:#04x})", entry.tag())?;

            let values = match trace.replay_widened(thread, index) {
                Ok(values) => values,
                Err(err) => {
                    warn!("Cannot replay {thread} sequence {index}: {err}");
                    failed += 1;
                    continue;
                }
            };
            for value in values.take(limit.unwrap_or(usize::MAX)) {
                match value {
                    Ok(value) => writeln!(out, "{value}")?,
                    Err(err) => {
                        warn!("Replay of {thread} sequence {index} stopped: {err}");
                        failed += 1;
                        break;
                    }
                }
            }
        }
    }
    out.flush()?;

    if failed > 0 {
        bail!("{failed} sequence(s) could not be replayed");
    }
    Ok(())
}
