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


//! Record command - write values read from text into a trace directory

use std::{
    fs,
    io::{self, Read},
    path::Path,
};

use bslice_common::{TraceConfig, ValueKind};
use bslice_trace::{ThreadKey, TraceDirectory, TraceResult, MANIFEST_FILE};
use eyre::{bail, Result, WrapErr};
use tracing::{info, warn};

/// Record the values in `input` (or stdin) as one sequence of `thread`
///
/// Values are whitespace separated and given oldest first. The directory
/// must not already hold a trace.
pub fn record_values(
    dir: &Path,
    thread: u64,
    kind: ValueKind,
    input: Option<&Path>,
    config: TraceConfig,
) -> Result<()> {
    if dir.join(MANIFEST_FILE).exists() {
        bail!("{} already contains a trace", dir.display());
    }
    if !config.is_enabled(kind) {
        warn!("Tracing of {kind} values is disabled by the configuration");
    }

    let text = match input {
        Some(path) => fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read values from {}", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text).wrap_err("Failed to read values from stdin")?;
            text
        }
    };
    let values = parse_values(&text, kind)?;

    let thread = ThreadKey(thread);
    let factory = TraceDirectory::recorder(dir, config)?;
    factory.with_thread(thread, |f| -> TraceResult<()> {
        let sequence = f.sequence_for(kind);
        for &value in &values {
            match kind {
                // parse_values checked the range
                ValueKind::Int => sequence.trace_int(value as i32)?,
                ValueKind::Long => sequence.trace_long(value)?,
            }
        }
        Ok(())
    })?;
    TraceDirectory::persist(&factory, dir)?;

    for stats in factory.with_thread(thread, |f| f.stats()) {
        info!(?stats, "sealed sequence");
        let encoding = stats.encoding.map_or_else(|| "none".to_string(), |e| e.to_string());
        println!(
            "{thread}: {} values, encoding {encoding}, {} bytes stored{}",
            stats.values,
            stats.stored_bytes,
            if stats.spilled { ", spilled to storage" } else { "" }
        );
    }
    Ok(())
}

fn parse_values(text: &str, kind: ValueKind) -> Result<Vec<i64>> {
    text.split_whitespace()
        .enumerate()
        .map(|(position, token)| {
            let value = match kind {
                ValueKind::Int => token.parse::<i32>().map(i64::from),
                ValueKind::Long => token.parse::<i64>(),
            };
            value.wrap_err_with(|| format!("Invalid {kind} value `{token}` at position {position}"))
        })
        .collect()
}
