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


//! Config command - show the effective configuration

use bslice_common::TraceConfig;
use eyre::{Result, WrapErr};

/// Print `config` as TOML
pub fn show_config(config: &TraceConfig) -> Result<()> {
    let content =
        toml::to_string_pretty(config).wrap_err("Failed to serialize configuration to TOML")?;
    print!("{content}");
    Ok(())
}
