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

//! bslice Common - Shared functionality for bslice components
//!
//! This crate provides the pieces shared by the trace store, the stack-effect
//! engine and the `bslice` binary: logging setup, the trace configuration and
//! the value kinds a trace sequence can carry.

/// Trace recording configuration with TOML persistence
pub mod config;
/// Value kinds recorded by trace sequences
pub mod kind;
/// Logging setup and utilities for consistent logging across bslice components
pub mod logging;

pub use config::*;
pub use kind::*;
pub use logging::*;
