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

use thiserror::Error;

use crate::FrameId;

/// Errors raised by the frame model and the stack-effect resolver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// An instruction needs more slots than the frame holds
    #[error("{frame}: stack underflow, {requested} slots requested but only {available} present")]
    Underflow {
        /// Frame the instruction runs in
        frame: FrameId,
        /// Slots the instruction needs
        requested: usize,
        /// Slots the frame holds
        available: usize,
    },

    /// A frame operation was issued outside of any invocation
    #[error("no active frame")]
    NoActiveFrame,
}
