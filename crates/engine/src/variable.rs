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

//! Variable identities

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one method invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// A storage location observed during execution
///
/// Variables are plain identities: two variables are the same location iff
/// they compare equal. They come into existence when first referenced and
/// are never destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variable {
    /// A local variable slot
    Local {
        /// Owning invocation
        frame: FrameId,
        /// Slot index
        index: usize,
    },
    /// An operand stack slot, counted from the bottom of the stack
    StackEntry {
        /// Owning invocation
        frame: FrameId,
        /// Depth, 0 being the bottom slot
        index: usize,
    },
}

impl Variable {
    /// Invocation the variable belongs to
    pub fn frame(&self) -> FrameId {
        match self {
            Self::Local { frame, .. } | Self::StackEntry { frame, .. } => *frame,
        }
    }

    /// Slot index within its frame
    pub fn index(&self) -> usize {
        match self {
            Self::Local { index, .. } | Self::StackEntry { index, .. } => *index,
        }
    }

    /// Whether the variable is an operand stack slot
    pub fn is_stack_entry(&self) -> bool {
        matches!(self, Self::StackEntry { .. })
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { frame, index } => write!(f, "{frame}:local[{index}]"),
            Self::StackEntry { frame, index } => write!(f, "{frame}:stack[{index}]"),
        }
    }
}
