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

//! # bslice Engine
//!
//! Operand stack model and stack-effect resolution for backward slicing.
//!
//! Each instruction of a stack machine pops some values and pushes others.
//! The slicer needs to know *which* stack slots those are, both while the
//! program is recorded and while the trace is walked backwards. A
//! [`StackFrame`] gives every slot a stable [`Variable`] identity, and
//! [`StackFrame::resolve`] turns an instruction's `(read, write)` counts into
//! the [`VariableSet`]s it defines and uses.

pub mod error;
pub use error::*;

pub mod frame;
pub use frame::*;

pub mod untraced;
pub use untraced::*;

pub mod usages;
pub use usages::*;

pub mod variable;
pub use variable::*;
