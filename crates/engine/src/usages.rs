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

//! Def/use resolution of stack effects
//!
//! An instruction popping `read` values and pushing `write` values is
//! observed at depth `S` (`old_stack_size`), the depth with its results on
//! top. That is the depth a backward traversal finds when it reaches the
//! instruction, and the depth a forward recorder sees right after it.
//!
//! ```text
//!   slot:     S-write          S-write+read
//!               │                   │
//!   defined:    [ S-write .. S )    │          the `write` topmost slots
//!   used:       [ S-write .. S-write+read )    the operands, same base
//! ```
//!
//! Operands and results share their base slot, so for `read == write` both
//! sets cover exactly the same slots. [`StackManipulation`] then hands out the
//! very same [`VariableSet`] for both, and callers may rely on
//! [`std::ptr::eq`] to detect instructions that define exactly what they use.

use std::fmt;

use once_cell::unsync::OnceCell;

use crate::{StackError, StackFrame, Variable};

/// Variables an instruction defines and uses
pub trait VariableUsages<'f> {
    /// Variables written by the instruction
    fn defined_variables(&self) -> &VariableSet<'f>;

    /// Variables read by the instruction
    fn used_variables(&self) -> &VariableSet<'f>;

    /// Variables `defined` was computed from
    fn used_variables_for(&self, defined: Variable) -> &VariableSet<'f>;

    /// Whether this is the entry of an exception handler
    fn is_catch_block(&self) -> bool;
}

/// A contiguous run of operand stack slots, resolved lazily
#[derive(Clone, Copy)]
pub struct StackEntryRange<'f> {
    frame: &'f StackFrame,
    start: usize,
    len: usize,
}

impl<'f> StackEntryRange<'f> {
    /// The `len` slots starting at `start`
    pub fn new(frame: &'f StackFrame, start: usize, len: usize) -> Self {
        Self { frame, start, len }
    }

    /// First slot index
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last slot index
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the range is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slot `offset` of the range
    pub fn get(&self, offset: usize) -> Option<Variable> {
        (offset < self.len).then(|| self.frame.stack_entry(self.start + offset))
    }

    /// Whether `variable` is one of the slots
    pub fn contains(&self, variable: &Variable) -> bool {
        match *variable {
            Variable::StackEntry { frame, index } => {
                frame == self.frame.id() && (self.start..self.end()).contains(&index)
            }
            Variable::Local { .. } => false,
        }
    }

    /// The slots, bottom first
    pub fn iter(&self) -> impl Iterator<Item = Variable> + 'f {
        let frame = self.frame;
        (self.start..self.start + self.len).map(move |index| frame.stack_entry(index))
    }
}

impl fmt::Debug for StackEntryRange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:stack[{}..{}]", self.frame.id(), self.start, self.end())
    }
}

impl PartialEq for StackEntryRange<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.frame.id() == other.frame.id() && self.start == other.start && self.len == other.len
    }
}

impl Eq for StackEntryRange<'_> {}

/// A defined or used variable set
///
/// Views borrow their frame, so they cannot outlive the next frame mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableSet<'f> {
    /// No variables
    Empty,
    /// Exactly one variable
    Single(Variable),
    /// Several adjacent stack slots
    Range(StackEntryRange<'f>),
}

impl<'f> VariableSet<'f> {
    /// Number of variables
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Single(_) => 1,
            Self::Range(range) => range.len(),
        }
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `variable` is in the set
    pub fn contains(&self, variable: &Variable) -> bool {
        match self {
            Self::Empty => false,
            Self::Single(single) => single == variable,
            Self::Range(range) => range.contains(variable),
        }
    }

    /// The variables, bottom slot first
    pub fn iter(&self) -> Box<dyn Iterator<Item = Variable> + 'f> {
        match *self {
            Self::Empty => Box::new(std::iter::empty()),
            Self::Single(variable) => Box::new(std::iter::once(variable)),
            Self::Range(range) => Box::new(range.iter()),
        }
    }

    /// Materialize the set
    pub fn to_vec(&self) -> Vec<Variable> {
        self.iter().collect()
    }
}

/// Def/use of an ordinary instruction popping `read` and pushing `write` slots.
///
/// `old_stack_size` is the depth while the results are on the stack: after
/// the instruction when walking forward, before undoing it when walking
/// backward. The defined slots are `[old_stack_size - write, old_stack_size)`
/// and the used slots are the `read` slots starting at the same base, so an
/// instruction with `read == write` hands out one shared set for both.
///
/// Both sets are built on first request and cached.
pub struct StackManipulation<'f> {
    frame: &'f StackFrame,
    read: usize,
    write: usize,
    old_stack_size: usize,
    defined: OnceCell<VariableSet<'f>>,
    used: OnceCell<VariableSet<'f>>,
}

impl<'f> StackManipulation<'f> {
    /// Resolve a stack effect observed at depth `old_stack_size`
    ///
    /// Fails when fewer than `write` slots are present.
    pub fn new(
        frame: &'f StackFrame,
        read: usize,
        write: usize,
        old_stack_size: usize,
    ) -> Result<Self, StackError> {
        if write > old_stack_size {
            return Err(StackError::Underflow {
                frame: frame.id(),
                requested: write,
                available: old_stack_size,
            });
        }
        Ok(Self {
            frame,
            read,
            write,
            old_stack_size,
            defined: OnceCell::new(),
            used: OnceCell::new(),
        })
    }

    /// Values popped
    pub fn read(&self) -> usize {
        self.read
    }

    /// Values pushed
    pub fn write(&self) -> usize {
        self.write
    }

    /// Depth the effect was resolved at
    pub fn old_stack_size(&self) -> usize {
        self.old_stack_size
    }

    /// Lowest slot touched by the instruction
    fn base(&self) -> usize {
        self.old_stack_size - self.write
    }

    fn slots(&self, count: usize) -> VariableSet<'f> {
        match count {
            0 => VariableSet::Empty,
            1 => VariableSet::Single(self.frame.stack_entry(self.base())),
            _ => VariableSet::Range(StackEntryRange::new(self.frame, self.base(), count)),
        }
    }
}

impl<'f> VariableUsages<'f> for StackManipulation<'f> {
    fn defined_variables(&self) -> &VariableSet<'f> {
        self.defined.get_or_init(|| self.slots(self.write))
    }

    fn used_variables(&self) -> &VariableSet<'f> {
        if self.read == self.write {
            return self.defined_variables();
        }
        self.used.get_or_init(|| self.slots(self.read))
    }

    fn used_variables_for(&self, _defined: Variable) -> &VariableSet<'f> {
        self.used_variables()
    }

    fn is_catch_block(&self) -> bool {
        false
    }
}

impl fmt::Debug for StackManipulation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackManipulation")
            .field("frame", &self.frame.id())
            .field("read", &self.read)
            .field("write", &self.write)
            .field("old_stack_size", &self.old_stack_size)
            .finish()
    }
}

/// Def/use of an exception handler entry: the caught value is defined in
/// slot 0 and nothing is used
#[derive(Debug)]
pub struct CatchBlockEntry<'f> {
    defined: VariableSet<'f>,
    used: VariableSet<'f>,
}

impl<'f> CatchBlockEntry<'f> {
    /// Handler entry for `frame`
    pub fn new(frame: &'f StackFrame) -> Self {
        Self { defined: VariableSet::Single(frame.stack_entry(0)), used: VariableSet::Empty }
    }
}

impl<'f> VariableUsages<'f> for CatchBlockEntry<'f> {
    fn defined_variables(&self) -> &VariableSet<'f> {
        &self.defined
    }

    fn used_variables(&self) -> &VariableSet<'f> {
        &self.used
    }

    fn used_variables_for(&self, _defined: Variable) -> &VariableSet<'f> {
        &self.used
    }

    fn is_catch_block(&self) -> bool {
        true
    }
}
