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

//! Stack frame model
//!
//! A [`StackFrame`] tracks the operand stack depth of one invocation and maps
//! every slot to its [`Variable`] identity. Slots are addressed from the
//! bottom, so a slot keeps its identity while values are pushed above it.
//! [`FrameStack`] brackets invocations for one thread.

use tracing::trace;

use crate::{CatchBlockEntry, FrameId, StackError, StackManipulation, Variable};

/// One live or replayed method invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    id: FrameId,
    stack_size: usize,
}

impl StackFrame {
    /// Create a frame with an empty operand stack
    pub fn new(id: FrameId) -> Self {
        Self { id, stack_size: 0 }
    }

    /// Identity of the invocation
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Number of occupied operand stack slots
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Overwrite the stack depth, e.g. when replay jumps to a known program point
    pub fn set_stack_size(&mut self, size: usize) {
        self.stack_size = size;
    }

    /// Identity of operand stack slot `index` (0 = bottom)
    pub fn stack_entry(&self, index: usize) -> Variable {
        Variable::StackEntry { frame: self.id, index }
    }

    /// Identity of local variable slot `index`
    pub fn local(&self, index: usize) -> Variable {
        Variable::Local { frame: self.id, index }
    }

    /// Push `count` slots
    pub fn push(&mut self, count: usize) {
        self.stack_size += count;
    }

    /// Pop `count` slots
    pub fn pop(&mut self, count: usize) -> Result<(), StackError> {
        if count > self.stack_size {
            return Err(StackError::Underflow {
                frame: self.id,
                requested: count,
                available: self.stack_size,
            });
        }
        self.stack_size -= count;
        Ok(())
    }

    /// Resolve an instruction's stack effect against this frame
    ///
    /// `old_stack_size` is the depth at which the instruction is observed;
    /// see [`StackManipulation`] for the slot layout.
    pub fn resolve(
        &self,
        read: usize,
        write: usize,
        old_stack_size: usize,
    ) -> Result<StackManipulation<'_>, StackError> {
        StackManipulation::new(self, read, write, old_stack_size)
    }

    /// Enter an exception handler: the stack is cleared and the caught value
    /// occupies slot 0
    pub fn enter_catch_block(&mut self) -> CatchBlockEntry<'_> {
        self.stack_size = 1;
        trace!(frame = %self.id, "entered catch block");
        CatchBlockEntry::new(self)
    }
}

/// The invocations of one thread, innermost last
#[derive(Debug, Default)]
pub struct FrameStack {
    frames: Vec<StackFrame>,
    next_id: u64,
}

impl FrameStack {
    /// Create an empty frame stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Bracket the start of an invocation
    pub fn enter_frame(&mut self) -> FrameId {
        let id = FrameId(self.next_id);
        self.next_id += 1;
        self.frames.push(StackFrame::new(id));
        trace!(frame = %id, depth = self.frames.len(), "entered frame");
        id
    }

    /// Bracket the end of the innermost invocation
    pub fn exit_frame(&mut self) -> Result<StackFrame, StackError> {
        let frame = self.frames.pop().ok_or(StackError::NoActiveFrame)?;
        trace!(frame = %frame.id, depth = self.frames.len(), "exited frame");
        Ok(frame)
    }

    /// The innermost invocation
    pub fn current(&self) -> Result<&StackFrame, StackError> {
        self.frames.last().ok_or(StackError::NoActiveFrame)
    }

    /// The innermost invocation, mutably
    pub fn current_mut(&mut self) -> Result<&mut StackFrame, StackError> {
        self.frames.last_mut().ok_or(StackError::NoActiveFrame)
    }

    /// Number of active invocations
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether no invocation is active
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let mut frame = StackFrame::new(FrameId(0));
        frame.push(3);
        frame.pop(2).unwrap();
        assert_eq!(frame.stack_size(), 1);

        let err = frame.pop(2).unwrap_err();
        assert_eq!(err, StackError::Underflow { frame: FrameId(0), requested: 2, available: 1 });
        assert_eq!(frame.stack_size(), 1);
    }

    #[test]
    fn test_slots_belong_to_their_frame() {
        let frame = StackFrame::new(FrameId(4));
        assert_eq!(frame.stack_entry(1), Variable::StackEntry { frame: FrameId(4), index: 1 });
        assert_eq!(frame.local(1), Variable::Local { frame: FrameId(4), index: 1 });
        assert_ne!(frame.stack_entry(1), StackFrame::new(FrameId(5)).stack_entry(1));
    }

    #[test]
    fn test_frame_stack_brackets_invocations() {
        let mut frames = FrameStack::new();
        assert_eq!(frames.current(), Err(StackError::NoActiveFrame));

        let outer = frames.enter_frame();
        frames.current_mut().unwrap().push(2);
        let inner = frames.enter_frame();
        assert_ne!(outer, inner);
        assert_eq!(frames.depth(), 2);
        assert_eq!(frames.current().unwrap().stack_size(), 0);

        assert_eq!(frames.exit_frame().unwrap().id(), inner);
        assert_eq!(frames.current().unwrap().stack_size(), 2);
        assert_eq!(frames.exit_frame().unwrap().id(), outer);
        assert!(frames.is_empty());
        assert_eq!(frames.exit_frame(), Err(StackError::NoActiveFrame));
    }

    #[test]
    fn test_frame_ids_are_never_reused() {
        let mut frames = FrameStack::new();
        let first = frames.enter_frame();
        frames.exit_frame().unwrap();
        assert_ne!(frames.enter_frame(), first);
    }
}
