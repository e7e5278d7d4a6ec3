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


//! Test utilities for integration tests
//!
//! A straight-line stack machine with calls. Running a [`Program`] forward
//! resolves every instruction's stack effect and records two sequences per
//! thread: the executed instructions (`int`) and the values they wrote
//! (`long`). [`replay_backward`] walks both sequences most-recent-first,
//! rebuilding the frames and re-resolving each instruction, so the two sides
//! can be compared step by step.

use std::collections::HashMap;

use bslice_common::ValueKind;
use bslice_engine::{
    FrameId, FrameStack, MethodSignature, UntracedCallReporter, Variable, VariableUsages,
};
use bslice_trace::{SequenceId, ThreadKey, ThreadTraceFactory, TraceDirectory, TraceSequence};
use eyre::{bail, ensure, eyre, Result};
use tracing::debug;

/// Local slots available to every invocation
pub const LOCALS: usize = 8;

/// Header position of the executed-instruction sequence
pub const CONTROL_SEQUENCE: usize = 0;

/// Header position of the written-value sequence
pub const VALUE_SEQUENCE: usize = 1;

const PC_BITS: u32 = 20;
const PC_MASK: usize = (1 << PC_BITS) - 1;
const MAX_METHOD: usize = (1 << (31 - PC_BITS)) - 1;

/// One instruction of the test machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Push a constant
    Push(i64),
    /// Push a local
    Load(usize),
    /// Pop into a local
    Store(usize),
    /// Pop two values, push their sum
    Add,
    /// Pop two values, push their product
    Mul,
    /// Duplicate the top value
    Dup,
    /// Swap the two top values
    Swap,
    /// Discard the top value
    Pop,
    /// Pop the return value and leave the method
    Return,
    /// Call a traced method with `args` values from the stack as its first locals
    Invoke {
        /// Index of the callee in the program
        method: usize,
        /// Number of arguments
        args: usize,
    },
    /// Call a method that is not traced; it pushes the sum of its arguments
    CallUntraced {
        /// The invoked method
        signature: MethodSignature,
        /// Number of arguments
        args: usize,
    },
}

impl Instruction {
    /// Values `(read, write)` by the instruction
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Self::Push(_) | Self::Load(_) => (0, 1),
            Self::Store(_) | Self::Pop | Self::Return => (1, 0),
            Self::Add | Self::Mul => (2, 1),
            Self::Dup => (1, 2),
            Self::Swap => (2, 2),
            Self::Invoke { args, .. } | Self::CallUntraced { args, .. } => (*args, 1),
        }
    }
}

/// Methods of a test program; method 0 is the entry point
#[derive(Debug, Clone)]
pub struct Program {
    methods: Vec<Vec<Instruction>>,
}

impl Program {
    /// Create a program from its entry method
    pub fn new(entry: Vec<Instruction>) -> Self {
        Self { methods: vec![entry] }
    }

    /// Add a method and return its index
    pub fn add_method(&mut self, body: Vec<Instruction>) -> usize {
        self.methods.push(body);
        self.methods.len() - 1
    }

    /// `1 + 2 + ... + n` without a loop, stored into local 0
    pub fn unrolled_sum(n: i64) -> Self {
        let mut entry = vec![Instruction::Push(1)];
        for k in 2..=n {
            entry.push(Instruction::Push(k));
            entry.push(Instruction::Add);
        }
        entry.push(Instruction::Store(0));
        Self::new(entry)
    }

    /// Instruction `pc` of `method`
    pub fn instruction(&self, method: usize, pc: usize) -> Result<&Instruction> {
        self.methods
            .get(method)
            .and_then(|body| body.get(pc))
            .ok_or_else(|| eyre!("no instruction {pc} in method {method}"))
    }

    /// Number of instructions of `method`
    pub fn method_len(&self, method: usize) -> usize {
        self.methods.get(method).map_or(0, Vec::len)
    }

    /// Operand stack depth left behind by the entry method
    pub fn final_entry_depth(&self) -> Result<usize> {
        let mut depth = 0usize;
        for (pc, instruction) in self.methods[0].iter().enumerate() {
            let (read, write) = instruction.stack_effect();
            depth = depth
                .checked_sub(read)
                .ok_or_else(|| eyre!("entry method underflows at instruction {pc}"))?
                + write;
        }
        Ok(depth)
    }
}

/// One resolved instruction execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Method of the instruction
    pub method: usize,
    /// Position of the instruction in its method
    pub pc: usize,
    /// Invocation the instruction ran in
    pub frame: FrameId,
    /// Stack slots written
    pub defined: Vec<Variable>,
    /// Stack slots read
    pub used: Vec<Variable>,
    /// Values written, bottom first
    pub written: Vec<i64>,
}

/// Outcome of a forward run
#[derive(Debug)]
pub struct Execution {
    /// Steps in execution order
    pub steps: Vec<Step>,
    /// Locals of the entry method when it finished
    pub entry_locals: Vec<i64>,
    /// Distinct untraced methods that were reported
    pub untraced_methods: usize,
}

/// Run `program` on one thread, recording through `trace`
pub fn run_forward(program: &Program, trace: &mut ThreadTraceFactory) -> Result<Execution> {
    let control = trace.create_sequence(ValueKind::Int);
    let values = trace.create_sequence(ValueKind::Long);
    let mut machine = Machine {
        program,
        trace,
        control,
        values,
        frames: FrameStack::new(),
        operands: Vec::new(),
        locals: Vec::new(),
        reporter: UntracedCallReporter::new(),
        steps: Vec::new(),
    };

    let (_, entry_locals) = machine.invoke(0, Vec::new())?;
    debug!(steps = machine.steps.len(), thread = %machine.trace.thread(), "forward run done");
    Ok(Execution {
        steps: machine.steps,
        entry_locals,
        untraced_methods: machine.reporter.reported_count(),
    })
}

struct Machine<'a> {
    program: &'a Program,
    trace: &'a mut ThreadTraceFactory,
    control: SequenceId,
    values: SequenceId,
    frames: FrameStack,
    operands: Vec<Vec<i64>>,
    locals: Vec<Vec<i64>>,
    reporter: UntracedCallReporter,
    steps: Vec<Step>,
}

impl Machine<'_> {
    fn invoke(&mut self, method: usize, args: Vec<i64>) -> Result<(Option<i64>, Vec<i64>)> {
        let program = self.program;
        self.frames.enter_frame();
        let mut locals = args;
        if locals.len() < LOCALS {
            locals.resize(LOCALS, 0);
        }
        self.locals.push(locals);
        self.operands.push(Vec::new());

        let mut result = None;
        for pc in 0..program.method_len(method) {
            let instruction = program.instruction(method, pc)?;
            let (read, write) = instruction.stack_effect();
            let operands = self.pop_operands(read)?;

            let written = match instruction {
                Instruction::Push(value) => vec![*value],
                Instruction::Load(slot) => vec![*self.local(*slot)?],
                Instruction::Store(slot) => {
                    *self.local(*slot)? = operands[0];
                    Vec::new()
                }
                Instruction::Add => vec![operands[0].wrapping_add(operands[1])],
                Instruction::Mul => vec![operands[0].wrapping_mul(operands[1])],
                Instruction::Dup => vec![operands[0]; 2],
                Instruction::Swap => vec![operands[1], operands[0]],
                Instruction::Pop => Vec::new(),
                Instruction::Return => {
                    result = Some(operands[0]);
                    Vec::new()
                }
                Instruction::Invoke { method: callee, .. } => {
                    let (value, _) = self.invoke(*callee, operands)?;
                    vec![value.ok_or_else(|| eyre!("method {callee} did not return"))?]
                }
                Instruction::CallUntraced { signature, .. } => {
                    self.reporter.report(call_site(method, pc), signature);
                    vec![operands.iter().fold(0i64, |sum, v| sum.wrapping_add(*v))]
                }
            };
            ensure!(written.len() == write, "instruction {pc} wrote {} values", written.len());

            self.push_operands(&written)?;
            self.record(method, pc, read, write, written)?;
        }

        self.operands.pop();
        let locals = self.locals.pop().unwrap_or_default();
        self.frames.exit_frame()?;
        Ok((result, locals))
    }

    fn local(&mut self, slot: usize) -> Result<&mut i64> {
        self.locals
            .last_mut()
            .and_then(|locals| locals.get_mut(slot))
            .ok_or_else(|| eyre!("no local {slot}"))
    }

    fn pop_operands(&mut self, count: usize) -> Result<Vec<i64>> {
        let stack = self.operands.last_mut().ok_or_else(|| eyre!("no active frame"))?;
        if stack.len() < count {
            bail!("operand stack underflow: need {count}, have {}", stack.len());
        }
        let operands = stack.split_off(stack.len() - count);
        self.frames.current_mut()?.pop(count)?;
        Ok(operands)
    }

    fn push_operands(&mut self, values: &[i64]) -> Result<()> {
        let stack = self.operands.last_mut().ok_or_else(|| eyre!("no active frame"))?;
        stack.extend_from_slice(values);
        self.frames.current_mut()?.push(values.len());
        Ok(())
    }

    fn record(
        &mut self,
        method: usize,
        pc: usize,
        read: usize,
        write: usize,
        written: Vec<i64>,
    ) -> Result<()> {
        let frame = self.frames.current()?;
        let usage = frame.resolve(read, write, frame.stack_size())?;
        let step = Step {
            method,
            pc,
            frame: frame.id(),
            defined: usage.defined_variables().to_vec(),
            used: usage.used_variables().to_vec(),
            written,
        };

        let event = encode_event(method, pc)?;
        self.sequence(self.control)?.trace_int(event)?;
        for value in &step.written {
            self.sequence(self.values)?.trace_long(*value)?;
        }
        self.steps.push(step);
        Ok(())
    }

    fn sequence(&mut self, id: SequenceId) -> Result<&mut TraceSequence> {
        self.trace.sequence_mut(id).ok_or_else(|| eyre!("unknown sequence {}", id.index()))
    }
}

/// Replay the recorded run of `thread` most-recent-first
///
/// Returns the re-resolved steps in execution order.
pub fn replay_backward(
    program: &Program,
    trace: &TraceDirectory,
    thread: ThreadKey,
) -> Result<Vec<Step>> {
    let control = trace.replay::<i32>(thread, CONTROL_SEQUENCE)?;
    let mut values = trace.replay::<i64>(thread, VALUE_SEQUENCE)?;

    let mut frames = FrameStack::new();
    frames.enter_frame();
    frames.current_mut()?.set_stack_size(program.final_entry_depth()?);
    // per frame: earliest pc undone so far
    let mut undone = vec![program.method_len(0)];

    let mut steps = Vec::new();
    for event in control {
        let (method, pc) = decode_event(event?)?;
        let instruction = program.instruction(method, pc)?;
        let (read, write) = instruction.stack_effect();

        let frame = frames.current_mut()?;
        let (defined, used) = {
            let usage = frame.resolve(read, write, frame.stack_size())?;
            (usage.defined_variables().to_vec(), usage.used_variables().to_vec())
        };
        let mut written = Vec::with_capacity(write);
        for _ in 0..write {
            written.push(values.next().ok_or_else(|| eyre!("value trace ended early"))??);
        }
        written.reverse();

        let id = frame.id();
        frame.pop(write)?;
        frame.push(read);
        steps.push(Step { method, pc, frame: id, defined, used, written });

        if let Some(earliest) = undone.last_mut() {
            *earliest = pc;
        }
        if let Instruction::Invoke { method: callee, .. } = instruction {
            frames.enter_frame();
            undone.push(program.method_len(*callee));
        } else {
            while undone.last() == Some(&0) {
                frames.exit_frame()?;
                undone.pop();
            }
        }
    }

    ensure!(frames.is_empty(), "replay ended inside {} frames", frames.depth());
    ensure!(values.next().is_none(), "value trace has values left over");
    steps.reverse();
    Ok(steps)
}

/// Assert that a forward run and its backward replay resolved the same slots
///
/// Frame ids are assigned independently on both sides, so frames are matched
/// by first appearance.
pub fn assert_same_steps(forward: &[Step], backward: &[Step]) {
    assert_eq!(forward.len(), backward.len(), "step count");
    let mut frames: HashMap<FrameId, FrameId> = HashMap::new();
    for (i, (f, b)) in forward.iter().zip(backward).enumerate() {
        assert_eq!((f.method, f.pc), (b.method, b.pc), "step {i}");
        assert_eq!(f.written, b.written, "step {i} values");
        let frame = *frames.entry(f.frame).or_insert(b.frame);
        assert_eq!(frame, b.frame, "step {i} frame");
        assert_eq!(in_frame(&f.defined, frame), b.defined, "step {i} defined");
        assert_eq!(in_frame(&f.used, frame), b.used, "step {i} used");
    }
}

fn in_frame(variables: &[Variable], frame: FrameId) -> Vec<Variable> {
    variables
        .iter()
        .map(|variable| match *variable {
            Variable::Local { index, .. } => Variable::Local { frame, index },
            Variable::StackEntry { index, .. } => Variable::StackEntry { frame, index },
        })
        .collect()
}

fn call_site(method: usize, pc: usize) -> usize {
    (method << PC_BITS) | pc
}

fn encode_event(method: usize, pc: usize) -> Result<i32> {
    ensure!(method <= MAX_METHOD && pc <= PC_MASK, "event ({method}, {pc}) out of range");
    Ok(i32::try_from(call_site(method, pc))?)
}

fn decode_event(event: i32) -> Result<(usize, usize)> {
    let event = usize::try_from(event).map_err(|_| eyre!("negative event {event}"))?;
    Ok((event >> PC_BITS, event & PC_MASK))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_codes() {
        let event = encode_event(3, 17).unwrap();
        assert_eq!(decode_event(event).unwrap(), (3, 17));
        assert!(encode_event(MAX_METHOD + 1, 0).is_err());
        assert!(decode_event(-1).is_err());
    }

    #[test]
    fn test_final_entry_depth() {
        let program =
            Program::new(vec![Instruction::Push(1), Instruction::Dup, Instruction::Push(2)]);
        assert_eq!(program.final_entry_depth().unwrap(), 3);
        assert_eq!(Program::unrolled_sum(10).final_entry_depth().unwrap(), 0);
        assert!(Program::new(vec![Instruction::Add]).final_entry_depth().is_err());
    }
}
