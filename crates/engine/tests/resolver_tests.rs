use std::ptr;

use bslice_engine::{FrameStack, StackError, VariableSet, VariableUsages};
use tracing::info;

/// (read, write) of a few stack machine instructions
const PUSH: (usize, usize) = (0, 1);
const ADD: (usize, usize) = (2, 1);
const DUP: (usize, usize) = (1, 2);
const SWAP: (usize, usize) = (2, 2);
const STORE: (usize, usize) = (1, 0);

#[test]
fn test_forward_and_backward_resolution_agree() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let program = [PUSH, PUSH, SWAP, DUP, ADD, ADD, STORE];

    let mut frames = FrameStack::new();
    frames.enter_frame();

    // Forward: execute and resolve right after each instruction.
    let mut forward = Vec::new();
    for &(read, write) in &program {
        let frame = frames.current_mut().unwrap();
        frame.pop(read).unwrap();
        frame.push(write);
        let depth = frame.stack_size();
        let usage = frame.resolve(read, write, depth).unwrap();
        forward.push((usage.defined_variables().to_vec(), usage.used_variables().to_vec()));
    }
    assert_eq!(frames.current().unwrap().stack_size(), 0);

    // Backward: undo each instruction after resolving it at the current depth.
    let mut backward = Vec::new();
    for &(read, write) in program.iter().rev() {
        let frame = frames.current_mut().unwrap();
        let depth = frame.stack_size();
        {
            let usage = frame.resolve(read, write, depth).unwrap();
            backward.push((usage.defined_variables().to_vec(), usage.used_variables().to_vec()));
        }
        frame.pop(write).unwrap();
        frame.push(read);
    }
    backward.reverse();

    assert_eq!(forward, backward);
    frames.exit_frame().unwrap();
}

#[test]
fn test_add_uses_both_operands_and_defines_lower_slot() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut frames = FrameStack::new();
    frames.enter_frame();
    let frame = frames.current_mut().unwrap();
    frame.push(3);

    // stack: [a, b, c]; ADD leaves [a, b+c]
    frame.pop(2).unwrap();
    frame.push(1);
    let usage = frame.resolve(ADD.0, ADD.1, frame.stack_size()).unwrap();

    assert_eq!(usage.defined_variables(), &VariableSet::Single(frame.stack_entry(1)));
    let used = usage.used_variables().to_vec();
    assert_eq!(used, vec![frame.stack_entry(1), frame.stack_entry(2)]);
}

#[test]
fn test_swap_defines_what_it_uses() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut frames = FrameStack::new();
    frames.enter_frame();
    let frame = frames.current_mut().unwrap();
    frame.push(4);

    let usage = frame.resolve(SWAP.0, SWAP.1, frame.stack_size()).unwrap();
    assert!(ptr::eq(usage.defined_variables(), usage.used_variables()));
    let defined = usage.defined_variables().to_vec();
    assert_eq!(defined, vec![frame.stack_entry(2), frame.stack_entry(3)]);
}

#[test]
fn test_frames_do_not_share_variables() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut frames = FrameStack::new();
    frames.enter_frame();
    frames.current_mut().unwrap().push(1);
    let outer = frames.current().unwrap().stack_entry(0);

    frames.enter_frame();
    frames.current_mut().unwrap().push(1);
    let inner = frames.current().unwrap().stack_entry(0);
    assert_ne!(outer, inner);

    frames.exit_frame().unwrap();
    frames.exit_frame().unwrap();
    assert!(matches!(frames.exit_frame(), Err(StackError::NoActiveFrame)));
}

#[test]
fn test_catch_block_clears_stack() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let mut frames = FrameStack::new();
    frames.enter_frame();
    let frame = frames.current_mut().unwrap();
    frame.push(5);
    let id = frame.id();

    let entry = frame.enter_catch_block();
    assert!(entry.is_catch_block());
    assert_eq!(entry.defined_variables().len(), 1);
    assert!(entry.defined_variables().iter().all(|v| v.frame() == id && v.index() == 0));
    let caught = bslice_engine::Variable::StackEntry { frame: id, index: 0 };
    assert!(entry.used_variables_for(caught).is_empty());
    assert_eq!(frames.current().unwrap().stack_size(), 1);
}
