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


//! End-to-end tests: record a program forward, seal and persist the trace,
//! then replay it backwards and resolve every instruction again.

use std::thread;

use bslice_common::{TraceConfig, ValueKind};
use bslice_engine::MethodSignature;
use bslice_integration_tests::test_utils::{
    assert_same_steps, replay_backward, run_forward, Instruction, Program, CONTROL_SEQUENCE,
    VALUE_SEQUENCE,
};
use bslice_trace::{Encoding, HeaderEntry, ThreadKey, TraceDirectory, TraceSequenceFactory};
use tracing::info;

use Instruction::*;

fn program_with_calls() -> Program {
    let hash = MethodSignature::new("java/lang/Object", "hashCode", "()I");
    let mut program = Program::new(vec![
        Invoke { method: 4, args: 0 },
        Pop,
        Push(3),
        Push(4),
        Invoke { method: 2, args: 2 },
        Store(0),
        Push(7),
        Push(8),
        CallUntraced { signature: hash.clone(), args: 2 },
        Push(1),
        Swap,
        Pop,
        Store(1),
        Push(5),
        CallUntraced { signature: hash, args: 1 },
        Pop,
        Load(0),
        Load(1),
        Add,
    ]);
    // 1: square(x)
    program.add_method(vec![Load(0), Dup, Mul, Return]);
    // 2: sum_of_squares(a, b)
    program.add_method(vec![
        Load(0),
        Invoke { method: 1, args: 1 },
        Load(1),
        Invoke { method: 1, args: 1 },
        Add,
        Return,
    ]);
    // 3: constant()
    program.add_method(vec![Push(42), Return]);
    // 4: forward to constant()
    program.add_method(vec![Invoke { method: 3, args: 0 }, Return]);
    program
}

#[test]
fn test_record_and_replay_with_calls() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let dir = tempfile::tempdir().unwrap();
    let program = program_with_calls();
    let thread = ThreadKey(1);

    let factory = TraceDirectory::recorder(dir.path(), TraceConfig::default()).unwrap();
    let forward = factory.with_thread(thread, |t| run_forward(&program, t)).unwrap();
    assert_eq!(&forward.entry_locals[..2], &[25, 1]);
    assert_eq!(forward.untraced_methods, 1);
    assert_eq!(forward.steps.last().unwrap().written, vec![26]);
    TraceDirectory::persist(&factory, dir.path()).unwrap();

    let trace = TraceDirectory::open(dir.path()).unwrap();
    let entries = trace.entries(thread).unwrap();
    for entry in entries {
        assert!(matches!(entry, HeaderEntry::Stored(r) if r.encoding == Encoding::Raw));
    }

    let backward = replay_backward(&program, &trace, thread).unwrap();
    assert_same_steps(&forward.steps, &backward);
}

#[test]
fn test_long_run_is_compressed() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let dir = tempfile::tempdir().unwrap();
    let program = Program::unrolled_sum(600);
    let thread = ThreadKey(0);

    let factory = TraceDirectory::recorder(dir.path(), TraceConfig::default()).unwrap();
    let forward = factory.with_thread(thread, |t| run_forward(&program, t)).unwrap();
    assert_eq!(forward.entry_locals[0], 600 * 601 / 2);
    TraceDirectory::persist(&factory, dir.path()).unwrap();

    let stats = factory.with_thread(thread, |t| t.stats());
    assert_eq!(stats[CONTROL_SEQUENCE].values, 1 + 2 * 599 + 1);
    assert_eq!(stats[VALUE_SEQUENCE].values, 1 + 2 * 599);
    assert!(stats.iter().all(|s| s.spilled && s.encoding == Some(Encoding::Compressed)));

    let trace = TraceDirectory::open(dir.path()).unwrap();
    let backward = replay_backward(&program, &trace, thread).unwrap();
    assert_same_steps(&forward.steps, &backward);
}

#[test]
fn test_spilled_run_stored_raw_with_small_thresholds() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let dir = tempfile::tempdir().unwrap();
    let config = TraceConfig::default()
        .with_buffer_threshold(8)
        .with_seal_thresholds(64, 48)
        .with_backward_chunk_size(5);
    config.validate().unwrap();
    let program = Program::unrolled_sum(20);
    let thread = ThreadKey(2);

    let factory = TraceDirectory::recorder(dir.path(), config).unwrap();
    let forward = factory.with_thread(thread, |t| run_forward(&program, t)).unwrap();
    TraceDirectory::persist(&factory, dir.path()).unwrap();

    let stats = factory.with_thread(thread, |t| t.stats());
    assert_eq!(stats[CONTROL_SEQUENCE].values, 40);
    assert!(stats.iter().all(|s| s.spilled && s.encoding == Some(Encoding::Raw)));
    assert_eq!(stats[CONTROL_SEQUENCE].stored_bytes, 40 * 4);
    assert_eq!(stats[VALUE_SEQUENCE].stored_bytes, 39 * 8);

    let trace = TraceDirectory::open(dir.path()).unwrap();
    let backward = replay_backward(&program, &trace, thread).unwrap();
    assert_same_steps(&forward.steps, &backward);
}

#[test]
fn test_threads_record_independently() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let dir = tempfile::tempdir().unwrap();
    let programs = [program_with_calls(), Program::unrolled_sum(300)];
    let factory = TraceDirectory::recorder(dir.path(), TraceConfig::default()).unwrap();

    let runs: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = programs
            .iter()
            .enumerate()
            .map(|(i, program)| {
                let factory = &factory;
                scope.spawn(move || {
                    factory.with_thread(ThreadKey(i as u64), |t| run_forward(program, t)).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    TraceDirectory::persist(&factory, dir.path()).unwrap();

    let trace = TraceDirectory::open(dir.path()).unwrap();
    assert_eq!(trace.threads().collect::<Vec<_>>(), vec![ThreadKey(0), ThreadKey(1)]);
    for (i, (program, run)) in programs.iter().zip(&runs).enumerate() {
        let backward = replay_backward(program, &trace, ThreadKey(i as u64)).unwrap();
        assert_same_steps(&run.steps, &backward);
    }
}

#[test]
fn test_disabled_factory_still_resolves() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let dir = tempfile::tempdir().unwrap();
    let program = program_with_calls();
    let factory = TraceSequenceFactory::disabled();

    let forward = factory.with_thread(ThreadKey(5), |t| run_forward(&program, t)).unwrap();
    assert_eq!(forward.entry_locals[0], 25);
    assert!(!forward.steps.is_empty());

    TraceDirectory::persist(&factory, dir.path()).unwrap();
    assert_eq!(std::fs::read(dir.path().join("thread-5.hdr")).unwrap(), vec![0x00]);

    let trace = TraceDirectory::open(dir.path()).unwrap();
    assert_eq!(trace.entries(ThreadKey(5)), Some(&[][..]));
    assert!(replay_backward(&program, &trace, ThreadKey(5)).is_err());
}

#[test]
fn test_disabled_value_kind_cannot_be_replayed() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let dir = tempfile::tempdir().unwrap();
    let program = Program::unrolled_sum(10);
    let config = TraceConfig::default().with_disabled_kind(ValueKind::Long);
    let factory = TraceDirectory::recorder(dir.path(), config).unwrap();

    factory.with_thread(ThreadKey(0), |t| run_forward(&program, t)).unwrap();
    TraceDirectory::persist(&factory, dir.path()).unwrap();

    let trace = TraceDirectory::open(dir.path()).unwrap();
    let entries = trace.entries(ThreadKey(0)).unwrap();
    assert!(matches!(entries[CONTROL_SEQUENCE], HeaderEntry::Stored(_)));
    assert_eq!(entries[VALUE_SEQUENCE], HeaderEntry::Disabled);

    let err = replay_backward(&program, &trace, ThreadKey(0)).unwrap_err();
    assert!(err.to_string().contains("value trace ended early"));
}
