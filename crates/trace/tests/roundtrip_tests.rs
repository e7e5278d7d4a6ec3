use std::sync::Arc;

use bslice_common::{TraceConfig, ValueKind};
use bslice_trace::{
    header::read_thread_header, replay_sequence, Encoding, HeaderEntry, MemoryStore, ThreadKey,
    TraceSequenceFactory,
};
use proptest::prelude::*;
use tracing::info;

fn record_longs(config: TraceConfig, values: &[i64]) -> (Arc<MemoryStore>, Vec<HeaderEntry>) {
    let store = Arc::new(MemoryStore::new());
    let factory = TraceSequenceFactory::new(store.clone(), config);
    let thread = ThreadKey(1);
    factory.with_thread(thread, |f| {
        let sequence = f.sequence_for(ValueKind::Long);
        for value in values {
            sequence.trace_long(*value).unwrap();
        }
    });
    factory.seal_all().unwrap();

    let mut header = Vec::new();
    factory.write_header(thread, &mut header).unwrap();
    let entries = read_thread_header(&mut header.as_slice()).unwrap();
    (store, entries)
}

fn replay_longs(store: &MemoryStore, entry: &HeaderEntry) -> Vec<i64> {
    replay_sequence::<i64>(store, entry).unwrap().map(Result::unwrap).collect()
}

fn encoding_of(entry: &HeaderEntry) -> Option<Encoding> {
    match entry {
        HeaderEntry::Stored(record) => Some(record.encoding),
        _ => None,
    }
}

#[test]
fn test_thousand_values_force_overflow_and_compression() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    // 10, 20, 30, 40, 41, 42, ... : a few jumps, then a long run
    let mut values = vec![10, 20, 30];
    values.extend((0..997).map(|i| 40 + i));
    assert_eq!(values.len(), 1000);

    let (store, entries) = record_longs(TraceConfig::default(), &values);
    assert_eq!(entries.len(), 1);
    assert_eq!(encoding_of(&entries[0]), Some(Encoding::Compressed));
    assert_eq!(store.region_count(), 1);

    let replayed = replay_longs(&store, &entries[0]);
    assert_eq!(replayed.len(), 1000);
    assert_eq!(&replayed[..3], &[1036, 1035, 1034]);
    assert_eq!(&replayed[997..], &[30, 20, 10]);
}

#[test]
fn test_raw_and_compressed_replays_agree() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let values: Vec<i64> = (0..600).map(|v| v * v - 7).collect();

    // everything stays in memory and is stored raw
    let raw_config = TraceConfig::default().with_buffer_threshold(10_000);
    let (raw_store, raw_entries) = record_longs(raw_config, &values);
    assert_eq!(encoding_of(&raw_entries[0]), Some(Encoding::Raw));

    let compressed_config = TraceConfig::default().with_buffer_threshold(16);
    let (gz_store, gz_entries) = record_longs(compressed_config, &values);
    assert_eq!(encoding_of(&gz_entries[0]), Some(Encoding::Compressed));

    let expected: Vec<i64> = values.iter().rev().copied().collect();
    assert_eq!(replay_longs(&raw_store, &raw_entries[0]), expected);
    assert_eq!(replay_longs(&gz_store, &gz_entries[0]), expected);
}

#[test]
fn test_disabled_factory_replays_empty() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let factory = TraceSequenceFactory::disabled();
    factory.with_thread(ThreadKey(4), |f| {
        for v in 0..100 {
            f.sequence_for(ValueKind::Int).trace_int(v).unwrap();
        }
    });
    factory.seal_all().unwrap();

    let mut header = Vec::new();
    factory.write_header(ThreadKey(4), &mut header).unwrap();
    assert_eq!(header, vec![0x00]);
    assert!(read_thread_header(&mut header.as_slice()).unwrap().is_empty());

    let store = MemoryStore::new();
    assert_eq!(replay_sequence::<i32>(&store, &HeaderEntry::Disabled).unwrap().count(), 0);
}

#[test]
fn test_two_threads_seal_and_replay_independently() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");

    let store = Arc::new(MemoryStore::new());
    let config = TraceConfig::default().with_buffer_threshold(32);
    let factory = Arc::new(TraceSequenceFactory::new(store.clone(), config));

    let handles: Vec<_> = [(ThreadKey(1), 1_000i32), (ThreadKey(2), 2_000i32)]
        .into_iter()
        .map(|(thread, base)| {
            let factory = factory.clone();
            std::thread::spawn(move || {
                let shared = factory.for_thread(thread);
                let mut local = shared.lock();
                for i in 0..100 {
                    local.sequence_for(ValueKind::Int).trace_int(base + i).unwrap();
                }
                local.seal().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for (thread, base) in [(ThreadKey(1), 1_000i32), (ThreadKey(2), 2_000i32)] {
        let mut header = Vec::new();
        factory.write_header(thread, &mut header).unwrap();
        let entries = read_thread_header(&mut header.as_slice()).unwrap();
        let replayed: Vec<i32> = replay_sequence(store.as_ref(), &entries[0])
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(replayed, (0..100).rev().map(|i| base + i).collect::<Vec<_>>());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_replay_is_exact_reverse(
        values in proptest::collection::vec(any::<i64>(), 0..1_500),
        buffer in 1usize..64,
        chunk in 1usize..100,
    ) {
        let config = TraceConfig::default()
            .with_buffer_threshold(buffer)
            .with_backward_chunk_size(chunk)
            .with_seal_thresholds(128, 100);
        let (store, entries) = record_longs(config, &values);
        let expected: Vec<i64> = values.iter().rev().copied().collect();
        prop_assert_eq!(replay_longs(&store, &entries[0]), expected);
    }
}
