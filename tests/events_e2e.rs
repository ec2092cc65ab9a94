#![cfg(unix)]

use std::os::unix::io::AsRawFd;
use std::time::Duration;

use spillway::{
    BufferRef, Destination, RuntimeError, SpillError, Spillway, SpillwayConfig,
};

fn buf(data: &[u8]) -> BufferRef {
    unsafe { BufferRef::from_raw(data.as_ptr(), data.len()) }
}

#[test]
fn completion_events_arrive_in_fifo_order() {
    let file = tempfile::tempfile().unwrap();
    let dest = Destination::from_fd(&file);
    let engine = Spillway::with_defaults();
    let events = engine.subscribe();

    let payloads: Vec<Vec<u8>> = (0..3u8).map(|i| vec![i; 100 * (usize::from(i) + 1)]).collect();
    for payload in &payloads {
        engine.submit(buf(payload), dest).unwrap();
    }
    engine.drain();

    let mut last_sequence = 0;
    for payload in &payloads {
        let ev = events.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(ev.sequence > last_sequence);
        last_sequence = ev.sequence;
        assert_eq!(ev.token, buf(payload).token());
        assert_eq!(ev.destination, dest);
        assert_eq!(ev.requested, payload.len());
        assert_eq!(ev.bytes_written, payload.len());
        assert!(ev.outcome.is_completed());
    }

    engine.shutdown();
}

#[test]
fn failed_write_surfaces_error_event_and_engine_continues() {
    // A read-only descriptor rejects every write with EBADF; the item is
    // truncated, not retried, and the failure shows up on the stream.
    let readonly = std::fs::File::open("/dev/null").unwrap();
    let bad = Destination::new(readonly.as_raw_fd()).unwrap();

    let mut good_file = tempfile::tempfile().unwrap();
    let good = Destination::from_fd(&good_file);

    let engine = Spillway::with_defaults();
    let events = engine.subscribe();

    let data = vec![1u8; 128];
    engine.submit(buf(&data), bad).unwrap();
    engine.drain();

    let ev = events.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(!ev.outcome.is_completed());
    assert_eq!(ev.bytes_written, 0);
    assert_eq!(ev.requested, 128);
    match &ev.outcome {
        spillway::WriteOutcome::Failed { errno, .. } => assert!(errno.is_some()),
        other => panic!("expected failed outcome, got {other:?}"),
    }

    // The failure is confined to that item; other traffic proceeds.
    engine.submit(buf(&data), good).unwrap();
    engine.drain();
    let ev = events.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(ev.outcome.is_completed());

    use std::io::{Read, Seek, SeekFrom};
    good_file.seek(SeekFrom::Start(0)).unwrap();
    let mut out = Vec::new();
    good_file.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);

    engine.shutdown();
}

#[test]
fn slow_subscriber_drops_events_without_blocking_workers() {
    let file = tempfile::tempfile().unwrap();
    let dest = Destination::from_fd(&file);
    let engine = Spillway::new(SpillwayConfig {
        event_stream_capacity: 2,
        ..SpillwayConfig::default()
    });
    let _events = engine.subscribe();

    let payloads: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i; 32]).collect();
    for payload in &payloads {
        engine.submit(buf(payload), dest).unwrap();
    }
    engine.drain();

    // Nothing consumed the stream: everything past its capacity was dropped.
    assert_eq!(engine.dropped_events(), 8);
    engine.shutdown();
}

#[test]
fn unsubscribed_stream_receives_nothing_and_costs_nothing() {
    let file = tempfile::tempfile().unwrap();
    let dest = Destination::from_fd(&file);
    let engine = Spillway::with_defaults();

    let events = engine.subscribe();
    events.unsubscribe();

    let data = vec![5u8; 64];
    engine.submit(buf(&data), dest).unwrap();
    engine.drain();

    assert!(events.try_recv().is_none());
    assert_eq!(engine.dropped_events(), 0);
    engine.shutdown();
}

#[test]
fn buffered_events_remain_readable_after_unsubscribe() {
    let file = tempfile::tempfile().unwrap();
    let dest = Destination::from_fd(&file);
    let engine = Spillway::with_defaults();
    let events = engine.subscribe();

    let data = vec![6u8; 64];
    engine.submit(buf(&data), dest).unwrap();
    engine.drain();

    events.unsubscribe();

    let ev = events.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(ev.outcome.is_completed());

    // Unregistered and exhausted: the stream reports disconnection.
    let err = events.recv().unwrap_err();
    assert!(matches!(
        err,
        SpillError::Runtime(RuntimeError::Disconnected { .. })
    ));

    engine.shutdown();
}

#[test]
fn idle_stream_times_out() {
    let engine = Spillway::with_defaults();
    let events = engine.subscribe();

    let err = events.recv_timeout(Duration::from_millis(20)).unwrap_err();
    assert!(matches!(
        err,
        SpillError::Runtime(RuntimeError::Timeout { .. })
    ));

    engine.shutdown();
}
