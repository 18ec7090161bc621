// ABOUTME: Integration tests for the per-job log bus.
// ABOUTME: Late subscribers must see backlog then live events, with no gaps or repeats.

use autodeploy::job::Stage;
use autodeploy::logbus::{LogBus, LogEvent, Severity};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

fn lines(events: &[LogEvent]) -> Vec<&str> {
    events.iter().map(|e| e.line.as_str()).collect()
}

#[tokio::test]
async fn subscribers_attached_at_different_times_see_the_canonical_log() {
    let bus = Arc::new(LogBus::new(None));
    let early = tokio::spawn(bus.subscribe().collect::<Vec<_>>());

    for i in 0..50 {
        bus.append(Stage::Deciding, Severity::Info, format!("line {i}"));
    }

    let late = tokio::spawn(bus.subscribe().collect::<Vec<_>>());

    let producer = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move {
            for i in 50..120 {
                bus.append(Stage::Provisioning, Severity::Info, format!("line {i}"));
                if i % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            bus.close();
        })
    };
    producer.await.unwrap();

    let canonical = bus.snapshot();
    assert_eq!(canonical.len(), 120);

    let early = early.await.unwrap();
    let late = late.await.unwrap();
    assert_eq!(early, canonical);
    assert_eq!(late, canonical);
    let seqs: Vec<u64> = late.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..120).collect::<Vec<_>>());
}

#[tokio::test]
async fn subscriber_after_close_gets_full_log_and_ends() {
    let bus = Arc::new(LogBus::new(None));
    bus.append(Stage::Received, Severity::Info, "received");
    bus.append(Stage::Failed, Severity::Error, "failed");
    assert!(!bus.is_closed());
    bus.close();
    assert!(bus.is_closed());

    let events: Vec<_> = bus.subscribe().collect().await;
    assert_eq!(lines(&events), vec!["received", "failed"]);
    assert!(bus.append(Stage::Failed, Severity::Info, "ignored").is_none());
}

#[tokio::test]
async fn dropping_a_subscriber_does_not_affect_others() {
    let bus = Arc::new(LogBus::new(None));
    let mut dropped = Box::pin(bus.subscribe());
    let kept = tokio::spawn(bus.subscribe().collect::<Vec<_>>());

    bus.append(Stage::Deciding, Severity::Info, "one");
    assert_eq!(dropped.next().await.unwrap().line, "one");
    drop(dropped);

    bus.append(Stage::Deciding, Severity::Info, "two");
    bus.close();

    let kept = tokio::time::timeout(Duration::from_secs(5), kept)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lines(&kept), vec!["one", "two"]);
}

#[tokio::test]
async fn slow_subscriber_recovers_from_the_buffer() {
    let bus = Arc::new(LogBus::new(None));
    let slow = bus.subscribe();

    // Far more than the live channel holds, before the subscriber polls once.
    for i in 0..3000 {
        bus.append(Stage::Deploying, Severity::Info, format!("line {i}"));
    }
    bus.close();

    let events: Vec<_> = slow.collect().await;
    assert_eq!(events, bus.snapshot());
}

#[test]
fn cap_evicts_oldest_but_keeps_sequence_numbers() {
    let bus = LogBus::new(Some(3));
    for i in 0..5 {
        bus.append(Stage::Patching, Severity::Info, format!("line {i}"));
    }
    let kept = bus.snapshot();
    assert_eq!(lines(&kept), vec!["line 2", "line 3", "line 4"]);
    assert_eq!(kept[0].seq, 2);
}

#[test]
fn zero_cap_keeps_only_the_newest_event() {
    let bus = LogBus::new(Some(0));
    assert_eq!(bus.append(Stage::Received, Severity::Info, "first"), Some(0));
    assert_eq!(bus.append(Stage::Failed, Severity::Error, "last"), Some(1));
    assert_eq!(lines(&bus.snapshot()), vec!["last"]);
}

#[tokio::test]
async fn restored_bus_continues_numbering() {
    let original = LogBus::new(None);
    original.append(Stage::Received, Severity::Info, "a");
    original.append(Stage::Deciding, Severity::Info, "b");

    let restored = Arc::new(LogBus::restore(original.snapshot(), None, false));
    assert_eq!(
        restored.append(Stage::Deciding, Severity::Warn, "c"),
        Some(2)
    );
    restored.close();
    let events: Vec<_> = restored.subscribe().collect().await;
    assert_eq!(lines(&events), vec!["a", "b", "c"]);
}
