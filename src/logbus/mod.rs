// ABOUTME: Per-job append-only log with live fan-out to any number of subscribers.
// ABOUTME: Late subscribers get the backlog first, then live events, without gaps or repeats.

mod event;

pub use event::{LogEvent, Severity};

use async_stream::stream;
use chrono::Utc;
use futures::Stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::job::Stage;
use crate::types::JobId;

/// Live channel depth. Subscribers that fall further behind recover from the buffer.
const LIVE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum BusMessage {
    Event(LogEvent),
    Closed,
}

#[derive(Debug)]
struct Buffer {
    events: VecDeque<LogEvent>,
    next_seq: u64,
    cap: Option<usize>,
    closed: bool,
}

impl Buffer {
    fn since(&self, after: Option<u64>) -> Vec<LogEvent> {
        self.events
            .iter()
            .filter(|e| after.is_none_or(|last| e.seq > last))
            .cloned()
            .collect()
    }
}

/// One producer, many consumers. The producer never waits on a subscriber.
#[derive(Debug)]
pub struct LogBus {
    inner: Mutex<Buffer>,
    tx: broadcast::Sender<BusMessage>,
}

impl LogBus {
    /// `cap` bounds the retained backlog; `None` keeps everything. The
    /// newest event is always retained, so a cap of zero acts as one.
    pub fn new(cap: Option<usize>) -> Self {
        let (tx, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            inner: Mutex::new(Buffer {
                events: VecDeque::new(),
                next_seq: 0,
                cap: cap.map(|cap| cap.max(1)),
                closed: false,
            }),
            tx,
        }
    }

    /// Rebuild a bus from persisted events, e.g. after a restart.
    pub fn restore(events: Vec<LogEvent>, cap: Option<usize>, closed: bool) -> Self {
        let bus = Self::new(cap);
        {
            let mut buf = bus.inner.lock();
            buf.next_seq = events.last().map(|e| e.seq + 1).unwrap_or(0);
            buf.events = events.into();
            buf.closed = closed;
        }
        bus
    }

    /// Append a line. Returns the assigned sequence number, or `None` once closed.
    pub fn append(&self, stage: Stage, severity: Severity, line: impl Into<String>) -> Option<u64> {
        let mut buf = self.inner.lock();
        if buf.closed {
            return None;
        }

        let event = LogEvent {
            seq: buf.next_seq,
            timestamp: Utc::now(),
            stage,
            severity,
            line: line.into(),
        };
        buf.next_seq += 1;

        if let Some(cap) = buf.cap {
            while buf.events.len() >= cap {
                buf.events.pop_front();
            }
        }
        buf.events.push_back(event.clone());

        // Sent under the lock so subscribe() can never see an event twice or miss one.
        // No receivers is not an error.
        let seq = event.seq;
        let _ = self.tx.send(BusMessage::Event(event));
        Some(seq)
    }

    /// Mark the log complete. Open streams end after delivering everything.
    pub fn close(&self) {
        let mut buf = self.inner.lock();
        if !buf.closed {
            buf.closed = true;
            let _ = self.tx.send(BusMessage::Closed);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Retained events in order.
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.inner.lock().events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backlog followed by live events. Ends when the bus is closed.
    ///
    /// Dropping the stream detaches it; the producer is unaffected.
    pub fn subscribe(self: &Arc<Self>) -> impl Stream<Item = LogEvent> + Send + 'static + use<> {
        let bus = Arc::clone(self);
        let (backlog, mut rx, closed) = {
            let buf = bus.inner.lock();
            (buf.since(None), bus.tx.subscribe(), buf.closed)
        };

        stream! {
            let mut last: Option<u64> = None;
            for event in backlog {
                last = Some(event.seq);
                yield event;
            }
            if closed {
                return;
            }

            loop {
                match rx.recv().await {
                    Ok(BusMessage::Event(event)) => {
                        if last.is_none_or(|l| event.seq > l) {
                            last = Some(event.seq);
                            yield event;
                        }
                    }
                    Ok(BusMessage::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "log subscriber lagged, catching up from buffer");
                        let (missed, done) = {
                            let buf = bus.inner.lock();
                            (buf.since(last), buf.closed)
                        };
                        for event in missed {
                            last = Some(event.seq);
                            yield event;
                        }
                        if done {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let missed = bus.inner.lock().since(last);
                        for event in missed {
                            yield event;
                        }
                        break;
                    }
                }
            }
        }
    }
}

/// Writes one stage's lines to the bus and mirrors them into `tracing`.
#[derive(Debug, Clone)]
pub struct StageLog {
    bus: Arc<LogBus>,
    job: JobId,
    stage: Stage,
}

impl StageLog {
    pub fn new(bus: Arc<LogBus>, job: JobId, stage: Stage) -> Self {
        Self { bus, job, stage }
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn for_stage(&self, stage: Stage) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            job: self.job,
            stage,
        }
    }

    pub fn info(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!(job = %self.job, stage = %self.stage, "{}", line);
        self.bus.append(self.stage, Severity::Info, line);
    }

    pub fn warn(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::warn!(job = %self.job, stage = %self.stage, "{}", line);
        self.bus.append(self.stage, Severity::Warn, line);
    }

    pub fn error(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::error!(job = %self.job, stage = %self.stage, "{}", line);
        self.bus.append(self.stage, Severity::Error, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn sequence_numbers_increase() {
        let bus = LogBus::new(None);
        assert_eq!(bus.append(Stage::Received, Severity::Info, "a"), Some(0));
        assert_eq!(bus.append(Stage::Deciding, Severity::Info, "b"), Some(1));
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn append_after_close_is_ignored() {
        let bus = LogBus::new(None);
        bus.close();
        assert_eq!(bus.append(Stage::Received, Severity::Info, "late"), None);
        assert!(bus.is_empty());
    }

    #[test]
    fn cap_evicts_oldest_but_keeps_sequence() {
        let bus = LogBus::new(Some(2));
        for line in ["a", "b", "c"] {
            bus.append(Stage::Deploying, Severity::Info, line);
        }
        let events = bus.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].line, "b");
        assert_eq!(events[1].seq, 2);
    }

    #[test]
    fn restore_continues_numbering() {
        let bus = LogBus::new(None);
        bus.append(Stage::Received, Severity::Info, "a");
        bus.append(Stage::Deciding, Severity::Info, "b");
        let restored = LogBus::restore(bus.snapshot(), None, false);
        assert_eq!(restored.append(Stage::Deciding, Severity::Info, "c"), Some(2));
    }

    #[tokio::test]
    async fn closed_bus_stream_yields_backlog_then_ends() {
        let bus = Arc::new(LogBus::new(None));
        bus.append(Stage::Received, Severity::Info, "one");
        bus.append(Stage::Deciding, Severity::Warn, "two");
        bus.close();

        let lines: Vec<_> = bus.subscribe().map(|e| e.line).collect().await;
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn lagging_subscriber_recovers_from_buffer() {
        let bus = Arc::new(LogBus::new(None));
        let stream = bus.subscribe();
        for i in 0..(LIVE_CAPACITY + 50) {
            bus.append(Stage::Deploying, Severity::Info, format!("line {i}"));
        }
        bus.close();

        let seqs: Vec<_> = stream.map(|e| e.seq).collect().await;
        let expected: Vec<_> = (0..(LIVE_CAPACITY + 50) as u64).collect();
        assert_eq!(seqs, expected);
    }
}
