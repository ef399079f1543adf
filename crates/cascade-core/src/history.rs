//! History sinks: where committed snapshots go.
//!
//! Recording never blocks a tick. [`HistoryRecorder`] keeps a bounded ring
//! of recent snapshots and drops the oldest when full; [`ChannelSink`]
//! hands snapshots to another task over a bounded tokio channel and drops
//! new ones when the consumer falls behind. Both count what they dropped.

use std::collections::VecDeque;

use cascade_types::Snapshot;
use tokio::sync::mpsc;
use tracing::warn;

/// A consumer of committed snapshots.
pub trait HistorySink: Send {
    /// Take a copy of one snapshot. Must not block.
    fn record(&mut self, snapshot: &Snapshot);
}

/// Bounded in-memory history.
#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    capacity: usize,
    entries: VecDeque<Snapshot>,
    dropped: u64,
}

impl HistoryRecorder {
    /// Keep at most `capacity` snapshots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            dropped: 0,
        }
    }

    /// Retained snapshots, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &Snapshot> {
        self.entries.iter()
    }

    /// The most recent snapshot.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.entries.back()
    }

    /// Number of retained snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshots evicted so far.
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl HistorySink for HistoryRecorder {
    fn record(&mut self, snapshot: &Snapshot) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.dropped = self.dropped.saturating_add(1);
        }
        self.entries.push_back(snapshot.clone());
    }
}

/// Forwards snapshots to a bounded channel without waiting.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Snapshot>,
    dropped: u64,
}

impl ChannelSink {
    /// Create a sink and the receiver its consumer reads from.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Snapshot>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, dropped: 0 }, rx)
    }

    /// Snapshots dropped because the channel was full or closed.
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl HistorySink for ChannelSink {
    fn record(&mut self, snapshot: &Snapshot) {
        if let Err(e) = self.tx.try_send(snapshot.clone()) {
            self.dropped = self.dropped.saturating_add(1);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "consumer behind",
                mpsc::error::TrySendError::Closed(_) => "consumer gone",
            };
            warn!(
                tick = snapshot.tick,
                dropped = self.dropped,
                reason,
                "History entry dropped"
            );
        }
    }
}

/// Fans one snapshot out to several sinks.
pub struct TeeSink<'a> {
    sinks: Vec<&'a mut dyn HistorySink>,
}

impl<'a> TeeSink<'a> {
    /// Record into every sink, in order.
    pub fn new(sinks: Vec<&'a mut dyn HistorySink>) -> Self {
        Self { sinks }
    }
}

impl HistorySink for TeeSink<'_> {
    fn record(&mut self, snapshot: &Snapshot) {
        for sink in &mut self.sinks {
            sink.record(snapshot);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn snapshot(tick: u64) -> Snapshot {
        Snapshot {
            tick,
            erosion_factor: 1.0,
            modules: Vec::new(),
            edges: Vec::new(),
            phases: BTreeMap::new(),
            actions: Vec::new(),
        }
    }

    #[test]
    fn recorder_drops_oldest() {
        let mut recorder = HistoryRecorder::new(3);
        for tick in 0..5 {
            recorder.record(&snapshot(tick));
        }
        assert_eq!(recorder.len(), 3);
        assert_eq!(recorder.dropped(), 2);
        let ticks: Vec<u64> = recorder.entries().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
        assert_eq!(recorder.latest().map(|s| s.tick), Some(4));
    }

    #[tokio::test]
    async fn channel_sink_never_blocks() {
        let (mut sink, mut rx) = ChannelSink::channel(2);
        for tick in 0..5 {
            sink.record(&snapshot(tick));
        }
        assert_eq!(sink.dropped(), 3);
        assert_eq!(rx.recv().await.map(|s| s.tick), Some(0));
        assert_eq!(rx.recv().await.map(|s| s.tick), Some(1));
    }

    #[test]
    fn closed_channel_counts_drops() {
        let (mut sink, rx) = ChannelSink::channel(4);
        drop(rx);
        sink.record(&snapshot(1));
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn tee_records_everywhere() {
        let mut a = HistoryRecorder::new(4);
        let mut b = HistoryRecorder::new(4);
        {
            let sinks: Vec<&mut dyn HistorySink> = vec![&mut a, &mut b];
            let mut tee = TeeSink::new(sinks);
            tee.record(&snapshot(9));
        }
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
