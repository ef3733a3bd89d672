use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use pms_core::{DecoderStats, FrameStatus, MeasurementRecord};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

/// Snapshot of the most recently published frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reading {
    pub record: MeasurementRecord,
    pub status: FrameStatus,
    /// Number of frames published so far.
    pub sequence: u64,
    /// When the frame was decoded. `None` until the first frame.
    pub received_at: Option<Timestamp>,
}

impl Default for Reading {
    fn default() -> Self {
        Self {
            record: MeasurementRecord::NO_DATA,
            status: FrameStatus::Waiting,
            sequence: 0,
            received_at: None,
        }
    }
}

struct Inner {
    stats: DecoderStats,
    connected: bool,
}

/// Create the two ends of a sensor's shared state.
pub fn channel() -> (ReadingPublisher, SensorState) {
    let (tx, rx) = watch::channel(Reading::default());
    let inner = Arc::new(Mutex::new(Inner {
        stats: DecoderStats::default(),
        connected: true,
    }));

    (
        ReadingPublisher {
            tx,
            inner: Arc::clone(&inner),
        },
        SensorState { reading: rx, inner },
    )
}

/// Writing end, owned by the task that decodes the byte stream.
pub struct ReadingPublisher {
    tx: watch::Sender<Reading>,
    inner: Arc<Mutex<Inner>>,
}

impl ReadingPublisher {
    /// Publish a validated record and wake every waiter.
    pub fn publish(&self, record: MeasurementRecord) {
        self.tx.send_modify(|reading| {
            reading.record = record;
            reading.status = FrameStatus::Ok;
            reading.sequence += 1;
            reading.received_at = Some(Timestamp::now());
        });
    }

    pub async fn update_stats(&self, stats: DecoderStats) {
        let mut inner = self.inner.lock().await;
        inner.stats = stats;
    }

    /// Record that the byte stream ended.
    pub async fn disconnected(&self) {
        let mut inner = self.inner.lock().await;
        inner.connected = false;
    }
}

/// Read-only view of a sensor's published frames.
#[derive(Clone)]
pub struct SensorState {
    reading: watch::Receiver<Reading>,
    inner: Arc<Mutex<Inner>>,
}

impl SensorState {
    pub fn current(&self) -> Reading {
        *self.reading.borrow()
    }

    pub fn is_ok(&self) -> bool {
        self.reading.borrow().status == FrameStatus::Ok
    }

    /// Wait for a frame newer than `sequence`.
    ///
    /// Returns `None` when `timeout` elapses, when `cancel` fires, or when the
    /// publisher is gone.
    pub async fn wait_newer_than(
        &self,
        sequence: u64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Option<Reading> {
        let mut rx = self.reading.clone();
        let newer = async move {
            rx.wait_for(|reading| reading.sequence > sequence)
                .await
                .map(|reading| *reading)
        };

        tokio::select! {
            _ = cancel.cancelled() => None,
            waited = tokio::time::timeout(timeout, newer) => match waited {
                Ok(Ok(reading)) => Some(reading),
                Ok(Err(_closed)) => None,
                Err(_elapsed) => None,
            },
        }
    }

    pub async fn stats(&self) -> DecoderStats {
        let inner = self.inner.lock().await;
        inner.stats
    }

    /// Whether the byte stream is still being read.
    pub async fn is_connected(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: u16) -> MeasurementRecord {
        MeasurementRecord::from_words([value; MeasurementRecord::WORD_COUNT])
    }

    #[tokio::test]
    async fn publish_updates_snapshot() {
        let (publisher, state) = channel();
        assert!(!state.is_ok());
        assert!(state.current().record.is_no_data());

        publisher.publish(record(5));

        let reading = state.current();
        assert!(state.is_ok());
        assert_eq!(reading.record, record(5));
        assert_eq!(reading.sequence, 1);
        assert!(reading.received_at.is_some());
    }

    #[tokio::test]
    async fn waiter_sees_frame_published_while_waiting() {
        let (publisher, state) = channel();
        let cancel = CancellationToken::new();

        let waiter = {
            let state = state.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                state
                    .wait_newer_than(0, Duration::from_secs(5), &cancel)
                    .await
            })
        };

        tokio::task::yield_now().await;
        publisher.publish(record(9));

        let reading = waiter.await.unwrap().unwrap();
        assert_eq!(reading.record, record(9));
    }

    #[tokio::test]
    async fn wait_ignores_already_seen_frame() {
        let (publisher, state) = channel();
        publisher.publish(record(1));

        let waited = state
            .wait_newer_than(1, Duration::from_millis(20), &CancellationToken::new())
            .await;
        assert_eq!(waited, None);

        // Status stays Ok even though the wait found nothing new.
        assert!(state.is_ok());
    }

    #[tokio::test]
    async fn wait_is_cancellable() {
        let (_publisher, state) = channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let waited = state
            .wait_newer_than(0, Duration::from_secs(60), &cancel)
            .await;
        assert_eq!(waited, None);
    }

    #[tokio::test]
    async fn wait_ends_when_publisher_is_gone() {
        let (publisher, state) = channel();
        publisher.disconnected().await;
        drop(publisher);

        let waited = state
            .wait_newer_than(0, Duration::from_secs(60), &CancellationToken::new())
            .await;
        assert_eq!(waited, None);
        assert!(!state.is_connected().await);
    }
}
