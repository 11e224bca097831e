//! Progress event delivery.
//!
//! A run sends [`PipelineEvent`]s to one subscriber (the SSE handler)
//! through an unbounded channel. Sends are synchronous so retry callbacks
//! can emit progress without being async. The sender enforces the terminal
//! contract: after one `complete` or `error` nothing else goes out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use handarc_models::{CompleteData, HandId, PipelineEvent};

/// Create a progress channel. The receiver side is consumed by the SSE
/// handler (or collected wholesale in tests).
pub fn progress_channel() -> (ProgressSender, mpsc::UnboundedReceiver<PipelineEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSender {
            tx,
            terminal_sent: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        },
        rx,
    )
}

/// Sending half of a run's progress stream.
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<PipelineEvent>,
    terminal_sent: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl ProgressSender {
    /// Send an event. Returns false if it was suppressed (stream already
    /// terminated) or undeliverable (subscriber gone).
    pub fn send(&self, event: PipelineEvent) -> bool {
        if self.terminal_sent.load(Ordering::Acquire) {
            debug!("Suppressing {} after terminal event", event.event_name());
            return false;
        }
        if event.is_terminal() {
            // First terminal event wins; everything after is suppressed
            if self.terminal_sent.swap(true, Ordering::AcqRel) {
                return false;
            }
        }
        if self.tx.send(event).is_err() {
            self.closed.store(true, Ordering::Release);
            return false;
        }
        true
    }

    /// Whether the subscriber has gone away. Used to stop retrying work
    /// nobody is waiting for.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }

    /// Whether the terminal event has been sent.
    pub fn is_terminated(&self) -> bool {
        self.terminal_sent.load(Ordering::Acquire)
    }

    pub fn start(
        &self,
        segment_id: Option<String>,
        duration: f64,
        estimated_time: impl Into<String>,
    ) -> bool {
        self.send(PipelineEvent::start(segment_id, duration, estimated_time))
    }

    pub fn progress(&self, step: u32, total: u32, message: impl Into<String>) -> bool {
        self.send(PipelineEvent::progress(step, total, message))
    }

    pub fn step_complete(&self, step: u32, message: impl Into<String>) -> bool {
        self.send(PipelineEvent::step_complete(step, message))
    }

    pub fn hand(
        &self,
        hand_id: HandId,
        hand_number: impl Into<String>,
        confidence: Option<f64>,
    ) -> bool {
        self.send(PipelineEvent::hand(hand_id, hand_number, confidence))
    }

    pub fn complete(&self, data: CompleteData) -> bool {
        self.send(PipelineEvent::Complete(data))
    }

    pub fn error(&self, message: impl Into<String>, step: Option<u32>) -> bool {
        self.send(PipelineEvent::error(message, step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_data() -> CompleteData {
        CompleteData {
            total_hands: 1,
            saved_hands: 1,
            success_rate: 1.0,
            processing_time_ms: 10,
            average_confidence: None,
            batch_id: None,
            frame_count: None,
            ocr_accuracy: None,
        }
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let (tx, mut rx) = progress_channel();
        tx.start(None, 120.0, "60 seconds");
        tx.progress(1, 3, "working");
        tx.complete(complete_data());
        drop(tx);

        assert_eq!(rx.recv().await.unwrap().event_name(), "start");
        assert_eq!(rx.recv().await.unwrap().event_name(), "progress");
        assert_eq!(rx.recv().await.unwrap().event_name(), "complete");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_nothing_after_terminal() {
        let (tx, mut rx) = progress_channel();
        tx.error("boom", Some(2));
        assert!(!tx.progress(2, 3, "late"));
        assert!(!tx.complete(complete_data()));
        assert!(tx.is_terminated());
        drop(tx);

        assert_eq!(rx.recv().await.unwrap().event_name(), "error");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_detects_dropped_subscriber() {
        let (tx, rx) = progress_channel();
        drop(rx);
        assert!(!tx.progress(1, 3, "anyone there"));
        assert!(tx.is_closed());
    }
}
