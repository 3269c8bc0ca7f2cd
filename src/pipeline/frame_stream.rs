use crate::audio::{AudioFrame, RingBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

const DRAIN_INTERVAL: Duration = Duration::from_millis(5);

/// Task that pumps frames from the ring buffer into the frame channel.
///
/// Shutdown is signalled through the stop flag: the task performs one final
/// drain and then drops the sender, which is how downstream stages learn
/// that no more frames are coming.
pub struct FrameStream {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl FrameStream {
    pub fn spawn(ring: Arc<RingBuffer>, tx: mpsc::Sender<AudioFrame>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let task = tokio::spawn(async move {
            loop {
                let stopping = stop_flag.load(Ordering::Acquire);
                let frames = ring.drain();
                for frame in frames {
                    // An error means the receiver is gone; nothing left to do.
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
                if stopping {
                    debug!("frame stream drained and stopping");
                    return;
                }
                tokio::time::sleep(DRAIN_INTERVAL).await;
            }
        });

        Self { stop, task }
    }

    /// Signals shutdown and waits for the final drain to complete. The frame
    /// channel sender is dropped when the task exits.
    pub async fn stop_and_drain(self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> AudioFrame {
        AudioFrame {
            samples: vec![0; 160],
            captured_at_ms: sequence * 10,
            sample_rate: 16_000,
            sequence,
        }
    }

    #[tokio::test]
    async fn forwards_frames_in_order() {
        let ring = Arc::new(RingBuffer::new(16));
        let (tx, mut rx) = mpsc::channel(16);
        let stream = FrameStream::spawn(ring.clone(), tx);

        for i in 0..5 {
            ring.write(frame(i));
        }

        for expected in 0..5 {
            let frame = rx.recv().await.unwrap();
            assert_eq!(frame.sequence, expected);
        }
        stream.stop_and_drain().await;
    }

    #[tokio::test]
    async fn stop_drains_remaining_frames_then_closes_channel() {
        let ring = Arc::new(RingBuffer::new(16));
        let (tx, mut rx) = mpsc::channel(16);
        let stream = FrameStream::spawn(ring.clone(), tx);

        for i in 0..3 {
            ring.write(frame(i));
        }
        stream.stop_and_drain().await;

        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }
        // recv returning None proves the sender was dropped.
        assert_eq!(received, 3);
    }
}
