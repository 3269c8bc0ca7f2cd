use super::AudioFrame;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Lock-free ring buffer that decouples the real-time capture thread from
/// the async pipeline. The capture callback calls [`write`](Self::write),
/// which never blocks; the frame stream task calls [`drain`](Self::drain)
/// to collect accumulated frames.
///
/// Concurrency contract: exactly one writer thread and one reader task.
/// Overflow drops the frame; this is the only lossy point in the pipeline,
/// observable through [`dropped`](Self::dropped).
pub struct RingBuffer {
    slots: Box<[UnsafeCell<Option<AudioFrame>>]>,
    read_index: AtomicUsize,
    write_index: AtomicUsize,
    len: AtomicUsize,
    dropped: AtomicU64,
}

// Safety: slot access is disjoint between the single producer (writes only
// unoccupied slots past the tail) and the single consumer (reads only
// occupied slots before the head), synchronized through `len`.
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            read_index: AtomicUsize::new(0),
            write_index: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames rejected because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Non-blocking write from the capture thread. Returns `false` if the
    /// buffer is full and the frame was dropped.
    pub fn write(&self, frame: AudioFrame) -> bool {
        if self.len.load(Ordering::Acquire) >= self.capacity() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let idx = self.write_index.load(Ordering::Relaxed);
        unsafe {
            *self.slots[idx].get() = Some(frame);
        }
        self.write_index
            .store((idx + 1) % self.capacity(), Ordering::Relaxed);
        self.len.fetch_add(1, Ordering::Release);
        true
    }

    /// Removes and returns every currently buffered frame, in write order.
    /// Called only from the frame stream task.
    pub fn drain(&self) -> Vec<AudioFrame> {
        let available = self.len.load(Ordering::Acquire);
        if available == 0 {
            return Vec::new();
        }
        let mut frames = Vec::with_capacity(available);
        let mut idx = self.read_index.load(Ordering::Relaxed);
        for _ in 0..available {
            let slot = unsafe { (*self.slots[idx].get()).take() };
            if let Some(frame) = slot {
                frames.push(frame);
            }
            idx = (idx + 1) % self.capacity();
        }
        self.read_index.store(idx, Ordering::Relaxed);
        self.len.fetch_sub(frames.len(), Ordering::Release);
        frames
    }

    /// Empties the buffer. Only safe once the producer has stopped.
    pub fn clear(&self) {
        let _ = self.drain();
    }
}
