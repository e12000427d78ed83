use std::sync::atomic::{AtomicU64, Ordering};

/// Optional counters for monitoring ring behavior.
///
/// All counters use relaxed ordering; they are diagnostics, not part of the
/// synchronization protocol.
#[derive(Debug, Default)]
pub struct Metrics {
    frames_allocated: AtomicU64,
    bytes_allocated: AtomicU64,
    wraparound_frames: AtomicU64,
    blocking_waits: AtomicU64,
    forced_commits: AtomicU64,
    frames_discarded: AtomicU64,
    bytes_discarded: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_frame_allocated(&self, bytes: u64) {
        self.frames_allocated.fetch_add(1, Ordering::Relaxed);
        self.bytes_allocated.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn add_wraparound_frame(&self) {
        self.wraparound_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_blocking_wait(&self) {
        self.blocking_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_forced_commit(&self) {
        self.forced_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_frame_discarded(&self, bytes: u64) {
        self.frames_discarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_discarded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_allocated: self.frames_allocated.load(Ordering::Relaxed),
            bytes_allocated: self.bytes_allocated.load(Ordering::Relaxed),
            wraparound_frames: self.wraparound_frames.load(Ordering::Relaxed),
            blocking_waits: self.blocking_waits.load(Ordering::Relaxed),
            forced_commits: self.forced_commits.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a ring's [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Frames handed out by `allocate_input_frame`.
    pub frames_allocated: u64,
    /// Total rounded frame bytes handed out.
    pub bytes_allocated: u64,
    /// Allocations that had to leave a wraparound sentinel behind.
    pub wraparound_frames: u64,
    /// Times the producer parked waiting for the consumer.
    pub blocking_waits: u64,
    /// Commits forced by the allocator to avoid self-deadlock.
    pub forced_commits: u64,
    /// Frames reclaimed by the consumer.
    pub frames_discarded: u64,
    /// Total rounded frame bytes reclaimed.
    pub bytes_discarded: u64,
}
