use crate::align::round_up;
use crate::invariants::{
    debug_assert_frame_aligned, debug_assert_frame_contiguous, debug_assert_inside_buffer,
    debug_assert_wraparound_marker,
};
use crate::{AlignedBuffer, Config, ConsumedEvent, Error, Log, Metrics, MetricsSnapshot};
use crossbeam_utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// One ring has exactly two participants: the producer thread that owns it
// (through a PerThread holder) and the single background consumer.
//
// ## Offsets
//
// `input_start` (head) and `input_end` (tail) are byte offsets into the
// buffer and always point strictly inside it; advancing to the buffer end
// wraps straight to offset 0. Frames never straddle the end: when the tail
// segment cannot hold a frame, the producer leaves a one-word wraparound
// sentinel behind and continues at offset 0.
//
// ## Ordering protocol
//
// **Producer (allocate path):**
// 1. Read `input_end` (UnsafeCell, single-writer: this thread)
// 2. Load `input_start` with Relaxed. A stale (lower) head only shrinks the
//    apparent free space; the producer blocks spuriously, never overflows.
// 3. Write the frame bytes (published later by the facade's commit barrier,
//    not by this module)
// 4. Store `input_end` (UnsafeCell again; the consumer never reads it)
//
// **Consumer (discard path):**
// 1. Load `input_start` with Relaxed (only the consumer writes it)
// 2. Store the advanced head with Relaxed. The store reclaims space and
//    publishes no data, so it needs no release fence of its own.
// 3. Signal the consumed event. The event's mutex is the full barrier that
//    carries the head advance to a producer parked in `wait()`.
//
// The consumer learns how far it may read from the watermark the facade
// publishes in `commit()`, never by reading `input_end` directly. That
// release/acquire pair also covers the frame contents.
//
// ## Single-writer invariants
//
// - `input_end`, `commit_end`: written and read only by the producer thread
//   (`commit_end` is written by the facade's commit(), which runs on the
//   producer thread).
// - `input_start`: written only by the consumer (and by `wraparound`).
//
// =============================================================================

/// Reserved dispatch-word value meaning "skip to the ring base".
///
/// Never a valid dispatch pointer; the producer stores it in the first word
/// of the dead tail segment when a frame has to wrap.
pub const WRAPAROUND_MARKER: usize = usize::MAX;

/// Producer-private offsets, kept on one cache line away from the head.
struct ProducerPos {
    /// Tail: one past the last allocated byte.
    input_end: UnsafeCell<usize>,
    /// Watermark of published bytes; see [`ThreadInputBuffer::publish`].
    commit_end: UnsafeCell<usize>,
}

/// SPSC input ring for one producer thread.
///
/// Allocates variable-size, aligned input frames for log records. The
/// producer writes a frame, then publishes it through the front-end's
/// `commit()`; the consumer reads frames in order and hands the space back
/// with [`discard_input_frame`](Self::discard_input_frame).
///
/// The producer-side methods (`allocate_input_frame`, `publish`) must only
/// be called from the thread that owns the ring, the consumer-side methods
/// (`discard_input_frame`, `wraparound`) only from the single consumer
/// thread. The [`PerThread`](crate::PerThread) holder enforces the former.
pub struct ThreadInputBuffer {
    // === PRODUCER HOT === (cache-line aligned)
    producer: CachePadded<ProducerPos>,

    // === CONSUMER HOT === (cache-line aligned)
    /// Head: earliest byte not yet consumed.
    input_start: CachePadded<AtomicUsize>,

    // === COLD STATE ===
    /// Wakes a producer blocked on a full ring.
    consumed: ConsumedEvent,
    buffer: AlignedBuffer,
    frame_alignment_mask: usize,
    metrics: Metrics,
    config: Config,
    /// Back-reference for the self-deadlock commit; see `wait_input_consumed`.
    log: Arc<dyn Log>,
}

// SAFETY: the UnsafeCell fields are single-writer single-reader (producer
// thread only); the cross-thread state is the atomic head and the event.
// With the documented role split the type is safe to share.
unsafe impl Send for ThreadInputBuffer {}
unsafe impl Sync for ThreadInputBuffer {}

impl ThreadInputBuffer {
    /// Creates a ring for the calling thread.
    ///
    /// Fails with [`Error::Allocation`] if the buffer cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics on a configuration that [`Config::new`] would reject.
    pub fn new(log: Arc<dyn Log>, config: Config) -> Result<Self, Error> {
        assert!(config.frame_alignment.is_power_of_two());
        assert!(config.frame_alignment >= std::mem::size_of::<usize>());
        assert!(config.buffer_size % config.frame_alignment == 0);
        assert!(config.buffer_size >= 2 * config.frame_alignment);

        let buffer = AlignedBuffer::new(config.buffer_size, config.frame_alignment)?;
        Ok(Self {
            producer: CachePadded::new(ProducerPos {
                input_end: UnsafeCell::new(0),
                commit_end: UnsafeCell::new(0),
            }),
            input_start: CachePadded::new(AtomicUsize::new(0)),
            consumed: ConsumedEvent::new(),
            buffer,
            frame_alignment_mask: config.frame_alignment_mask(),
            metrics: Metrics::new(),
            config,
            log,
        })
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    /// Total buffer length in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.buffer.size()
    }

    /// Frame start/length granularity.
    #[inline]
    pub fn frame_alignment(&self) -> usize {
        self.frame_alignment_mask + 1
    }

    /// Buffer base address.
    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.buffer.as_ptr()
    }

    /// Current head offset.
    #[inline]
    pub fn input_start(&self) -> usize {
        self.input_start.load(Ordering::Relaxed)
    }

    /// Address of the byte at `offset`.
    ///
    /// # Panics
    ///
    /// Debug-asserts that `offset` lies inside the buffer.
    #[inline]
    pub fn frame_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert_inside_buffer!(offset, self.size());
        // SAFETY: offset is within the allocation.
        unsafe { NonNull::new_unchecked(self.buffer.as_ptr().as_ptr().add(offset)) }
    }

    /// Snapshot of the ring's metrics if enabled.
    pub fn metrics(&self) -> MetricsSnapshot {
        if self.config.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Returns the address of a fresh frame of `size` bytes, rounded up to
    /// the frame alignment.
    ///
    /// The frame is contiguous and owned by the caller until it is written
    /// and published via the front-end's `commit()`. If the ring is full the
    /// call spins briefly, then parks until the consumer reclaims space; it
    /// never fails. Call only from the thread that owns the ring.
    pub fn allocate_input_frame(&self, size: usize) -> NonNull<u8> {
        debug_assert!(size > 0, "input frames are never empty");
        let n = round_up(size, self.frame_alignment_mask);

        let backoff = Backoff::new();
        loop {
            if let Some(offset) = self.try_allocate(n) {
                if self.config.enable_metrics {
                    self.metrics.add_frame_allocated(n as u64);
                }
                return self.frame_at(offset);
            }
            if backoff.is_completed() {
                self.wait_input_consumed();
            } else {
                backoff.snooze();
            }
        }
    }

    /// One allocation attempt. Returns the frame offset, or `None` if `n`
    /// bytes do not fit right now.
    fn try_allocate(&self, n: usize) -> Option<usize> {
        let size = self.size();
        // SAFETY: input_end is only written by the producer (this code
        // path). No other thread writes to it, so this unsynchronized read
        // is safe.
        let input_end = unsafe { *self.producer.input_end.get() };
        // A stale head only under-reports free space; see the module banner.
        let input_start = self.input_start.load(Ordering::Relaxed);
        debug_assert_frame_aligned!(input_end, self.frame_alignment_mask);
        debug_assert_frame_aligned!(input_start, self.frame_alignment_mask);

        if input_end < input_start {
            // Wrapped tail: one contiguous free interval before the head.
            // Strictly less: filling it completely would leave
            // input_end == input_start, which is the empty state.
            if n < input_start - input_end {
                // SAFETY: single-writer, as above.
                unsafe { *self.producer.input_end.get() = advance_frame_pointer(input_end, n, size) };
                return Some(input_end);
            }
            None
        } else {
            // Unwrapped tail (or empty ring): free space at the tail end and
            // again below the head.
            if n < size - input_end {
                // SAFETY: single-writer, as above.
                unsafe { *self.producer.input_end.get() = advance_frame_pointer(input_end, n, size) };
                return Some(input_end);
            }
            if n < input_start {
                // The frame does not fit before the buffer end. Leave a
                // sentinel so the consumer skips the dead tail segment; one
                // word always fits because the tail is frame-aligned and
                // frames are at least one word.
                // SAFETY: the region at input_end is unallocated and only
                // this thread writes there before commit publishes it.
                unsafe {
                    self.frame_at(input_end)
                        .cast::<usize>()
                        .write(WRAPAROUND_MARKER);
                    *self.producer.input_end.get() = advance_frame_pointer(0, n, size);
                }
                if self.config.enable_metrics {
                    self.metrics.add_wraparound_frame();
                }
                return Some(0);
            }
            None
        }
    }

    /// Makes everything written so far eligible for the consumer.
    ///
    /// This is the ring's half of the front-end's `commit()`: it advances
    /// the commit watermark to the current tail and returns it. The caller
    /// must hand the watermark to the consumer with release semantics; that
    /// release (and the consumer's matching acquire) is what publishes the
    /// frame contents. Idempotent. Call only from the owning thread.
    pub fn publish(&self) -> usize {
        // SAFETY: both cells are written only by the producer thread; the
        // facade's commit() runs on the thread that produced the frames.
        unsafe {
            let input_end = *self.producer.input_end.get();
            *self.producer.commit_end.get() = input_end;
            input_end
        }
    }

    /// Parks until the consumer reclaims space.
    ///
    /// The producer itself may be the reason the ring is full: if everything
    /// it has published was already consumed, the missing space is its own
    /// unpublished writing and the consumer can never hand it back. Flush
    /// through the front-end first, then wait.
    fn wait_input_consumed(&self) {
        // SAFETY: commit_end is producer-private; see the module banner.
        let commit_end = unsafe { *self.producer.commit_end.get() };
        if commit_end == self.input_start.load(Ordering::Relaxed) {
            self.log.commit();
            if self.config.enable_metrics {
                self.metrics.add_forced_commit();
            }
        }
        if self.config.enable_metrics {
            self.metrics.add_blocking_wait();
        }
        self.consumed.wait();
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Reclaims a processed frame of `size` bytes (rounded up to the frame
    /// alignment) and wakes a blocked producer. Returns the new head offset.
    ///
    /// Call only from the consumer thread, in frame order.
    pub fn discard_input_frame(&self, size: usize) -> usize {
        let n = round_up(size, self.frame_alignment_mask);
        let input_start = self.input_start.load(Ordering::Relaxed);
        let next = advance_frame_pointer(input_start, n, self.size());
        // Relaxed: the store publishes no data, it only reclaims space. The
        // event below carries the barrier a parked producer needs.
        self.input_start.store(next, Ordering::Relaxed);
        if self.config.enable_metrics {
            self.metrics.add_frame_discarded(n as u64);
        }
        // Last: a producer parked in its destructor may release the ring as
        // soon as this discard empties it.
        self.consumed.signal();
        next
    }

    /// Moves the head back to the ring base.
    ///
    /// Call from the consumer thread when the dispatch word at the head is
    /// [`WRAPAROUND_MARKER`].
    pub fn wraparound(&self) {
        let input_start = self.input_start.load(Ordering::Relaxed);
        // SAFETY: the sentinel word was fully written before the watermark
        // covering it was published; the consumer's acquire on that
        // watermark makes this read well defined.
        debug_assert_wraparound_marker!(unsafe {
            self.frame_at(input_start).cast::<usize>().read()
        });
        self.input_start.store(0, Ordering::Relaxed);
    }
}

impl Drop for ThreadInputBuffer {
    /// Runs on the owning thread when it exits. Flushes anything the thread
    /// wrote but never published, then holds the thread until the consumer
    /// has drained every frame. Records must survive thread exit.
    fn drop(&mut self) {
        // May re-enter publish() through the front-end's commit().
        self.log.commit();
        // SAFETY: producer-private cell, and this drop runs on the producer.
        let input_end = unsafe { *self.producer.input_end.get() };
        while self.input_start.load(Ordering::Relaxed) != input_end {
            self.consumed.wait();
        }
    }
}

/// Returns `offset + n`, wrapping to the base when the result reaches the
/// buffer end. Frames never straddle the end, so a partial overshoot is a
/// bug on the caller's side.
fn advance_frame_pointer(offset: usize, n: usize, size: usize) -> usize {
    debug_assert_frame_contiguous!(offset, n, size);
    let next = offset + n;
    if next == size {
        0
    } else {
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullLog;
    impl Log for NullLog {
        fn commit(&self) {}
    }

    fn ring(buffer_size: usize) -> ThreadInputBuffer {
        let config = Config::new(buffer_size, 16, true);
        ThreadInputBuffer::new(Arc::new(NullLog), config).unwrap()
    }

    fn offset_of(ring: &ThreadInputBuffer, frame: NonNull<u8>) -> usize {
        frame.as_ptr() as usize - ring.base().as_ptr() as usize
    }

    #[test]
    fn test_sequential_allocations_are_contiguous() {
        let ring = ring(256);

        let a = ring.allocate_input_frame(32);
        assert_eq!(offset_of(&ring, a), 0);

        let b = ring.allocate_input_frame(48);
        assert_eq!(offset_of(&ring, b), 32);

        // Rounded up to the frame alignment.
        let c = ring.allocate_input_frame(24);
        assert_eq!(offset_of(&ring, c), 80);

        ring.publish();
        ring.discard_input_frame(32);
        ring.discard_input_frame(48);
        ring.discard_input_frame(24);
        assert_eq!(ring.input_start(), 112);
    }

    #[test]
    fn test_frames_are_aligned() {
        let ring = ring(1024);
        for size in [1, 7, 16, 17, 100] {
            let frame = ring.allocate_input_frame(size);
            let offset = offset_of(&ring, frame);
            assert_eq!(offset % ring.frame_alignment(), 0);
            ring.discard_input_frame(size);
        }
    }

    #[test]
    fn test_wraparound_sentinel() {
        let ring = ring(128);

        // Head 64, tail 112.
        ring.allocate_input_frame(64);
        let b = ring.allocate_input_frame(48);
        assert_eq!(offset_of(&ring, b), 64);
        ring.publish();
        ring.discard_input_frame(64);
        assert_eq!(ring.input_start(), 64);

        // 32 bytes do not fit in the 16-byte tail segment but do fit below
        // the head: sentinel at 112, frame at the base.
        let c = ring.allocate_input_frame(32);
        assert_eq!(offset_of(&ring, c), 0);
        // SAFETY: offset 112 is inside the buffer and holds the sentinel.
        let word = unsafe { ring.frame_at(112).cast::<usize>().read() };
        assert_eq!(word, WRAPAROUND_MARKER);

        // Consumer path: drain the frame at 64, hit the sentinel, wrap,
        // drain the wrapped frame.
        ring.publish();
        ring.discard_input_frame(48);
        assert_eq!(ring.input_start(), 112);
        ring.wraparound();
        assert_eq!(ring.input_start(), 0);
        ring.discard_input_frame(32);
        assert_eq!(ring.input_start(), 32);

        let snapshot = ring.metrics();
        assert_eq!(snapshot.wraparound_frames, 1);
        assert_eq!(snapshot.frames_allocated, 3);
        assert_eq!(snapshot.frames_discarded, 3);
    }

    #[test]
    fn test_wrapped_frame_contents_survive() {
        let ring = ring(128);

        ring.allocate_input_frame(96);
        ring.publish();
        ring.discard_input_frame(96);

        // Sentinel at 96, frame at the base.
        let frame = ring.allocate_input_frame(48);
        assert_eq!(offset_of(&ring, frame), 0);
        // SAFETY: the frame is owned by this thread until published.
        unsafe {
            frame.cast::<usize>().write(0x1000);
            frame.as_ptr().add(8).write_bytes(0x5A, 40);
        }
        ring.publish();

        ring.wraparound();
        // SAFETY: reading the frame the producer just published.
        unsafe {
            let head = ring.frame_at(ring.input_start());
            assert_eq!(head.cast::<usize>().read(), 0x1000);
            assert_eq!(head.as_ptr().add(8).read(), 0x5A);
            assert_eq!(head.as_ptr().add(47).read(), 0x5A);
        }
        ring.discard_input_frame(48);
    }

    #[test]
    fn test_publish_advances_watermark() {
        let ring = ring(256);
        assert_eq!(ring.publish(), 0);
        ring.allocate_input_frame(32);
        ring.allocate_input_frame(16);
        assert_eq!(ring.publish(), 48);
        // Idempotent with no new frames.
        assert_eq!(ring.publish(), 48);
        ring.discard_input_frame(32);
        ring.discard_input_frame(16);
    }

    #[test]
    fn test_discard_rounds_like_allocate() {
        let ring = ring(256);
        ring.allocate_input_frame(20);
        ring.publish();
        assert_eq!(ring.discard_input_frame(20), 32);
    }

    #[test]
    fn test_advance_frame_pointer_wraps_at_end() {
        assert_eq!(advance_frame_pointer(0, 32, 128), 32);
        assert_eq!(advance_frame_pointer(96, 32, 128), 0);
    }

    #[test]
    fn test_metrics_disabled_reads_zero() {
        let config = Config::new(256, 16, false);
        let ring = ThreadInputBuffer::new(Arc::new(NullLog), config).unwrap();
        ring.allocate_input_frame(32);
        ring.publish();
        ring.discard_input_frame(32);
        assert_eq!(ring.metrics(), MetricsSnapshot::default());
    }
}
