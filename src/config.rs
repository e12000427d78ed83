use std::mem::size_of;

/// Configuration for a [`ThreadInputBuffer`](crate::ThreadInputBuffer).
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Total buffer length in bytes; a multiple of `frame_alignment`.
    pub buffer_size: usize,
    /// Frame start/length granularity. Power of two, at least one machine
    /// word so the dispatch word of a frame is naturally aligned.
    pub frame_alignment: usize,
    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a new configuration with custom settings.
    ///
    /// # Panics
    ///
    /// Panics if `frame_alignment` is not a power of two, is smaller than a
    /// machine word, or does not evenly divide `buffer_size`. Panics if
    /// `buffer_size` cannot hold at least one frame (the ring stores at most
    /// `buffer_size - frame_alignment` usable bytes).
    pub const fn new(buffer_size: usize, frame_alignment: usize, enable_metrics: bool) -> Self {
        assert!(
            frame_alignment.is_power_of_two(),
            "frame_alignment must be a power of two"
        );
        assert!(
            frame_alignment >= size_of::<usize>(),
            "frame_alignment must hold a dispatch word"
        );
        assert!(
            buffer_size % frame_alignment == 0,
            "buffer_size must be a multiple of frame_alignment"
        );
        assert!(
            buffer_size >= 2 * frame_alignment,
            "buffer_size must hold at least one frame"
        );

        Self {
            buffer_size,
            frame_alignment,
            enable_metrics,
        }
    }

    /// Returns the mask used for frame round-up.
    #[inline]
    pub const fn frame_alignment_mask(&self) -> usize {
        self.frame_alignment - 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,
            frame_alignment: 16,
            enable_metrics: false,
        }
    }
}

/// Small per-thread buffers (4 KiB); for processes with many producer threads.
pub const LOW_FOOTPRINT_CONFIG: Config = Config::new(4 * 1024, 16, false);

/// Large per-thread buffers (1 MiB); producers rarely block on the consumer.
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(1024 * 1024, 16, false);
