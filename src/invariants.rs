//! Debug assertion macros for ring buffer invariants.
//!
//! Only active in debug builds (`debug_assert!`), so there is zero overhead
//! on the release hot path.

/// Assert that an offset lies on a frame boundary.
macro_rules! debug_assert_frame_aligned {
    ($offset:expr, $mask:expr) => {
        debug_assert!(
            crate::align::is_aligned($offset, $mask),
            "offset {} is not aligned to {} bytes",
            $offset,
            $mask + 1
        )
    };
}

/// Assert that a frame is contiguous: it must not cross the buffer end.
macro_rules! debug_assert_frame_contiguous {
    ($offset:expr, $len:expr, $size:expr) => {
        debug_assert!(
            $offset + $len <= $size,
            "frame of {} bytes at offset {} crosses the buffer end at {}",
            $len,
            $offset,
            $size
        )
    };
}

/// Assert that a head or tail offset points strictly inside the buffer.
macro_rules! debug_assert_inside_buffer {
    ($offset:expr, $size:expr) => {
        debug_assert!(
            $offset < $size,
            "offset {} escaped the {}-byte buffer",
            $offset,
            $size
        )
    };
}

/// Assert that the word at the head really is the wraparound sentinel.
macro_rules! debug_assert_wraparound_marker {
    ($word:expr) => {
        debug_assert!(
            $word == crate::ring::WRAPAROUND_MARKER,
            "wraparound requested without a sentinel at the head (found {:#x})",
            $word
        )
    };
}

pub(crate) use debug_assert_frame_aligned;
pub(crate) use debug_assert_frame_contiguous;
pub(crate) use debug_assert_inside_buffer;
pub(crate) use debug_assert_wraparound_marker;
