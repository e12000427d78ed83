//! Property-based tests for the ring's allocation geometry.
//!
//! A small model mirrors the allocator's placement decision; proptest then
//! checks, for arbitrary request streams, that every returned frame is
//! aligned, contiguous, placed where the model says, and that draining the
//! outstanding frames in FIFO order always brings the ring back to empty.
//!
//! Production and consumption run on one thread here: a single thread
//! trivially satisfies the one-producer one-consumer discipline.

use logring::{Config, Log, ThreadInputBuffer, WRAPAROUND_MARKER};
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;

struct NullLog;
impl Log for NullLog {
    fn commit(&self) {}
}

const SIZE: usize = 256;
const ALIGN: usize = 16;

/// Largest request the tests hand out. Kept under half the buffer so a
/// request always fits once the ring is drained, wherever the head sits; a
/// bigger frame can be impossible to place contiguously and would park the
/// allocator forever.
const MAX_REQUEST: usize = SIZE / 2 - ALIGN;

fn new_ring() -> ThreadInputBuffer {
    ThreadInputBuffer::new(Arc::new(NullLog), Config::new(SIZE, ALIGN, false)).unwrap()
}

fn round(n: usize) -> usize {
    (n + ALIGN - 1) & !(ALIGN - 1)
}

fn offset_of(ring: &ThreadInputBuffer, frame: std::ptr::NonNull<u8>) -> usize {
    frame.as_ptr() as usize - ring.base().as_ptr() as usize
}

/// The allocator's placement rule for `n` rounded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    At(usize),
    Wrapped,
    NoSpace,
}

fn placement(end: usize, start: usize, n: usize) -> Placement {
    if end < start {
        if n < start - end {
            Placement::At(end)
        } else {
            Placement::NoSpace
        }
    } else if n < SIZE - end {
        Placement::At(end)
    } else if n < start {
        Placement::Wrapped
    } else {
        Placement::NoSpace
    }
}

/// FIFO record of what the consumer still owes the ring: rounded frame
/// lengths, with `usize::MAX` standing for a wraparound sentinel.
fn reclaim_oldest(ring: &ThreadInputBuffer, outstanding: &mut VecDeque<usize>) {
    match outstanding
        .pop_front()
        .expect("allocator reported full with nothing outstanding")
    {
        usize::MAX => ring.wraparound(),
        len => {
            ring.discard_input_frame(len);
        }
    }
}

proptest! {
    #[test]
    fn prop_frames_are_aligned_contiguous_and_placed_like_the_model(
        sizes in prop::collection::vec(1usize..=MAX_REQUEST, 1..100),
    ) {
        let ring = new_ring();
        let mut outstanding: VecDeque<usize> = VecDeque::new();
        let mut model_end = 0usize;

        for size in sizes {
            let n = round(size);

            // Make room the way the consumer would: oldest frame first.
            while placement(model_end, ring.input_start(), n) == Placement::NoSpace {
                reclaim_oldest(&ring, &mut outstanding);
            }
            let expected = placement(model_end, ring.input_start(), n);

            let frame = ring.allocate_input_frame(size);
            let offset = offset_of(&ring, frame);

            prop_assert_eq!(offset % ALIGN, 0, "frame start off the alignment grid");
            prop_assert!(offset + n <= SIZE, "frame crosses the buffer end");

            match expected {
                Placement::At(at) => {
                    prop_assert_eq!(offset, at);
                    outstanding.push_back(n);
                    model_end = at + n;
                }
                Placement::Wrapped => {
                    prop_assert_eq!(offset, 0);
                    // SAFETY: the dead tail segment belongs to the producer
                    // until the consumer reclaims it.
                    let word = unsafe { ring.frame_at(model_end).cast::<usize>().read() };
                    prop_assert_eq!(word, WRAPAROUND_MARKER, "missing sentinel");
                    outstanding.push_back(usize::MAX);
                    outstanding.push_back(n);
                    model_end = n;
                }
                Placement::NoSpace => unreachable!(),
            }

            // Head and tail always stay strictly inside the buffer.
            prop_assert!(ring.input_start() < SIZE);
            prop_assert!(model_end < SIZE);
        }

        // Full drain returns the ring to empty.
        while !outstanding.is_empty() {
            reclaim_oldest(&ring, &mut outstanding);
        }
        prop_assert_eq!(ring.input_start(), model_end);
    }

    #[test]
    fn prop_immediate_discard_keeps_ring_empty(
        sizes in prop::collection::vec(1usize..=MAX_REQUEST, 1..200),
    ) {
        let ring = new_ring();

        for size in sizes {
            let n = round(size);
            let frame = ring.allocate_input_frame(size);
            let offset = offset_of(&ring, frame);

            prop_assert_eq!(offset % ALIGN, 0);
            prop_assert!(offset + n <= SIZE);

            // A frame at the base while the head sits elsewhere means the
            // allocation wrapped and left a sentinel behind.
            if offset == 0 && ring.input_start() != 0 {
                ring.wraparound();
            }
            let head = ring.discard_input_frame(size);
            prop_assert_eq!(head, offset + n, "head did not land on the tail");
        }
    }
}
