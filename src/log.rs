//! The front-end contract the input ring depends on.

/// Interface to the log front-end that owns the shared queue and the
/// consumer thread.
///
/// The ring calls [`commit`](Self::commit) in exactly one situation: the
/// producer is about to block on a full ring while everything it previously
/// published has already been consumed, meaning the missing space is its own
/// unpublished writing. It is also called once from the ring's destructor so
/// no records are lost at thread exit.
///
/// An implementation obtains the calling thread's ring (typically through a
/// [`PerThread`](crate::PerThread) holder), calls
/// [`ThreadInputBuffer::publish`](crate::ThreadInputBuffer::publish), and
/// hands the returned watermark to the consumer with release semantics so
/// the consumer's matching acquire observes the frame contents. Must be
/// idempotent when nothing new has been produced.
pub trait Log: Send + Sync {
    /// Publishes every frame the calling thread has written so far.
    fn commit(&self);
}
