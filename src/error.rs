//! Error types for ring and holder construction.

use thiserror::Error;

/// Errors surfaced while setting up a ring or a per-thread instance.
///
/// Steady-state ring operations never return errors: allocation blocks,
/// consumption is total. Only construction paths can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The OS refused a memory request (buffer allocation, or `ENOMEM` from
    /// the thread-local system when registering a per-thread instance).
    #[error("allocation failed")]
    Allocation,

    /// A thread-local storage call failed with the given errno.
    #[error("thread-local storage call failed (errno {0})")]
    System(i32),
}

impl Error {
    /// Maps an errno from the thread-local system onto the error kinds above.
    pub(crate) fn from_errno(code: i32) -> Self {
        if code == libc::ENOMEM {
            Self::Allocation
        } else {
            Self::System(code)
        }
    }
}
