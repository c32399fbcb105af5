//! Allocator errors.

use core::fmt;

/// An error from setting up or growing a heap.
///
/// The C-style entry points swallow these and hand out null pointers instead;
/// the error type surfaces through [`Bookkeeper::new`](crate::Bookkeeper::new)
/// and friends, where the caller can still do something about it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AllocError {
    /// The heap source refused to grow any further.
    Exhausted,
    /// The heap source grew, but the new span did not continue the old one.
    ///
    /// This happens when something else moves the program break behind our
    /// back. The region must stay a single contiguous span, so the grown
    /// memory is unusable to us.
    Discontiguous,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllocError::Exhausted => f.write_str("heap source exhausted"),
            AllocError::Discontiguous => f.write_str("heap source grew discontiguously"),
        }
    }
}
