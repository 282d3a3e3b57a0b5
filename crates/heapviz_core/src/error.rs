//! Error types for the heapviz simulator.

use thiserror::Error;

use crate::gc::heap::Loc;
use crate::objects::header::Tag;

/// All errors that can be produced by the simulator core.
///
/// Every one of these is fatal for the run: the driver reports it on the
/// error stream and exits nonzero.  There is no recovery path; this is a
/// teaching tool, not a production allocator.
#[derive(Debug, Error)]
pub enum HeapvizError {
    /// A bump reservation would run past the end of the heap.
    #[error("heap exhausted: reserving {requested} words at top {top}")]
    HeapExhausted {
        /// Bump cursor at the time of the failed reservation.
        top: Loc,
        /// Number of words requested.
        requested: u16,
    },

    /// A handle pointed at the Nil sentinel where a real object was
    /// required (the classic symptom of a botched reference fixup).
    #[error("invalid handle access: location 0 where {expected} was expected")]
    InvalidHandleAccess {
        /// Human-readable description of the expected variant.
        expected: &'static str,
    },

    /// A variant-specific operation was applied to the wrong variant.
    #[error("type mismatch: expected {expected}, found {found:?} at location {loc}")]
    TypeMismatch {
        /// Human-readable description of the expected variant.
        expected: &'static str,
        /// Tag actually found in the header.
        found: Tag,
        /// Heap location of the offending object.
        loc: Loc,
    },

    /// A header decoded from the heap is out of range, or a forwarding
    /// address was seen outside of a copying collection.
    #[error("corrupt heap at location {loc}: {reason}")]
    CorruptHeap {
        /// Heap location of the bad word.
        loc: Loc,
        /// What went wrong while decoding.
        reason: &'static str,
    },

    /// The trace sink's output stream failed.
    #[error("trace output error: {0}")]
    TraceIo(std::io::Error),

    /// Reading the workload input failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenient `Result` alias for fallible simulator operations.
pub type HeapvizResult<T> = Result<T, HeapvizError>;
