//! `heapviz_core` — a pedagogical simulator of garbage-collection
//! algorithms over a small, explicitly managed object heap.
//!
//! The simulator runs a representative workload (parsing comma-separated
//! log lines, grouping by a key, reducing, sorting) against a 2000-word
//! heap while emitting a trace of every allocation, mutation, copy and
//! reclamation.  An external animation replays the trace to show how
//! each collector behaves.
//!
//! # Crate layout
//!
//! - [`error`] — error types and the `HeapvizResult` alias.
//! - [`gc`] — the heap, root handles, collectors, trace sink and
//!   snapshotter.
//! - [`objects`] — the tagged object model (Nil, Num, Tup, Vec, Str and
//!   the bookkeeping variants Forward and Free).
//! - [`workload`] — the sample log-crunching workload driver.
//!
//! # A taste
//!
//! ```
//! use heapviz_core::gc::collector::GcMode;
//! use heapviz_core::gc::heap::Heap;
//! use heapviz_core::gc::roots::Handle;
//! use heapviz_core::gc::trace::TraceSink;
//!
//! let heap = Heap::new_shared(GcMode::MarkSweep, TraceSink::new(Box::new(std::io::sink())));
//! let scores = Handle::vec(&heap, 2)?;
//! let n = Handle::num(&heap, 42)?;
//! scores.push(&n)?;
//! heap.borrow_mut().collect()?;
//! assert_eq!(scores.get(0)?.to_i()?, 42);
//! # Ok::<(), heapviz_core::error::HeapvizError>(())
//! ```

/// Error types and [`HeapvizResult`][error::HeapvizResult] alias.
pub mod error;
/// Heap, handles, collectors, trace.
pub mod gc;
/// The tagged object model.
pub mod objects;
/// Sample workload driver.
pub mod workload;
