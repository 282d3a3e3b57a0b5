//! The Vec variant: an amortized-growth list backed by a Tup.
//!
//! Layout: `[header, len, tup]` — three words.  `len` counts elements in
//! use; `tup` is the location of the backing tuple, whose own length is
//! the capacity.  A push that finds `len == capacity` first rebuilds the
//! backing tuple at double capacity via copy-construction.

use crate::error::{HeapvizError, HeapvizResult};
use crate::gc::heap::{Heap, Loc};
use crate::objects;
use crate::objects::header::Tag;
use crate::objects::tuple;

/// Words consumed by a Vec object (the backing tuple is separate).
pub(crate) const SIZE: u16 = 3;

/// Allocate and initialise a vector and its backing tuple.
///
/// The vector lands first so it sits below its tuple in the heap, the
/// layout the animation expects.
pub(crate) fn alloc_with_capacity(heap: &mut Heap, capacity: u16) -> HeapvizResult<Loc> {
    let loc = heap.alloc(SIZE)?;
    let tup = heap.alloc(tuple::size_needed(capacity))?;
    tuple::init(heap, tup, capacity);
    init(heap, loc, tup);
    Ok(loc)
}

/// Initialise a freshly allocated Vec at `loc`.
///
/// `tup` must be an already-shared backing tuple: the caller transfers
/// one reference count to the vector's `tup` field.
pub(crate) fn init(heap: &mut Heap, loc: Loc, tup: Loc) {
    heap.init_obj(loc, Tag::Vec);
    heap.set_word(loc + 1, 0);
    heap.trace.set_int(loc + 1, 0);
    heap.set_word(loc + 2, tup);
    heap.trace.set_ref(loc + 2, tup);
}

/// Number of elements in use.
pub(crate) fn len(heap: &Heap, loc: Loc) -> u16 {
    heap.word(loc + 1)
}

/// Location of the backing tuple, without touching the read clock.
pub(crate) fn backing(heap: &Heap, loc: Loc) -> Loc {
    heap.word(loc + 2)
}

fn backing_checked(heap: &mut Heap, loc: Loc) -> HeapvizResult<Loc> {
    heap.trace.note_read(loc + 2);
    let tup = backing(heap, loc);
    if tup == 0 {
        return Err(HeapvizError::InvalidHandleAccess {
            expected: "a vector's backing tuple",
        });
    }
    Ok(tup)
}

/// Read element `i`.
pub(crate) fn get(heap: &mut Heap, loc: Loc, i: u16) -> HeapvizResult<Loc> {
    assert!(i < len(heap, loc), "vector index {i} out of bounds");
    let tup = backing_checked(heap, loc)?;
    Ok(tuple::get(heap, tup, i))
}

/// Store an already-shared location at element `i`.
pub(crate) fn set_shared(heap: &mut Heap, loc: Loc, i: u16, value: Loc) -> HeapvizResult<()> {
    assert!(i < len(heap, loc), "vector index {i} out of bounds");
    let tup = backing_checked(heap, loc)?;
    tuple::set_shared(heap, tup, i, value)
}

/// Append `value`, growing the backing tuple when full.
///
/// `value` is shared into the new slot here; the caller keeps its own
/// reference.
pub(crate) fn push(heap: &mut Heap, loc: Loc, value: Loc) -> HeapvizResult<()> {
    let rendered = objects::dump_string(heap, value)?;
    heap.trace.comment(&format!("push {rendered}"));
    let n = len(heap, loc);
    let old_tup = backing(heap, loc);
    if tuple::len(heap, old_tup) == n {
        // Copy-construct a double-capacity tuple; init bumps the counts
        // of the slots the raw copy duplicated.
        let new_cap = (2 * n).max(1);
        let new_tup = heap.copy_obj(old_tup, tuple::size_needed(new_cap))?;
        tuple::init(heap, new_tup, new_cap);
        heap.unshare(old_tup)?;
        heap.set_word(loc + 2, new_tup);
        heap.trace.set_ref(loc + 2, new_tup);
    }
    let tup = backing(heap, loc);
    heap.rc_inc(value);
    tuple::set_shared(heap, tup, n, value)?;
    heap.set_word(loc + 1, n + 1);
    heap.trace.set_int(loc + 1, (n + 1) as i32);
    Ok(())
}

/// Linear scan: does any element's field `j` structurally equal `needle`?
pub(crate) fn contains(heap: &mut Heap, loc: Loc, j: u16, needle: Loc) -> HeapvizResult<bool> {
    for i in 0..len(heap, loc) {
        let other = objects::get_nested(heap, loc, i, j)?;
        if objects::equals(heap, needle, other)? {
            return Ok(true);
        }
    }
    Ok(false)
}
