//! The Tup variant: a fixed-length array of location slots.
//!
//! Layout: `[header, len, slot0, slot1, …]` — `2 + len` words.  Slots hold
//! raw [`Loc`]s; 0 is Nil.  Slot writes follow share-then-unshare ordering
//! so self-assignment keeps the reference count intact.

use crate::error::HeapvizResult;
use crate::gc::heap::{Heap, Loc};
use crate::objects::header::Tag;

/// Words consumed by a Tup of `len` slots.
pub(crate) fn size_needed(len: u16) -> u16 {
    2 + len
}

/// Initialise the header and length of a Tup at `loc`.
///
/// Any nonzero slot values already present (a copy-constructed tuple
/// carries its source's slots) get their reference counts bumped, since
/// the raw word copy duplicated those references.
pub(crate) fn init(heap: &mut Heap, loc: Loc, len: u16) {
    heap.init_obj(loc, Tag::Tup);
    heap.set_word(loc + 1, len);
    heap.trace.set_int(loc + 1, len as i32);
    for i in 0..len {
        let slot = heap.word(loc + 2 + i);
        if slot != 0 {
            heap.rc_inc(slot);
        }
    }
}

/// Number of slots.
pub(crate) fn len(heap: &Heap, loc: Loc) -> u16 {
    heap.word(loc + 1)
}

/// Read slot `i`, noting the read for the visualizer.
pub(crate) fn get(heap: &mut Heap, loc: Loc, i: u16) -> Loc {
    assert!(i < len(heap, loc), "tuple index {i} out of bounds");
    heap.trace.note_read(loc + 2 + i);
    heap.word(loc + 2 + i)
}

/// Store an already-shared location into slot `i`.
///
/// The caller must have incremented `value`'s reference count *before*
/// this call (share-then-unshare); this function releases the evicted
/// slot value and writes the new one.
pub(crate) fn set_shared(heap: &mut Heap, loc: Loc, i: u16, value: Loc) -> HeapvizResult<()> {
    assert!(i < len(heap, loc), "tuple index {i} out of bounds");
    let old = heap.word(loc + 2 + i);
    heap.unshare(old)?;
    heap.set_word(loc + 2 + i, value);
    heap.trace.set_ref(loc + 2 + i, value);
    Ok(())
}
