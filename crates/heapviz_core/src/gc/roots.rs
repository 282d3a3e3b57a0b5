//! Root handles: the only way the mutator touches the heap.
//!
//! A [`Handle`] wraps a slot in the process-wide root registry.  The slot
//! holds the object's current [`Loc`]; collectors rewrite the slots after
//! moving objects, so a handle stays valid across relocation.  Raw
//! locations must never be cached across an operation that can allocate
//! or collect — always re-read through the handle.
//!
//! Handles register on construction and unregister on drop.  Under the
//! RefCount mode a handle's construction and destruction also adjust its
//! referent's count, releasing storage eagerly when the count reaches
//! zero.

use std::rc::Rc;

use crate::error::{HeapvizError, HeapvizResult};
use crate::gc::heap::{Loc, SharedHeap};
use crate::objects;
use crate::objects::header::Tag;
use crate::objects::{number, string, tuple, vector};

/// Registry of every live handle's location.
///
/// Slot `i` is `Some(loc)` while the owning [`Handle`] is alive and
/// `None` once it has been dropped; freed slots are reused.  The
/// collectors enumerate this registry as the root set and rewrite the
/// slots after relocation.
pub(crate) struct RootSet {
    slots: Vec<Option<Loc>>,
}

impl RootSet {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register `loc` and return its slot index.
    pub(crate) fn register(&mut self, loc: Loc) -> usize {
        if let Some(idx) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[idx] = Some(loc);
            return idx;
        }
        let idx = self.slots.len();
        self.slots.push(Some(loc));
        idx
    }

    /// Clear the slot at `index`, returning the location it held.
    pub(crate) fn unregister(&mut self, index: usize) -> Loc {
        self.slots[index]
            .take()
            .expect("unregistering a vacant root slot")
    }

    /// Current location in the slot at `index`.
    pub(crate) fn get(&self, index: usize) -> Loc {
        self.slots[index].expect("reading a vacant root slot")
    }

    /// Rewrite the slot at `index` (post-move fixup).
    pub(crate) fn set(&mut self, index: usize, loc: Loc) {
        debug_assert!(self.slots[index].is_some(), "fixup of a vacant root slot");
        self.slots[index] = Some(loc);
    }

    /// All live root locations, in registry order.
    pub(crate) fn locs(&self) -> Vec<Loc> {
        self.slots.iter().filter_map(|s| *s).collect()
    }

    /// Indices of all live slots, for the fixup pass.
    pub(crate) fn live_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|_| i))
            .collect()
    }
}

/// A rooted reference to a heap object.
///
/// Construction modes mirror the heap's sharing protocol: allocate a
/// fresh object, copy-construct from an existing one, or share an
/// existing location.  Cloning a handle shares its current location.
pub struct Handle {
    heap: SharedHeap,
    slot: usize,
}

impl Handle {
    fn from_slot(heap: &SharedHeap, slot: usize) -> Self {
        Self {
            heap: Rc::clone(heap),
            slot,
        }
    }

    // ── Constructors ──────────────────────────────────────────────────────

    /// Allocate a Num holding `value`.
    pub fn num(heap: &SharedHeap, value: i16) -> HeapvizResult<Self> {
        let slot = {
            let mut h = heap.borrow_mut();
            let loc = h.alloc(number::SIZE)?;
            number::init(&mut h, loc, value);
            h.roots.register(loc)
        };
        Ok(Self::from_slot(heap, slot))
    }

    /// Allocate a Str holding `bytes`.
    pub fn str(heap: &SharedHeap, bytes: &[u8]) -> HeapvizResult<Self> {
        let slot = {
            let mut h = heap.borrow_mut();
            let loc = h.alloc(string::size_needed(bytes.len() as u16))?;
            string::init_from_bytes(&mut h, loc, bytes);
            h.roots.register(loc)
        };
        Ok(Self::from_slot(heap, slot))
    }

    /// Allocate a Tup of `len` Nil slots.
    pub fn tup(heap: &SharedHeap, len: u16) -> HeapvizResult<Self> {
        let slot = {
            let mut h = heap.borrow_mut();
            let loc = h.alloc(tuple::size_needed(len))?;
            tuple::init(&mut h, loc, len);
            h.roots.register(loc)
        };
        Ok(Self::from_slot(heap, slot))
    }

    /// Copy-construct a Tup of `new_len` slots from an existing tuple,
    /// carrying over `min(len, new_len)` slot values.
    pub fn tup_from_copy(heap: &SharedHeap, src: &Handle, new_len: u16) -> HeapvizResult<Self> {
        let slot = {
            let mut h = heap.borrow_mut();
            let src_loc = h.roots.get(src.slot);
            let loc = h.copy_obj(src_loc, tuple::size_needed(new_len))?;
            tuple::init(&mut h, loc, new_len);
            h.roots.register(loc)
        };
        Ok(Self::from_slot(heap, slot))
    }

    /// Allocate a Vec with room for `capacity` elements.
    pub fn vec(heap: &SharedHeap, capacity: u16) -> HeapvizResult<Self> {
        let slot = {
            let mut h = heap.borrow_mut();
            let loc = vector::alloc_with_capacity(&mut h, capacity)?;
            h.roots.register(loc)
        };
        Ok(Self::from_slot(heap, slot))
    }

    /// Adopt an existing location, sharing it.
    pub fn share(heap: &SharedHeap, loc: Loc) -> Self {
        let slot = {
            let mut h = heap.borrow_mut();
            let loc = h.read_barrier(loc);
            h.rc_inc(loc);
            h.roots.register(loc)
        };
        Self::from_slot(heap, slot)
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    /// The referent's current location.
    pub fn loc(&self) -> Loc {
        self.heap.borrow().roots.get(self.slot)
    }

    /// The referent's variant tag.
    pub fn tag(&self) -> HeapvizResult<Tag> {
        let h = self.heap.borrow();
        let loc = h.roots.get(self.slot);
        h.tag_at(loc)
    }

    /// The referent's size in words.
    pub fn size(&self) -> HeapvizResult<u16> {
        let h = self.heap.borrow();
        let loc = h.roots.get(self.slot);
        objects::size_of(&h, loc)
    }

    /// Element count of a Tup or Vec referent.
    pub fn length(&self) -> HeapvizResult<u16> {
        let h = self.heap.borrow();
        let loc = h.roots.get(self.slot);
        match h.tag_at(loc)? {
            Tag::Tup => Ok(tuple::len(&h, loc)),
            Tag::Vec => Ok(vector::len(&h, loc)),
            found => Err(HeapvizError::TypeMismatch {
                expected: "a tuple or vector",
                found,
                loc,
            }),
        }
    }

    /// Coerce the referent to an integer.
    pub fn to_i(&self) -> HeapvizResult<i16> {
        let mut h = self.heap.borrow_mut();
        let loc = h.roots.get(self.slot);
        objects::to_i(&mut h, loc)
    }

    /// Structural equality with another handle's referent.
    pub fn equals(&self, other: &Handle) -> HeapvizResult<bool> {
        let h = self.heap.borrow();
        let a = h.roots.get(self.slot);
        let b = h.roots.get(other.slot);
        objects::equals(&h, a, b)
    }

    /// Render the referent the way the trace comments show it.
    pub fn dump(&self) -> HeapvizResult<String> {
        let h = self.heap.borrow();
        let loc = h.roots.get(self.slot);
        objects::dump_string(&h, loc)
    }

    // ── Container operations ──────────────────────────────────────────────

    /// A fresh handle sharing element `i` of a Tup or Vec referent.
    pub fn get(&self, i: u16) -> HeapvizResult<Handle> {
        let child = {
            let mut h = self.heap.borrow_mut();
            let loc = h.roots.get(self.slot);
            match h.tag_at(loc)? {
                Tag::Tup => tuple::get(&mut h, loc, i),
                Tag::Vec => vector::get(&mut h, loc, i)?,
                found => {
                    return Err(HeapvizError::TypeMismatch {
                        expected: "a tuple or vector",
                        found,
                        loc,
                    })
                }
            }
        };
        Ok(Handle::share(&self.heap, child))
    }

    /// A fresh handle sharing element `j` of element `i` of a Vec referent.
    pub fn get_nested(&self, i: u16, j: u16) -> HeapvizResult<Handle> {
        let child = {
            let mut h = self.heap.borrow_mut();
            let loc = h.roots.get(self.slot);
            match h.tag_at(loc)? {
                Tag::Vec => objects::get_nested(&mut h, loc, i, j)?,
                found => {
                    return Err(HeapvizError::TypeMismatch {
                        expected: "a vector",
                        found,
                        loc,
                    })
                }
            }
        };
        Ok(Handle::share(&self.heap, child))
    }

    /// Store `value` into element `i` of a Tup or Vec referent.
    ///
    /// The new referent is shared *before* the old one is released, so a
    /// self-assignment leaves the count untouched.
    pub fn set(&self, i: u16, value: &Handle) -> HeapvizResult<()> {
        debug_assert!(
            Rc::ptr_eq(&self.heap, &value.heap),
            "handles from different heaps"
        );
        let mut h = self.heap.borrow_mut();
        let vloc = h.read_barrier(h.roots.get(value.slot));
        h.rc_inc(vloc);
        let loc = h.roots.get(self.slot);
        match h.tag_at(loc)? {
            Tag::Tup => tuple::set_shared(&mut h, loc, i, vloc),
            Tag::Vec => vector::set_shared(&mut h, loc, i, vloc),
            found => Err(HeapvizError::TypeMismatch {
                expected: "a tuple or vector",
                found,
                loc,
            }),
        }
    }

    /// Overwrite a Num referent's value.
    pub fn set_num(&self, value: i16) -> HeapvizResult<()> {
        let mut h = self.heap.borrow_mut();
        let loc = h.roots.get(self.slot);
        match h.tag_at(loc)? {
            Tag::Num => {
                number::set(&mut h, loc, value);
                Ok(())
            }
            found => Err(HeapvizError::TypeMismatch {
                expected: "a number",
                found,
                loc,
            }),
        }
    }

    /// Append `value` to a Vec referent, growing its backing tuple when
    /// full.
    pub fn push(&self, value: &Handle) -> HeapvizResult<()> {
        debug_assert!(
            Rc::ptr_eq(&self.heap, &value.heap),
            "handles from different heaps"
        );
        let mut h = self.heap.borrow_mut();
        let loc = h.roots.get(self.slot);
        match h.tag_at(loc)? {
            Tag::Vec => {
                let vloc = h.read_barrier(h.roots.get(value.slot));
                vector::push(&mut h, loc, vloc)
            }
            found => Err(HeapvizError::TypeMismatch {
                expected: "a vector",
                found,
                loc,
            }),
        }
    }

    /// Does any element's field `j` structurally equal `needle`?
    pub fn contains(&self, j: u16, needle: &Handle) -> HeapvizResult<bool> {
        let mut h = self.heap.borrow_mut();
        let loc = h.roots.get(self.slot);
        match h.tag_at(loc)? {
            Tag::Vec => {
                let nloc = h.roots.get(needle.slot);
                vector::contains(&mut h, loc, j, nloc)
            }
            found => Err(HeapvizError::TypeMismatch {
                expected: "a vector",
                found,
                loc,
            }),
        }
    }

    /// Split a Str referent on `sep`, returning a Vec of fresh Strs.
    pub fn split(&self, sep: u8) -> HeapvizResult<Handle> {
        let slot = {
            let mut h = self.heap.borrow_mut();
            let loc = h.roots.get(self.slot);
            let tag = h.tag_at(loc)?;
            if tag != Tag::Str {
                return Err(HeapvizError::TypeMismatch {
                    expected: "a string",
                    found: tag,
                    loc,
                });
            }
            let bounds = string::split_bounds(&mut h, loc, sep);
            let fields = vector::alloc_with_capacity(&mut h, bounds.len() as u16)?;
            for (begin, end) in bounds {
                let sub = h.alloc(string::size_needed(end - begin))?;
                string::init_with_len(&mut h, sub, end - begin);
                string::copy_range(&mut h, loc, begin, end, sub);
                vector::push(&mut h, fields, sub)?;
                // Release the construction reference; the vector owns it now.
                h.unshare(sub)?;
            }
            h.roots.register(fields)
        };
        Ok(Self::from_slot(&self.heap, slot))
    }
}

impl Clone for Handle {
    /// Share the referent: a cloned handle tracks the same object
    /// independently and bumps its count under RefCount.
    fn clone(&self) -> Self {
        let loc = self.loc();
        Handle::share(&self.heap, loc)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let mut h = self.heap.borrow_mut();
        let loc = h.roots.unregister(self.slot);
        // Release this handle's reference; on a zero count the object has
        // been cleaned up and its storage is reclaimed here.  Heap
        // corruption cannot be surfaced from a destructor, so a failed
        // size read leaves the storage in place.
        if let Ok(true) = h.rc_dec(loc) {
            if let Ok(size) = objects::size_of(&h, loc) {
                h.free(loc, size);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::collector::GcMode;
    use crate::gc::heap::Heap;
    use crate::gc::trace::TraceSink;

    fn shared(mode: GcMode) -> SharedHeap {
        Heap::new_shared(mode, TraceSink::new(Box::new(std::io::sink())))
    }

    fn ref_count(heap: &SharedHeap, loc: Loc) -> u8 {
        heap.borrow().header_at(loc).unwrap().ref_count
    }

    // ── Registry mechanics ────────────────────────────────────────────────

    #[test]
    fn test_root_set_reuses_freed_slots() {
        let mut roots = RootSet::new();
        let a = roots.register(10);
        roots.unregister(a);
        let b = roots.register(20);
        assert_eq!(a, b, "freed slot must be reused");
    }

    #[test]
    fn test_handles_appear_in_root_registry() {
        let heap = shared(GcMode::None);
        let a = Handle::num(&heap, 1).unwrap();
        let b = Handle::num(&heap, 2).unwrap();
        let locs = heap.borrow().roots.locs();
        assert_eq!(locs, vec![0, a.loc(), b.loc()], "nil plus both handles");
        drop(a);
        let locs = heap.borrow().roots.locs();
        assert_eq!(locs, vec![0, b.loc()]);
    }

    // ── RefCount lifecycle ────────────────────────────────────────────────

    #[test]
    fn test_drop_frees_storage_under_ref_count() {
        let heap = shared(GcMode::RefCount);
        let s = Handle::str(&heap, b"abc").unwrap();
        let loc = s.loc();
        assert_eq!(ref_count(&heap, loc), 1);
        drop(s);
        assert_eq!(heap.borrow().tag_at(loc).unwrap(), Tag::Free);
        assert_eq!(heap.borrow().word(loc + 1), 5, "free block covers the string");
    }

    #[test]
    fn test_clone_shares_and_keeps_alive() {
        let heap = shared(GcMode::RefCount);
        let a = Handle::num(&heap, 7).unwrap();
        let loc = a.loc();
        let b = a.clone();
        assert_eq!(ref_count(&heap, loc), 2);
        drop(a);
        assert_eq!(ref_count(&heap, loc), 1);
        assert_eq!(heap.borrow().tag_at(loc).unwrap(), Tag::Num);
        drop(b);
        assert_eq!(heap.borrow().tag_at(loc).unwrap(), Tag::Free);
    }

    #[test]
    fn test_storing_into_tuple_keeps_object_alive_past_handle() {
        let heap = shared(GcMode::RefCount);
        let t = Handle::tup(&heap, 1).unwrap();
        let n = Handle::num(&heap, 42).unwrap();
        let n_loc = n.loc();
        t.set(0, &n).unwrap();
        drop(n);
        assert_eq!(
            heap.borrow().tag_at(n_loc).unwrap(),
            Tag::Num,
            "tuple slot must keep the number alive"
        );
        drop(t);
        assert_eq!(
            heap.borrow().tag_at(n_loc).unwrap(),
            Tag::Free,
            "releasing the tuple must cascade into the slot"
        );
    }

    #[test]
    fn test_self_assignment_preserves_count_and_slot() {
        let heap = shared(GcMode::RefCount);
        let t = Handle::tup(&heap, 1).unwrap();
        let n = Handle::num(&heap, 9).unwrap();
        t.set(0, &n).unwrap();
        let before = ref_count(&heap, n.loc());

        let tmp = t.get(0).unwrap();
        t.set(0, &tmp).unwrap();
        drop(tmp);

        assert_eq!(ref_count(&heap, n.loc()), before, "self-assignment is count-neutral");
        assert!(t.get(0).unwrap().equals(&n).unwrap());
    }

    // ── Typed operations ──────────────────────────────────────────────────

    #[test]
    fn test_get_on_number_is_type_mismatch() {
        let heap = shared(GcMode::None);
        let n = Handle::num(&heap, 1).unwrap();
        assert!(matches!(
            n.get(0),
            Err(HeapvizError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_vector_push_and_get_round_trip() {
        let heap = shared(GcMode::None);
        let v = Handle::vec(&heap, 1).unwrap();
        let n = Handle::num(&heap, 42).unwrap();
        v.push(&n).unwrap();
        let got = v.get(v.length().unwrap() - 1).unwrap();
        assert!(got.equals(&n).unwrap(), "last pushed element reads back equal");
    }

    #[test]
    fn test_get_nested_reaches_through_rows() {
        let heap = shared(GcMode::None);
        let v = Handle::vec(&heap, 2).unwrap();
        let row = Handle::tup(&heap, 2).unwrap();
        let name = Handle::str(&heap, b"bob").unwrap();
        row.set(1, &name).unwrap();
        v.push(&row).unwrap();
        let got = v.get_nested(0, 1).unwrap();
        assert!(got.equals(&name).unwrap());
    }

    #[test]
    fn test_contains_matches_by_structure() {
        let heap = shared(GcMode::None);
        let v = Handle::vec(&heap, 2).unwrap();
        let row = Handle::tup(&heap, 2).unwrap();
        let name = Handle::str(&heap, b"bob").unwrap();
        row.set(0, &name).unwrap();
        v.push(&row).unwrap();

        let same_bytes = Handle::str(&heap, b"bob").unwrap();
        let other = Handle::str(&heap, b"eve").unwrap();
        assert!(v.contains(0, &same_bytes).unwrap());
        assert!(!v.contains(0, &other).unwrap());
    }

    #[test]
    fn test_split_produces_field_strings() {
        let heap = shared(GcMode::None);
        let line = Handle::str(&heap, b"10,alice,gold").unwrap();
        let fields = line.split(b',').unwrap();
        assert_eq!(fields.length().unwrap(), 3);
        assert_eq!(fields.get(0).unwrap().to_i().unwrap(), 10);
        let name = fields.get(1).unwrap();
        let expected = Handle::str(&heap, b"alice").unwrap();
        assert!(name.equals(&expected).unwrap());
    }

    #[test]
    fn test_split_under_ref_count_leaves_balanced_counts() {
        let heap = shared(GcMode::RefCount);
        let line = Handle::str(&heap, b"a,b").unwrap();
        let fields = line.split(b',').unwrap();
        let piece = fields.get(0).unwrap().loc();
        assert_eq!(ref_count(&heap, piece), 1, "only the backing tuple owns a piece");
        drop(fields);
        assert_eq!(
            heap.borrow().tag_at(piece).unwrap(),
            Tag::Free,
            "dropping the fields vector must release the pieces"
        );
    }

    #[test]
    fn test_empty_containers_allocate_cleanly() {
        let heap = shared(GcMode::None);
        let s = Handle::str(&heap, b"").unwrap();
        assert_eq!(s.size().unwrap(), 2);
        let t = Handle::tup(&heap, 0).unwrap();
        assert_eq!(t.length().unwrap(), 0);
        let v = Handle::vec(&heap, 0).unwrap();
        assert_eq!(v.length().unwrap(), 0);
        heap.borrow().verify_heap().unwrap();
    }

    #[test]
    fn test_tup_from_copy_carries_slots() {
        let heap = shared(GcMode::None);
        let t = Handle::tup(&heap, 1).unwrap();
        let n = Handle::num(&heap, 3).unwrap();
        t.set(0, &n).unwrap();
        let bigger = Handle::tup_from_copy(&heap, &t, 2).unwrap();
        assert_eq!(bigger.length().unwrap(), 2);
        assert!(bigger.get(0).unwrap().equals(&n).unwrap());
        assert_eq!(bigger.get(1).unwrap().loc(), 0, "grown slot starts at nil");
    }
}
