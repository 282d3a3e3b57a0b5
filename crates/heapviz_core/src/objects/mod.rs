//! The tagged object model.
//!
//! Objects are a tagged sum over raw heap words, not a class hierarchy:
//! each variant module defines its layout and operations pointwise, and
//! this module provides the tag-switch dispatch for the polymorphic
//! operations the collectors and handles need — size, child traversal,
//! reference fixup, refcount cleanup, structural equality, numeric
//! coercion and rendering.

/// Packed object header word and variant tag.
pub mod header;
/// Boxed signed 16-bit numbers.
pub(crate) mod number;
/// Byte strings, one byte per word.
pub(crate) mod string;
/// Fixed-length tuples of location slots.
pub(crate) mod tuple;
/// Growable vectors backed by a tuple.
pub(crate) mod vector;

use crate::error::{HeapvizError, HeapvizResult};
use crate::gc::heap::{Heap, Loc};
use crate::objects::header::Tag;

/// Words consumed by the object at `loc`.
///
/// A forwarding address has no size of its own: seeing one outside of a
/// copying collection's fixup phase means the heap is corrupt.
pub(crate) fn size_of(heap: &Heap, loc: Loc) -> HeapvizResult<u16> {
    match heap.tag_at(loc)? {
        Tag::Nil => Ok(1),
        Tag::Num => Ok(number::SIZE),
        Tag::Tup => Ok(tuple::size_needed(tuple::len(heap, loc))),
        Tag::Vec => Ok(vector::SIZE),
        Tag::Str => Ok(string::size_needed(string::len(heap, loc))),
        Tag::Free => Ok(heap.word(loc + 1)),
        Tag::Forward => Err(HeapvizError::CorruptHeap {
            loc,
            reason: "forwarding address outside a copying collection",
        }),
    }
}

/// The direct outgoing references of the object at `loc`.
///
/// Tup yields every slot, Vec yields its backing tuple; every other
/// variant is a leaf.  Slot reads are noted for the visualizer.
pub(crate) fn children_of(heap: &mut Heap, loc: Loc) -> HeapvizResult<Vec<Loc>> {
    match heap.tag_at(loc)? {
        Tag::Tup => {
            let n = tuple::len(heap, loc);
            let mut children = Vec::with_capacity(n as usize);
            for i in 0..n {
                heap.trace.note_read(loc + 2 + i);
                children.push(heap.word(loc + 2 + i));
            }
            Ok(children)
        }
        Tag::Vec => {
            heap.trace.note_read(loc + 2);
            Ok(vec![heap.word(loc + 2)])
        }
        _ => Ok(Vec::new()),
    }
}

/// Absolute word addresses of the reference slots inside the object at
/// `loc`, for the post-move fixup pass.
pub(crate) fn ref_slots(heap: &Heap, loc: Loc) -> HeapvizResult<Vec<Loc>> {
    match heap.tag_at(loc)? {
        Tag::Tup => {
            let n = tuple::len(heap, loc);
            Ok((0..n).map(|i| loc + 2 + i).collect())
        }
        Tag::Vec => Ok(vec![loc + 2]),
        _ => Ok(Vec::new()),
    }
}

/// Release everything the dying object at `loc` owns.
///
/// Called when a reference count reaches zero: every outgoing reference
/// is unshared (which may cascade into further frees) and the slot is
/// zeroed so a later sweep cannot double-release it.
pub(crate) fn cleanup(heap: &mut Heap, loc: Loc) -> HeapvizResult<()> {
    match heap.tag_at(loc)? {
        Tag::Tup => {
            let n = tuple::len(heap, loc);
            for i in 0..n {
                let child = heap.word(loc + 2 + i);
                heap.unshare(child)?;
                heap.set_word(loc + 2 + i, 0);
            }
            Ok(())
        }
        Tag::Vec => {
            let tup = heap.word(loc + 2);
            heap.unshare(tup)?;
            heap.set_word(loc + 2, 0);
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Coerce the object at `loc` to an integer.
///
/// Num reads as itself, Str parses as signed decimal, everything else
/// is 0.
pub(crate) fn to_i(heap: &mut Heap, loc: Loc) -> HeapvizResult<i16> {
    match heap.tag_at(loc)? {
        Tag::Num => {
            heap.trace.note_read(loc + 1);
            Ok(number::value(heap, loc))
        }
        Tag::Str => Ok(string::to_i(heap, loc)),
        _ => Ok(0),
    }
}

/// Structural equality: Num by value, Str byte-wise; any other pairing
/// is unequal.
pub(crate) fn equals(heap: &Heap, a: Loc, b: Loc) -> HeapvizResult<bool> {
    match (heap.tag_at(a)?, heap.tag_at(b)?) {
        (Tag::Num, Tag::Num) => Ok(number::value(heap, a) == number::value(heap, b)),
        (Tag::Str, Tag::Str) => Ok(string::equals(heap, a, b)),
        _ => Ok(false),
    }
}

/// Element `j` of element `i` of the vector at `loc`.
///
/// The inner element must itself be a Tup or a Vec.
pub(crate) fn get_nested(heap: &mut Heap, loc: Loc, i: u16, j: u16) -> HeapvizResult<Loc> {
    let inner = vector::get(heap, loc, i)?;
    match heap.tag_at(inner)? {
        Tag::Tup => Ok(tuple::get(heap, inner, j)),
        Tag::Vec => vector::get(heap, inner, j),
        found => Err(HeapvizError::TypeMismatch {
            expected: "a tuple or vector element",
            found,
            loc: inner,
        }),
    }
}

/// Render the object at `loc` the way the trace comments show it.
pub(crate) fn dump_string(heap: &Heap, loc: Loc) -> HeapvizResult<String> {
    match heap.tag_at(loc)? {
        Tag::Nil => Ok("nil".to_string()),
        Tag::Num => Ok(number::value(heap, loc).to_string()),
        Tag::Str => {
            let mut out = String::from("\"");
            for i in 0..string::len(heap, loc) {
                out.push(string::byte(heap, loc, i) as char);
            }
            out.push('"');
            Ok(out)
        }
        Tag::Tup => dump_tuple_prefix(heap, loc, tuple::len(heap, loc)),
        Tag::Vec => dump_tuple_prefix(heap, vector::backing(heap, loc), vector::len(heap, loc)),
        tag => Ok(format!("<obj? tag={tag:?}>")),
    }
}

/// Render the first `n` slots of the tuple at `loc` as `[a,b,…]`.
fn dump_tuple_prefix(heap: &Heap, loc: Loc, n: u16) -> HeapvizResult<String> {
    let mut out = String::from("[");
    for i in 0..n {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&dump_string(heap, heap.word(loc + 2 + i))?);
    }
    out.push(']');
    Ok(out)
}
