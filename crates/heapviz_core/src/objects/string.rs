//! The Str variant: a byte string stored one byte per word.
//!
//! Layout: `[header, len, byte0, byte1, …]` — `2 + len` words.

use smallvec::SmallVec;

use crate::gc::heap::{Heap, Loc};
use crate::objects::header::Tag;

/// A `(begin, end)` byte range produced by [`split_bounds`].
pub(crate) type FieldBounds = SmallVec<[(u16, u16); 5]>;

/// Words consumed by a Str of `len` bytes.
pub(crate) fn size_needed(len: u16) -> u16 {
    2 + len
}

/// Initialise a Str at `loc` from a byte slice.
pub(crate) fn init_from_bytes(heap: &mut Heap, loc: Loc, bytes: &[u8]) {
    init_with_len(heap, loc, bytes.len() as u16);
    for (i, &b) in bytes.iter().enumerate() {
        let at = loc + 2 + i as u16;
        heap.set_word(at, b as u16);
        heap.trace.set_char(at, b);
    }
}

/// Initialise a Str header and length, leaving the bytes zeroed.
///
/// Used for split substrings, which receive their bytes by a bulk copy.
pub(crate) fn init_with_len(heap: &mut Heap, loc: Loc, len: u16) {
    heap.init_obj(loc, Tag::Str);
    heap.set_word(loc + 1, len);
    heap.trace.set_int(loc + 1, len as i32);
}

/// Number of bytes.
pub(crate) fn len(heap: &Heap, loc: Loc) -> u16 {
    heap.word(loc + 1)
}

/// Read byte `i` without touching the read clock.
pub(crate) fn byte(heap: &Heap, loc: Loc, i: u16) -> u8 {
    heap.word(loc + 2 + i) as u8
}

/// Scan for `sep` and return the field boundaries.
///
/// A string with `k` separators yields `k + 1` ranges; an empty string
/// yields one empty range.  Every scanned byte is noted as a read.
pub(crate) fn split_bounds(heap: &mut Heap, loc: Loc, sep: u8) -> FieldBounds {
    let n = len(heap, loc);
    let mut bounds = FieldBounds::new();
    let mut last = 0u16;
    for i in 0..n {
        heap.trace.note_read(loc + 2 + i);
        if byte(heap, loc, i) == sep {
            bounds.push((last, i));
            last = i + 1;
        }
    }
    bounds.push((last, n));
    bounds
}

/// Copy bytes `begin..end` of the Str at `from` into the Str at `dest`
/// (starting at its first byte), emitting a single `copy` record.
pub(crate) fn copy_range(heap: &mut Heap, from: Loc, begin: u16, end: u16, dest: Loc) {
    let n = end - begin;
    for i in 0..n {
        let b = heap.word(from + 2 + begin + i);
        heap.set_word(dest + 2 + i, b);
    }
    heap.trace.copy(dest + 2, from + 2 + begin, n);
}

/// Parse the string as a signed decimal integer.
///
/// Leading `-` signs toggle the sign; digits accumulate until the first
/// non-digit.  Anything unparsable contributes nothing (an empty or
/// non-numeric string reads as 0).  Arithmetic wraps, which is exactly
/// what lets `-32768` round-trip through its decimal digits.
pub(crate) fn to_i(heap: &mut Heap, loc: Loc) -> i16 {
    let n = len(heap, loc);
    let mut value: i16 = 0;
    let mut sign: i16 = 1;
    let mut i = 0u16;
    while i < n {
        heap.trace.note_read(loc + 2 + i);
        if byte(heap, loc, i) == b'-' {
            sign = -sign;
            i += 1;
        } else {
            break;
        }
    }
    while i < n {
        heap.trace.note_read(loc + 2 + i);
        let b = byte(heap, loc, i);
        if b.is_ascii_digit() {
            value = value.wrapping_mul(10).wrapping_add((b - b'0') as i16);
            i += 1;
        } else {
            break;
        }
    }
    sign.wrapping_mul(value)
}

/// Byte-wise structural equality of two Str objects.
pub(crate) fn equals(heap: &Heap, a: Loc, b: Loc) -> bool {
    let n = len(heap, a);
    if n != len(heap, b) {
        return false;
    }
    (0..n).all(|i| byte(heap, a, i) == byte(heap, b, i))
}
