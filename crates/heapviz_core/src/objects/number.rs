//! The Num variant: a boxed signed 16-bit value.
//!
//! Layout: `[header, value]` — two words.

use crate::gc::heap::{Heap, Loc};
use crate::objects::header::Tag;

/// Words consumed by a Num object.
pub(crate) const SIZE: u16 = 2;

/// Initialise a freshly allocated Num at `loc`.
pub(crate) fn init(heap: &mut Heap, loc: Loc, value: i16) {
    heap.init_obj(loc, Tag::Num);
    set(heap, loc, value);
}

/// Overwrite the stored value.
pub(crate) fn set(heap: &mut Heap, loc: Loc, value: i16) {
    heap.set_word(loc + 1, value as u16);
    heap.trace.set_int(loc + 1, value as i32);
}

/// Read the stored value without touching the read clock.
///
/// Structural equality uses this; mutator reads go through
/// [`to_i`][crate::objects::to_i], which notes the read.
pub(crate) fn value(heap: &Heap, loc: Loc) -> i16 {
    heap.word(loc + 1) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::collector::GcMode;
    use crate::gc::trace::TraceSink;

    fn heap() -> Heap {
        Heap::new(GcMode::None, TraceSink::new(Box::new(std::io::sink())))
    }

    #[test]
    fn test_init_and_read_back() {
        let mut h = heap();
        let loc = h.alloc(SIZE).unwrap();
        init(&mut h, loc, -1234);
        assert_eq!(h.tag_at(loc).unwrap(), Tag::Num);
        assert_eq!(value(&h, loc), -1234);
    }

    #[test]
    fn test_set_overwrites() {
        let mut h = heap();
        let loc = h.alloc(SIZE).unwrap();
        init(&mut h, loc, 1);
        set(&mut h, loc, i16::MIN);
        assert_eq!(value(&h, loc), i16::MIN);
    }
}
