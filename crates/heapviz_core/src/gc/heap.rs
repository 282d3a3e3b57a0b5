//! The managed heap: a fixed array of words with a bump allocator.
//!
//! # Layout
//!
//! The heap is [`HEAP_SIZE`] words of [`Word`].  A [`Loc`] is an index into
//! this array and is the canonical form of a heap reference.  Location 0
//! permanently holds the Nil sentinel; the bump cursor `top` starts at 1.
//!
//! For the copying collector the heap is split into two semi-spaces at
//! [`SEMI_SPACE_SIZE`]; the active half is implied by the current `top`.
//!
//! # The `Heap` context
//!
//! [`Heap`] owns everything process-wide in this simulator: the word
//! array, the root registry, the collector scratch state (live set and
//! forwarding map) and the [trace sink][crate::gc::trace::TraceSink].
//! Handles share it behind `Rc<RefCell<…>>` (see [`SharedHeap`]); the
//! mutator is strictly single-threaded.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::error::{HeapvizError, HeapvizResult};
use crate::gc::collector::GcMode;
use crate::gc::roots::RootSet;
use crate::gc::trace::TraceSink;
use crate::objects;
use crate::objects::header::{ObjHeader, Tag};

/// A heap word.  16 bits is enough for every payload this simulator
/// stores: locations, signed numbers, byte characters, lengths.
pub type Word = u16;

/// A word index into the heap; the canonical heap reference.
pub type Loc = u16;

/// Total heap capacity in words.
pub const HEAP_SIZE: Loc = 2000;

/// Start of the upper semi-space used by the copying collector.
pub const SEMI_SPACE_SIZE: Loc = HEAP_SIZE / 2;

/// Shared ownership alias for the single-threaded heap context.
pub type SharedHeap = Rc<RefCell<Heap>>;

/// The process-wide heap context.
pub struct Heap {
    mode: GcMode,
    words: Box<[Word]>,
    pub(crate) top: Loc,
    pub(crate) roots: RootSet,
    /// Reachable locations, rebuilt by every mark phase.
    pub(crate) live: BTreeSet<Loc>,
    /// `from → to` relocation map recorded by the sliding compactor.
    pub(crate) forwarding: BTreeMap<Loc, Loc>,
    /// Event trace and per-word visualization metadata.
    pub trace: TraceSink,
}

impl Heap {
    /// Create a heap running under the given collector mode.
    ///
    /// Location 0 becomes the permanent Nil sentinel, pinned by a root
    /// slot that is never released.
    pub fn new(mode: GcMode, trace: TraceSink) -> Self {
        let mut heap = Self {
            mode,
            words: vec![0; HEAP_SIZE as usize].into_boxed_slice(),
            top: 1,
            roots: RootSet::new(),
            live: BTreeSet::new(),
            forwarding: BTreeMap::new(),
            trace,
        };
        // The zeroed word at 0 already decodes as a Nil header.
        heap.trace.alloc(0, 1);
        heap.roots.register(0);
        heap
    }

    /// Create a heap wrapped for sharing with [`Handle`][crate::gc::roots::Handle]s.
    pub fn new_shared(mode: GcMode, trace: TraceSink) -> SharedHeap {
        Rc::new(RefCell::new(Self::new(mode, trace)))
    }

    /// The collector mode this heap runs under.
    pub fn mode(&self) -> GcMode {
        self.mode
    }

    /// First unused location.
    pub fn top(&self) -> Loc {
        self.top
    }

    // ── Word access ───────────────────────────────────────────────────────

    pub(crate) fn word(&self, loc: Loc) -> Word {
        self.words[loc as usize]
    }

    pub(crate) fn set_word(&mut self, loc: Loc, value: Word) {
        self.words[loc as usize] = value;
    }

    /// Decode the object header at `loc`.
    pub(crate) fn header_at(&self, loc: Loc) -> HeapvizResult<ObjHeader> {
        ObjHeader::from_word(self.word(loc)).ok_or(HeapvizError::CorruptHeap {
            loc,
            reason: "unknown tag in header word",
        })
    }

    /// Decode just the tag at `loc`.
    pub fn tag_at(&self, loc: Loc) -> HeapvizResult<Tag> {
        Ok(self.header_at(loc)?.tag)
    }

    /// The locations the last mark phase found reachable, ascending.
    ///
    /// Empty until a marking collector has run; never contains 0.
    pub fn live_locs(&self) -> Vec<Loc> {
        self.live.iter().copied().collect()
    }

    fn set_header(&mut self, loc: Loc, header: ObjHeader) {
        self.set_word(loc, header.to_word());
    }

    // ── Allocation ────────────────────────────────────────────────────────

    /// Advance `top` by `n` words and return the old `top`.
    ///
    /// Emits an `alloc` record.  Zero-size reservations are illegal.
    pub(crate) fn reserve(&mut self, n: u16) -> HeapvizResult<Loc> {
        let loc = self.reserve_unlogged(n)?;
        self.trace.alloc(loc, n);
        Ok(loc)
    }

    /// [`reserve`][Self::reserve] without the `alloc` record.
    ///
    /// The sliding compactor uses this: its relocations are logged as
    /// `copy` records instead.
    pub(crate) fn reserve_unlogged(&mut self, n: u16) -> HeapvizResult<Loc> {
        assert!(n > 0, "zero-size reservation");
        if self.top as u32 + n as u32 >= HEAP_SIZE as u32 {
            return Err(HeapvizError::HeapExhausted {
                top: self.top,
                requested: n,
            });
        }
        let loc = self.top;
        self.top += n;
        Ok(loc)
    }

    /// Reserve and zero-fill `n` words.
    pub(crate) fn alloc(&mut self, n: u16) -> HeapvizResult<Loc> {
        let loc = self.reserve(n)?;
        for i in loc..loc + n {
            self.words[i as usize] = 0;
        }
        Ok(loc)
    }

    /// Copy the object at `from` into a fresh reservation.
    ///
    /// With `new_size == 0` the reservation matches the source size.
    /// Otherwise `new_size` words are reserved, up to `min(source_size,
    /// new_size)` words are copied and the remainder is zero-filled —
    /// this is how vector growth builds an enlarged backing tuple.
    pub(crate) fn copy_obj(&mut self, from: Loc, new_size: u16) -> HeapvizResult<Loc> {
        let size = objects::size_of(self, from)?;
        debug_assert!(
            self.tag_at(from)? != Tag::Free,
            "copying a free block is a caller bug"
        );
        if new_size > 0 {
            let to = self.reserve(new_size)?;
            let n = new_size.min(size);
            for i in 0..n {
                self.words[(to + i) as usize] = self.words[(from + i) as usize];
            }
            for i in n..new_size {
                self.words[(to + i) as usize] = 0;
            }
            self.trace.copy(to, from, n);
            Ok(to)
        } else {
            let to = self.reserve(size)?;
            for i in 0..size {
                self.words[(to + i) as usize] = self.words[(from + i) as usize];
            }
            self.trace.copy(to, from, size);
            Ok(to)
        }
    }

    /// Evacuate the object at `from`, leaving a forwarding address behind.
    ///
    /// Used by the copying collector: the copy lands at the bump cursor
    /// (in the new semi-space) and the old header is overwritten in place
    /// with a Forward pointing at it.
    pub(crate) fn move_obj(&mut self, from: Loc) -> HeapvizResult<Loc> {
        let size = objects::size_of(self, from)?;
        let to = self.reserve(size)?;
        for i in 0..size {
            self.words[(to + i) as usize] = self.words[(from + i) as usize];
        }
        self.init_obj(from, Tag::Forward);
        self.set_word(from + 1, to);
        self.trace.copy(to, from, size);
        Ok(to)
    }

    /// Relocate `size` words from `from` to the bump cursor, allowing the
    /// ranges to overlap.
    ///
    /// Used for in-place sliding compaction.  No forwarding header is
    /// installed; the compactor records the mapping externally.
    pub(crate) fn move_sliding(&mut self, from: Loc, size: u16) -> HeapvizResult<Loc> {
        let to = self.reserve_unlogged(size)?;
        self.words.copy_within(
            from as usize..(from + size) as usize,
            to as usize,
        );
        self.trace.copy(to, from, size);
        Ok(to)
    }

    /// Overwrite the object at `loc` with a Free block of `size` words.
    ///
    /// A zero-size free is a no-op.  `top` is never lowered; free blocks
    /// are dead weight until a compacting or copying collection.
    pub(crate) fn free(&mut self, loc: Loc, size: u16) {
        if size == 0 {
            return;
        }
        self.init_obj(loc, Tag::Free);
        self.set_word(loc + 1, size);
        self.trace.free(loc, size);
    }

    /// Redirect a location before handing it to the mutator.
    ///
    /// Identity under every shipped mode; a concurrent copying collector
    /// would redirect from-space reads here.
    pub(crate) fn read_barrier(&self, loc: Loc) -> Loc {
        loc
    }

    // ── Object headers and reference counts ───────────────────────────────

    /// Initialise the header at `loc` for a fresh object of `tag`.
    pub(crate) fn init_obj(&mut self, loc: Loc, tag: Tag) {
        self.trace.init_obj(loc, tag);
        self.set_header(loc, ObjHeader::new(tag));
        self.rc_init(loc);
    }

    fn rc_init(&mut self, loc: Loc) {
        if self.mode == GcMode::RefCount && loc != 0 {
            let mut hdr = self
                .header_at(loc)
                .expect("header was just written by init_obj");
            hdr.ref_count = 1;
            self.set_header(loc, hdr);
            self.trace.ref_count(loc, 1);
        }
    }

    /// Increment the reference count at `loc` (RefCount mode only).
    ///
    /// The Nil sentinel is exempt from counting: it is pinned by a
    /// permanent root and can never die.
    pub(crate) fn rc_inc(&mut self, loc: Loc) {
        if self.mode != GcMode::RefCount || loc == 0 {
            return;
        }
        let mut hdr = self
            .header_at(loc)
            .expect("ref-counted object must have a valid header");
        assert!(hdr.ref_count < u8::MAX, "reference count overflow at {loc}");
        hdr.ref_count += 1;
        self.set_header(loc, hdr);
        self.trace.ref_count(loc, hdr.ref_count as u16);
    }

    /// Decrement the reference count at `loc`.
    ///
    /// Returns `true` when the count reached zero, in which case the
    /// object has already been [cleaned up][objects::cleanup] (its owned
    /// slots recursively unshared) and the caller must free its storage.
    pub(crate) fn rc_dec(&mut self, loc: Loc) -> HeapvizResult<bool> {
        if self.mode != GcMode::RefCount || loc == 0 {
            return Ok(false);
        }
        let mut hdr = self.header_at(loc)?;
        assert!(hdr.ref_count > 0, "reference count underflow at {loc}");
        hdr.ref_count -= 1;
        self.set_header(loc, hdr);
        self.trace.ref_count(loc, hdr.ref_count as u16);
        if hdr.ref_count == 0 {
            objects::cleanup(self, loc)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Release one reference to the object a heap slot used to hold.
    ///
    /// Frees the object when its count reaches zero.  Location 0 is
    /// always a no-op.
    pub(crate) fn unshare(&mut self, loc: Loc) -> HeapvizResult<()> {
        if loc == 0 {
            return Ok(());
        }
        if self.rc_dec(loc)? {
            let size = objects::size_of(self, loc)?;
            self.free(loc, size);
        }
        Ok(())
    }

    // ── Root reporting ────────────────────────────────────────────────────

    /// Emit a breakpoint triple: a `bp` marker, the current `roots`, and
    /// the reachable `live` closure.
    ///
    /// The live closure reported here includes location 0 whenever a root
    /// or slot holds Nil; it is the renderer's view, not the collector's
    /// mark set (which never contains 0).
    pub fn log_roots(&mut self, msg: &str) -> HeapvizResult<()> {
        self.trace.bp(msg);
        let root_locs = self.roots.locs();
        self.trace.roots(&root_locs);

        self.live.clear();
        let mut work: Vec<Loc> = Vec::new();
        for &loc in &root_locs {
            if self.live.insert(loc) {
                work.push(loc);
            }
        }
        while let Some(loc) = work.pop() {
            for child in objects::children_of(self, loc)? {
                if self.live.insert(child) {
                    work.push(child);
                }
            }
        }
        let live: Vec<Loc> = self.live.iter().copied().collect();
        self.trace.live(&live);
        Ok(())
    }

    // ── Consistency checking ──────────────────────────────────────────────

    /// Walk the active space and verify the heap parses as a contiguous
    /// sequence of objects ending exactly at `top`.
    ///
    /// Checks the partition invariant: every word below `top` belongs to
    /// exactly one object or Free block, and every header decodes to a
    /// known variant of nonzero size.
    pub fn verify_heap(&self) -> HeapvizResult<()> {
        let mut loc = self.active_space_base();
        while loc < self.top {
            let size = objects::size_of(self, loc)?;
            if size == 0 {
                return Err(HeapvizError::CorruptHeap {
                    loc,
                    reason: "zero-size object in heap walk",
                });
            }
            loc += size;
        }
        if loc != self.top {
            return Err(HeapvizError::CorruptHeap {
                loc,
                reason: "object walk overran top",
            });
        }
        Ok(())
    }

    /// First location of the currently active space: 1, except under the
    /// copying collector when `top` is in the upper semi-space.
    pub(crate) fn active_space_base(&self) -> Loc {
        if self.mode == GcMode::Copying && self.top >= SEMI_SPACE_SIZE {
            SEMI_SPACE_SIZE
        } else {
            1
        }
    }
}
