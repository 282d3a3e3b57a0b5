//! The pluggable garbage collectors.
//!
//! # Policies
//!
//! Five interchangeable policies share the same root enumeration and
//! object traversal machinery:
//!
//! - **None** — `collect` is a no-op; exhaustion is fatal.
//! - **RefCount** — no global collection; counts are maintained eagerly
//!   at every share/unshare and storage is released the moment a count
//!   reaches zero.  Cycles leak.
//! - **MarkSweep** — mark the live closure, then walk the heap and turn
//!   every dead object into a Free block.  `top` never moves;
//!   fragmentation accumulates by design.
//! - **MarkCompact** — mark, then slide live objects toward the bottom,
//!   recording `from → to` in an external forwarding map, then rewrite
//!   every root slot and stored reference through the map.
//! - **Copying** — mark to enumerate the live set, flip `top` into the
//!   inactive semi-space, evacuate each live object (leaving a Forward
//!   in its old header), then rewrite references by chasing Forwards.
//!
//! # Ordering
//!
//! Within a phase objects are visited in ascending location order (the
//! live set is an ordered set), which keeps the trace reproducible and
//! makes the slide trivially safe: every move's destination is at or
//! below its source.
//!
//! # Failure
//!
//! Any error inside a collection — exhaustion while evacuating, a header
//! that fails to decode — is fatal for the run; the heap is left in an
//! undefined state and the error propagates out of [`Heap::collect`].

use crate::error::HeapvizResult;
use crate::gc::heap::{Heap, Loc, SEMI_SPACE_SIZE};
use crate::objects;
use crate::objects::header::Tag;

/// Collector policy, fixed for the lifetime of a [`Heap`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GcMode {
    /// Never collect; never free.
    None,
    /// Eager reference counting; no global collection.
    RefCount,
    /// Mark live objects, overwrite the dead with Free blocks.
    MarkSweep,
    /// Mark, slide live objects downward, fix references via a map.
    MarkCompact,
    /// Evacuate live objects into the other semi-space.
    Copying,
}

impl Heap {
    /// Run one collection under the configured policy.
    ///
    /// A safe point: callers must not hold any raw location derived
    /// before this call without re-reading it through a handle after.
    pub fn collect(&mut self) -> HeapvizResult<()> {
        match self.mode() {
            GcMode::None | GcMode::RefCount => Ok(()),
            GcMode::MarkSweep => {
                self.mark_live()?;
                self.sweep()
            }
            GcMode::MarkCompact => {
                let old_top = self.top;
                self.compact_live()?;
                if old_top > self.top {
                    self.fixup_references()?;
                    self.trace.free(self.top, old_top - self.top);
                }
                Ok(())
            }
            GcMode::Copying => {
                self.evacuate_live()?;
                self.fixup_references()?;
                // The vacated semi-space is reclaimed wholesale.
                if self.top >= SEMI_SPACE_SIZE {
                    self.trace.free(1, SEMI_SPACE_SIZE - 1);
                } else {
                    self.trace.free(SEMI_SPACE_SIZE, SEMI_SPACE_SIZE);
                }
                Ok(())
            }
        }
    }

    // ── Mark ──────────────────────────────────────────────────────────────

    /// Rebuild the live set: the transitive closure of the root registry
    /// under object traversal.
    ///
    /// Uses an explicit grey stack; shared structure is visited once.
    /// The Nil sentinel is never marked.  Under the non-copying modes
    /// each marked location also emits a `ref_count(loc, 1)` record so
    /// the animation can show the mark wave.
    fn mark_live(&mut self) -> HeapvizResult<()> {
        self.live.clear();
        let mut seen = std::collections::BTreeSet::new();
        let mut work: Vec<Loc> = self.roots.locs();
        while let Some(loc) = work.pop() {
            if !seen.insert(loc) {
                continue;
            }
            self.mark_live_loc(loc);
            for child in objects::children_of(self, loc)? {
                work.push(child);
            }
        }
        Ok(())
    }

    fn mark_live_loc(&mut self, loc: Loc) {
        if loc == 0 {
            return;
        }
        if self.mode() != GcMode::Copying {
            self.trace.ref_count(loc, 1);
        }
        self.live.insert(loc);
    }

    // ── Sweep ─────────────────────────────────────────────────────────────

    /// Walk the heap from location 1 to `top`, overwriting every object
    /// not in the live set with a Free block of the same size.
    fn sweep(&mut self) -> HeapvizResult<()> {
        let mut loc: Loc = 1;
        while loc < self.top {
            let size = objects::size_of(self, loc)?;
            if !self.live.contains(&loc) {
                self.free(loc, size);
            }
            loc += size;
        }
        Ok(())
    }

    // ── Compact ───────────────────────────────────────────────────────────

    /// Mark, then slide live objects downward over the dead.
    ///
    /// Objects before the first dead one stay in place.  At the first
    /// dead object `top` is truncated to that point; from then on every
    /// live object is relocated to the bump cursor (overlap allowed) and
    /// its mapping recorded for the fixup pass.
    fn compact_live(&mut self) -> HeapvizResult<()> {
        self.forwarding.clear();
        self.mark_live()?;
        let old_top = self.top;
        let mut from: Loc = 1;
        while from < old_top {
            let size = objects::size_of(self, from)?;
            if self.live.contains(&from) {
                if old_top != self.top {
                    let to = self.move_sliding(from, size)?;
                    self.forwarding.insert(from, to);
                }
            } else if old_top == self.top {
                self.top = from;
            }
            from += size;
        }
        Ok(())
    }

    // ── Evacuate ──────────────────────────────────────────────────────────

    /// Mark, flip into the inactive semi-space, and move every live
    /// object there in ascending from-space order.
    fn evacuate_live(&mut self) -> HeapvizResult<()> {
        self.mark_live()?;
        self.top = if self.top >= SEMI_SPACE_SIZE {
            1
        } else {
            SEMI_SPACE_SIZE
        };
        let live: Vec<Loc> = self.live.iter().copied().collect();
        for from in live {
            self.move_obj(from)?;
        }
        Ok(())
    }

    // ── Fixup ─────────────────────────────────────────────────────────────

    /// Where the object that lived at `loc` lives now.
    ///
    /// Under Copying the answer is read from the Forward left in the
    /// from-space header; otherwise from the compactor's external map.
    /// Identity for locations that did not move.
    fn loc_after_move(&self, loc: Loc) -> HeapvizResult<Loc> {
        if self.mode() == GcMode::Copying {
            if self.tag_at(loc)? == Tag::Forward {
                Ok(self.word(loc + 1))
            } else {
                Ok(loc)
            }
        } else {
            Ok(self.forwarding.get(&loc).copied().unwrap_or(loc))
        }
    }

    /// Rewrite every root slot and every stored reference in the active
    /// space through [`loc_after_move`][Self::loc_after_move].
    fn fixup_references(&mut self) -> HeapvizResult<()> {
        for slot in self.roots.live_slots() {
            let loc = self.roots.get(slot);
            let moved = self.loc_after_move(loc)?;
            self.roots.set(slot, moved);
        }
        let mut loc = self.active_space_base();
        while loc < self.top {
            let size = objects::size_of(self, loc)?;
            for slot in objects::ref_slots(self, loc)? {
                let old = self.word(slot);
                let moved = self.loc_after_move(old)?;
                self.set_word(slot, moved);
            }
            loc += size;
        }
        Ok(())
    }
}
