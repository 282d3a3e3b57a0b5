//! The trace sink: serializes heap events for the animation renderer.
//!
//! # Record stream
//!
//! The sink emits a JavaScript array literal, one record per line:
//!
//! ```text
//! var frame_content = [
//! ['alloc',1,5],
//! ['init',1,':s '],
//! ['set',2,'=3'],
//! ['set',3,"'a"],
//! ...
//! ['stop']];
//! ```
//!
//! Record kinds are `alloc`, `free`, `init`, `set`, `copy`, `ref_count`,
//! `roots`, `live`, `bp` and the final `stop`.  A `set` record encodes its
//! value three ways: `"'a"` for a byte write, `'=42'` for an integer write,
//! and a bare location for a reference write.
//!
//! # Gating
//!
//! Most records are gated by the ready flag so the startup phase can be
//! excluded: [`start`][TraceSink::start] opens the gate, [`stop`][TraceSink::stop]
//! closes it.  Breakpoint (`bp`/`roots`/`live`) records and `//` comment
//! lines bypass the gate; they only ever occur between start and stop.
//!
//! # Word metadata
//!
//! Alongside the stream the sink maintains per-word allocation/overhead
//! flags and last-read/last-write timestamps driven by a global event
//! clock.  This metadata is updated even while the gate is closed; it feeds
//! the optional XPM frame dumps (see [`snapshot`][crate::gc::snapshot]).

use std::io::Write;
use std::path::PathBuf;

use bitflags::bitflags;

use crate::error::{HeapvizError, HeapvizResult};
use crate::gc::heap::{Loc, HEAP_SIZE};
use crate::gc::snapshot::Snapshotter;
use crate::objects::header::Tag;

bitflags! {
    /// Per-word state bits used by the visualizer.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct WordFlags: u8 {
        /// The word is inside an allocated object.
        const ALLOCATED = 1 << 0;
        /// The most recent write was metadata bookkeeping (header init,
        /// ref-count update) rather than payload.
        const OVERHEAD = 1 << 1;
    }
}

/// Visualization metadata for a single heap word.
#[derive(Copy, Clone, Debug, Default)]
pub struct WordInfo {
    pub(crate) flags: WordFlags,
    pub(crate) last_read: u32,
    pub(crate) last_write: u32,
}

impl WordInfo {
    fn was_allocated(&mut self) {
        self.flags = WordFlags::ALLOCATED;
        self.last_read = 0;
        self.last_write = 0;
    }

    fn was_freed(&mut self) {
        self.flags.remove(WordFlags::ALLOCATED);
    }

    fn was_read(&mut self, now: u32) {
        self.last_read = now;
    }

    fn was_written(&mut self, now: u32) {
        self.last_write = now;
        self.flags.remove(WordFlags::OVERHEAD);
    }

    fn was_overhead(&mut self, now: u32) {
        self.last_write = now;
        self.flags.insert(WordFlags::OVERHEAD);
    }

    /// The word is inside an allocated object.
    pub fn is_allocated(&self) -> bool {
        self.flags.contains(WordFlags::ALLOCATED)
    }

    /// The most recent write was metadata, not payload.
    pub fn is_overhead(&self) -> bool {
        self.flags.contains(WordFlags::OVERHEAD)
    }
}

/// Serializes typed heap events to an output stream and keeps the per-word
/// metadata behind the optional raster snapshots.
///
/// Write failures are not surfaced at every mutation site; the first error
/// is stashed and reported by [`finish`][TraceSink::finish].
pub struct TraceSink {
    out: Box<dyn Write>,
    ready: bool,
    time: u32,
    info: Vec<WordInfo>,
    snapshots: Option<Snapshotter>,
    io_error: Option<std::io::Error>,
}

impl TraceSink {
    /// Create a sink writing records to `out`.
    pub fn new(out: Box<dyn Write>) -> Self {
        Self {
            out,
            ready: false,
            time: 0,
            info: vec![WordInfo::default(); HEAP_SIZE as usize],
            snapshots: None,
            io_error: None,
        }
    }

    /// Enable per-event XPM frame dumps into `dir`.
    pub fn enable_snapshots(&mut self, dir: PathBuf) {
        self.snapshots = Some(Snapshotter::new(dir));
    }

    /// Emit the opening of the record stream.
    pub fn open_frame(&mut self) {
        self.write_raw("var frame_content = [\n");
    }

    /// Open the record gate.
    pub fn start(&mut self) {
        self.ready = true;
    }

    /// Close the record gate.
    pub fn stop(&mut self) {
        self.ready = false;
    }

    /// Emit the terminating `stop` record, flush, and surface any stashed
    /// write error as [`HeapvizError::TraceIo`].
    pub fn finish(&mut self) -> HeapvizResult<()> {
        self.write_raw("['stop']];\n");
        if let Err(err) = self.out.flush() {
            self.io_error.get_or_insert(err);
        }
        match self.io_error.take() {
            Some(err) => Err(HeapvizError::TraceIo(err)),
            None => Ok(()),
        }
    }

    // ── Event records ─────────────────────────────────────────────────────

    /// `n` words were reserved at `loc`.
    pub fn alloc(&mut self, loc: Loc, n: u16) {
        for i in loc..loc + n {
            self.info[i as usize].was_allocated();
        }
        self.record(format!("['alloc',{loc},{n}],\n"));
    }

    /// `n` words starting at `loc` were reclaimed.
    pub fn free(&mut self, loc: Loc, n: u16) {
        for i in loc..loc + n {
            self.info[i as usize].was_freed();
        }
        self.record(format!("['free',{loc},{n}],\n"));
    }

    /// The object at `loc` was (re)initialised with the given variant.
    pub fn init_obj(&mut self, loc: Loc, tag: Tag) {
        // No metadata update and no snapshot; the header write that follows
        // is logged as overhead by the ref-count record.
        if self.ready {
            let name = tag.trace_name();
            self.write_raw(&format!("['init',{loc},'{name}'],\n"));
        }
    }

    /// The reference count at `loc` changed to `n`.
    pub fn ref_count(&mut self, loc: Loc, n: u16) {
        self.time += 1;
        let now = self.time;
        self.info[loc as usize].was_overhead(now);
        self.record(format!("['ref_count',{loc},{n}],\n"));
    }

    /// A byte payload was written at `loc`.
    pub fn set_char(&mut self, loc: Loc, byte: u8) {
        self.note_write(loc);
        let ch = byte as char;
        self.record(format!("['set',{loc},\"'{ch}\"],\n"));
    }

    /// An integer payload was written at `loc`.
    pub fn set_int(&mut self, loc: Loc, value: i32) {
        self.note_write(loc);
        self.record(format!("['set',{loc},'={value}'],\n"));
    }

    /// A location reference was written at `loc`.
    pub fn set_ref(&mut self, loc: Loc, target: Loc) {
        self.note_write(loc);
        self.record(format!("['set',{loc},{target}],\n"));
    }

    /// `n` words were copied from `from` to `to`.
    pub fn copy(&mut self, to: Loc, from: Loc, n: u16) {
        for i in 0..n {
            self.time += 1;
            self.info[(from + i) as usize].was_read(self.time);
            self.time += 1;
            self.info[(to + i) as usize].was_written(self.time);
        }
        self.record(format!("['copy',{to},{from},{n}],\n"));
    }

    /// The word at `loc` was read by the mutator.
    ///
    /// Reads produce no record, only a metadata update (and a snapshot
    /// frame while the gate is open).
    pub fn note_read(&mut self, loc: Loc) {
        self.time += 1;
        self.info[loc as usize].was_read(self.time);
        if self.ready {
            self.maybe_snap();
        }
    }

    /// A breakpoint marker with a free-form message.
    pub fn bp(&mut self, msg: &str) {
        self.write_raw(&format!("['bp','{msg}'],\n"));
    }

    /// The current root locations, in registry order.
    pub fn roots(&mut self, locs: &[Loc]) {
        let mut rec = String::from("['roots'");
        for loc in locs {
            rec.push_str(&format!(",{loc}"));
        }
        rec.push_str("],\n");
        self.write_raw(&rec);
    }

    /// The current live closure, in ascending location order.
    pub fn live(&mut self, locs: &[Loc]) {
        let mut rec = String::from("['live'");
        for loc in locs {
            rec.push_str(&format!(",{loc}"));
        }
        rec.push_str("],\n");
        self.write_raw(&rec);
    }

    /// A `//` comment line interleaved with the records.
    pub fn comment(&mut self, text: &str) {
        self.write_raw(&format!("// {text}\n"));
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn note_write(&mut self, loc: Loc) {
        self.time += 1;
        self.info[loc as usize].was_written(self.time);
    }

    fn record(&mut self, rec: String) {
        if self.ready {
            self.write_raw(&rec);
            self.maybe_snap();
        }
    }

    fn write_raw(&mut self, s: &str) {
        if self.io_error.is_some() {
            return;
        }
        if let Err(err) = self.out.write_all(s.as_bytes()) {
            self.io_error = Some(err);
        }
    }

    fn maybe_snap(&mut self) {
        if let Some(snap) = &mut self.snapshots {
            if let Err(err) = snap.snap(&self.info, self.time) {
                self.io_error.get_or_insert(err);
            }
        }
    }
}
