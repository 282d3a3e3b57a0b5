//! The sample workload: crunch a points ledger through the managed heap.
//!
//! Each input line is `amount,person,thing`.  The driver parses every
//! line into heap objects, groups the records by person, reduces each
//! person's history to a score, and ranks the scores — the same shape as
//! this Ruby sketch:
//!
//! ```text
//! log = File.foreach(path).map { |l| a, p, t = l.strip.split(","); [a.to_i, p, t] }
//! standings = log.group_by { |r| r[1] }
//!                .map { |p, h| [p, h.reduce(0) { |s, r| s + r[0] }] }
//!                .sort { |a, b| b[1] <=> a[1] }
//! ```
//!
//! Everything goes through [`Handle`]s so the heap sees realistic
//! allocation, sharing and garbage; `collect` runs every five lines and
//! at each phase boundary.  Milestone breakpoints (`bp`/`roots`/`live`
//! triples) are emitted for the animation to pause on.
//!
//! The workload is acyclic: records point at strings and numbers, groups
//! point at records.  That keeps the RefCount mode leak-free here even
//! though it cannot reclaim cycles in general.

use std::io::BufRead;

use crate::error::HeapvizResult;
use crate::gc::heap::SharedHeap;
use crate::gc::roots::Handle;

/// Scores outside this band are dropped by the ranking pass.
///
/// The rank loop is intentionally the world's most terrible sort: it
/// counts down one score at a time and scans the whole standings vector
/// for each.  Teaching samples stay well inside the band.
const RANK_LIMIT: i16 = 20;

/// Run the full workload over `input`, emitting the trace frame from
/// start to `stop`.
pub fn run<R: BufRead>(heap: &SharedHeap, input: R) -> HeapvizResult<()> {
    {
        let mut h = heap.borrow_mut();
        h.trace.open_frame();
        h.trace.start();
    }

    // ── Parse: one Tup(amount, person, thing) per line ────────────────────
    let entries = Handle::vec(heap, 1)?;
    let mut bp = 0u32;
    for line in input.lines() {
        let data = line?;
        heap.borrow_mut().trace.comment(&format!("line: {data}"));
        let line_h = Handle::str(heap, data.as_bytes())?;
        let fields = line_h.split(b',')?;
        let record = Handle::tup(heap, 3)?;
        let amount = Handle::num(heap, fields.get(0)?.to_i()?)?;
        record.set(0, &amount)?;
        record.set(1, &fields.get(1)?)?;
        record.set(2, &fields.get(2)?)?;
        entries.push(&record)?;
        bp += 1;
        if bp == 2 {
            heap.borrow_mut().log_roots("line parsed")?;
        }
        if bp % 5 == 0 {
            heap.borrow_mut().collect()?;
        }
    }
    log::debug!("parsed {bp} lines");
    heap.borrow_mut().log_roots("file parsed")?;
    let rendered = entries.dump()?;
    heap.borrow_mut().trace.comment(&rendered);

    // ── Group: Tup(person, history) per distinct person ───────────────────
    let count = entries.length()?;
    let groups = Handle::vec(heap, 1)?;
    let mut bp = 0u32;
    for i in 0..count {
        let key = entries.get_nested(i, 1)?;
        if !groups.contains(0, &key)? {
            let person = Handle::tup(heap, 2)?;
            person.set(0, &key)?;
            let history = Handle::vec(heap, 1)?;
            person.set(1, &history)?;
            groups.push(&person)?;
            for j in i..count {
                if entries.get_nested(j, 1)?.equals(&person.get(0)?)? {
                    history.push(&entries.get(j)?)?;
                }
            }
            bp += 1;
            if bp == 2 {
                heap.borrow_mut().log_roots("group found")?;
            }
        }
    }
    drop(entries);
    heap.borrow_mut().collect()?;
    log::debug!("grouped into {} persons", groups.length()?);
    heap.borrow_mut().log_roots("data grouped")?;
    let rendered = groups.dump()?;
    heap.borrow_mut().trace.comment(&rendered);

    // ── Reduce: sum each history into Tup(person, total) ──────────────────
    let group_count = groups.length()?;
    let standings = Handle::vec(heap, 1)?;
    let mut bp = 0u32;
    for i in 0..group_count {
        let person = Handle::tup(heap, 2)?;
        person.set(0, &groups.get_nested(i, 0)?)?;
        let history = groups.get_nested(i, 1)?;
        let mut sum: i16 = 0;
        let total = Handle::num(heap, sum)?;
        for j in 0..history.length()? {
            // One scratch Num per step, so the animation shows the churn.
            let step = Handle::num(heap, sum.wrapping_add(history.get_nested(j, 0)?.to_i()?))?;
            sum = step.to_i()?;
        }
        total.set_num(sum)?;
        person.set(1, &total)?;
        standings.push(&person)?;
        bp += 1;
        if bp == 2 {
            heap.borrow_mut().log_roots("transaction history reduced")?;
        }
    }
    drop(groups);
    heap.borrow_mut().collect()?;

    // ── Rank: descending counting scan over the score band ────────────────
    let standing_count = standings.length()?;
    let ranking = Handle::vec(heap, standing_count)?;
    for rank in (-RANK_LIMIT..=RANK_LIMIT).rev() {
        for i in 0..standing_count {
            if standings.get_nested(i, 1)?.to_i()? == rank {
                ranking.push(&standings.get(i)?)?;
            }
        }
    }
    drop(standings);
    heap.borrow_mut().collect()?;
    heap.borrow_mut().log_roots("ranking finished")?;
    let rendered = ranking.dump()?;
    heap.borrow_mut().trace.comment(&rendered);
    log::debug!("ranking: {rendered}");

    let mut h = heap.borrow_mut();
    h.trace.stop();
    h.trace.finish()
}
