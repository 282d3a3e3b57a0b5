//! End-to-end scenarios: drive the public API and assert on the emitted
//! trace and the final heap shape.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use heapviz_core::gc::collector::GcMode;
use heapviz_core::gc::heap::{Heap, SharedHeap, SEMI_SPACE_SIZE};
use heapviz_core::gc::roots::Handle;
use heapviz_core::gc::trace::TraceSink;
use heapviz_core::objects::header::Tag;
use heapviz_core::workload;

/// Writer that shares its buffer with the asserting test body.
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("trace is utf-8")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn traced_heap(mode: GcMode) -> (SharedHeap, SharedBuf) {
    let buf = SharedBuf::default();
    let heap = Heap::new_shared(mode, TraceSink::new(Box::new(buf.clone())));
    heap.borrow_mut().trace.start();
    (heap, buf)
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

// ── Scenario: nil-only heap ───────────────────────────────────────────────

#[test]
fn nil_only_heap_survives_collection_untouched() {
    for mode in [
        GcMode::None,
        GcMode::RefCount,
        GcMode::MarkSweep,
        GcMode::MarkCompact,
    ] {
        let (heap, buf) = traced_heap(mode);
        heap.borrow_mut().log_roots("start").unwrap();
        heap.borrow_mut().collect().unwrap();
        heap.borrow_mut().log_roots("end").unwrap();

        let text = buf.text();
        assert_eq!(
            count_occurrences(&text, "['roots',0],\n"),
            2,
            "only the nil root is registered ({mode:?})"
        );
        assert_eq!(
            count_occurrences(&text, "['live',0],\n"),
            2,
            "the live closure is exactly nil ({mode:?})"
        );
        assert!(
            !text.contains("['free'"),
            "an empty heap has nothing to reclaim ({mode:?})"
        );
        assert_eq!(heap.borrow().top(), 1, "nothing was allocated ({mode:?})");
    }
}

#[test]
fn nil_only_heap_under_copying_flips_and_reclaims_wholesale() {
    // The copying collector always flips and reclaims the vacated half,
    // nil root or not.
    let (heap, buf) = traced_heap(GcMode::Copying);
    heap.borrow_mut().log_roots("start").unwrap();
    heap.borrow_mut().collect().unwrap();
    heap.borrow_mut().log_roots("end").unwrap();

    let text = buf.text();
    assert_eq!(count_occurrences(&text, "['roots',0],\n"), 2);
    assert_eq!(count_occurrences(&text, "['live',0],\n"), 2);
    assert_eq!(
        count_occurrences(&text, "['free',1,999],\n"),
        1,
        "the vacated lower half is announced even when empty"
    );
    assert_eq!(
        heap.borrow().top(),
        SEMI_SPACE_SIZE,
        "the cursor flips into the upper half"
    );
}

// ── Scenario: refcount release ────────────────────────────────────────────

#[test]
fn ref_count_releases_string_when_last_handle_drops() {
    let (heap, buf) = traced_heap(GcMode::RefCount);
    let s = Handle::str(&heap, b"abc").unwrap();
    assert_eq!(s.loc(), 1);
    drop(s);

    let text = buf.text();
    assert!(text.contains("['alloc',1,5],\n"), "string occupies five words");
    assert!(text.contains("['init',1,':s '],\n"));
    assert!(text.contains("['set',2,'=3'],\n"), "length word");
    assert!(text.contains("['set',3,\"'a\"],\n"));
    assert!(text.contains("['set',4,\"'b\"],\n"));
    assert!(text.contains("['set',5,\"'c\"],\n"));
    assert!(text.contains("['ref_count',1,1],\n"));
    assert!(text.contains("['ref_count',1,0],\n"), "count reaches zero on drop");
    assert!(text.contains("['free',1,5],\n"), "storage is released eagerly");

    let h = heap.borrow();
    assert_eq!(h.tag_at(1).unwrap(), Tag::Free);
    assert_eq!(h.top(), 6, "the bump cursor never rewinds");
    h.verify_heap().unwrap();
}

// ── Scenario: mark–sweep unreachable reclaim ──────────────────────────────

#[test]
fn mark_sweep_reclaims_dropped_vector_of_numbers() {
    let (heap, buf) = traced_heap(GcMode::MarkSweep);
    let v = Handle::vec(&heap, 2).unwrap();
    for _ in 0..2 {
        let n = Handle::num(&heap, 42).unwrap();
        v.push(&n).unwrap();
    }
    // Layout: vec at 1 (3 words), backing tup at 4 (4), nums at 8 and 10.
    assert_eq!(heap.borrow().top(), 12);
    drop(v);

    heap.borrow_mut().collect().unwrap();

    let text = buf.text();
    for free in [
        "['free',1,3],\n",
        "['free',4,4],\n",
        "['free',8,2],\n",
        "['free',10,2],\n",
    ] {
        assert!(text.contains(free), "expected {free:?} in the trace");
    }
    let h = heap.borrow();
    assert!(h.live_locs().is_empty(), "nothing but nil survives");
    assert_eq!(h.top(), 12, "sweep leaves the cursor alone");
    h.verify_heap().unwrap();
}

// ── Scenario: mark–compact sliding ────────────────────────────────────────

#[test]
fn mark_compact_slides_survivor_and_frees_tail() {
    let (heap, buf) = traced_heap(GcMode::MarkCompact);
    let a = Handle::num(&heap, 1).unwrap();
    let b = Handle::num(&heap, 2).unwrap();
    let c = Handle::num(&heap, 3).unwrap();
    assert_eq!((a.loc(), b.loc(), c.loc()), (1, 3, 5));
    drop(b);

    heap.borrow_mut().collect().unwrap();

    assert_eq!(a.loc(), 1);
    assert_eq!(c.loc(), 3, "handles referring to C now report location 3");
    assert_eq!(heap.borrow().top(), 5);
    assert_eq!(c.to_i().unwrap(), 3);

    let text = buf.text();
    assert!(text.contains("['copy',3,5,2],\n"), "C slides from 5 to 3");
    assert!(text.contains("['free',5,2],\n"), "reclaimed tail is announced once");
    heap.borrow().verify_heap().unwrap();
}

// ── Scenario: copy evacuation ─────────────────────────────────────────────

#[test]
fn copying_evacuates_and_frees_whole_semi_space() {
    let (heap, buf) = traced_heap(GcMode::Copying);
    // Two live objects totaling 20 words.
    let s1 = Handle::str(&heap, b"12345678").unwrap();
    let s2 = Handle::str(&heap, b"abcdefgh").unwrap();
    assert_eq!((s1.loc(), s2.loc()), (1, 11));

    heap.borrow_mut().collect().unwrap();

    assert_eq!(
        heap.borrow().top(),
        SEMI_SPACE_SIZE + 20,
        "the new cursor sits right after the evacuated objects"
    );
    assert_eq!(
        (s1.loc(), s2.loc()),
        (SEMI_SPACE_SIZE, SEMI_SPACE_SIZE + 10),
        "evacuation preserves relative order"
    );

    let text = buf.text();
    assert_eq!(
        count_occurrences(&text, "['free',1,999],\n"),
        1,
        "one free record covers the entire vacated semi-space"
    );
    heap.borrow().verify_heap().unwrap();
}

// ── Scenario: driver workload ─────────────────────────────────────────────

const SAMPLE: &str = "10,alice,gold\n-3,bob,gold\n5,alice,gold\n";

fn run_workload(mode: GcMode, input: &str) -> String {
    let buf = SharedBuf::default();
    let heap = Heap::new_shared(mode, TraceSink::new(Box::new(buf.clone())));
    workload::run(&heap, input.as_bytes()).unwrap();
    buf.text()
}

#[test]
fn workload_ranks_sample_ledger() {
    let text = run_workload(GcMode::MarkSweep, SAMPLE);
    let final_dump = text
        .lines()
        .rev()
        .find(|l| l.starts_with("// "))
        .expect("workload emits a final dump comment");
    assert_eq!(final_dump, "// [[\"alice\",15],[\"bob\",-3]]");
    assert!(text.starts_with("var frame_content = [\n"));
    assert!(text.ends_with("['stop']];\n"));
}

#[test]
fn workload_result_is_mode_independent() {
    let expected = "// [[\"alice\",15],[\"bob\",-3]]";
    for mode in [
        GcMode::None,
        GcMode::RefCount,
        GcMode::MarkSweep,
        GcMode::MarkCompact,
        GcMode::Copying,
    ] {
        let text = run_workload(mode, SAMPLE);
        let final_dump = text
            .lines()
            .rev()
            .find(|l| l.starts_with("// "))
            .expect("final dump comment");
        assert_eq!(final_dump, expected, "ranking under {mode:?}");
    }
}

#[test]
fn workload_emits_milestone_breakpoints() {
    let text = run_workload(GcMode::MarkCompact, SAMPLE);
    for bp in [
        "['bp','line parsed'],\n",
        "['bp','file parsed'],\n",
        "['bp','group found'],\n",
        "['bp','data grouped'],\n",
        "['bp','transaction history reduced'],\n",
        "['bp','ranking finished'],\n",
    ] {
        assert!(text.contains(bp), "missing breakpoint {bp:?}");
    }
}

#[test]
fn workload_survives_larger_ledger_in_every_mode() {
    let mut ledger = String::new();
    for i in 0..12 {
        let person = ["ana", "ben", "cyn", "dov"][i % 4];
        ledger.push_str(&format!("{},{},gold\n", (i as i32 % 7) - 3, person));
    }
    for mode in [
        GcMode::RefCount,
        GcMode::MarkSweep,
        GcMode::MarkCompact,
        GcMode::Copying,
    ] {
        let text = run_workload(mode, &ledger);
        assert!(text.ends_with("['stop']];\n"), "clean shutdown under {mode:?}");
    }
}

// ── Round-trip laws ───────────────────────────────────────────────────────

#[test]
fn string_to_i_round_trips_across_the_i16_range() {
    let samples: [i16; 12] = [
        -32768, -32767, -12345, -100, -1, 0, 1, 7, 99, 12345, 32766, 32767,
    ];
    for value in samples {
        let heap = Heap::new_shared(
            GcMode::None,
            TraceSink::new(Box::new(std::io::sink())),
        );
        let s = Handle::str(&heap, value.to_string().as_bytes()).unwrap();
        assert_eq!(s.to_i().unwrap(), value, "decimal round-trip of {value}");
    }
}

#[test]
fn collect_is_idempotent_for_moving_collectors() {
    for mode in [GcMode::MarkCompact, GcMode::Copying] {
        let (heap, _buf) = traced_heap(mode);
        let keep = Handle::vec(&heap, 2).unwrap();
        let n = Handle::num(&heap, 8).unwrap();
        keep.push(&n).unwrap();
        drop(Handle::str(&heap, b"junk").unwrap());

        heap.borrow_mut().collect().unwrap();
        let first = (keep.loc(), n.loc(), heap.borrow().top());

        heap.borrow_mut().collect().unwrap();
        heap.borrow_mut().collect().unwrap();

        // Under Copying two more flips land everything back where the
        // first collection put it; under MarkCompact nothing moves at all.
        let settled = (keep.loc(), n.loc(), heap.borrow().top());
        assert_eq!(settled, first, "repeat collection is stable under {mode:?}");
        assert_eq!(keep.get(0).unwrap().to_i().unwrap(), 8);
    }
}

#[test]
fn push_then_get_last_returns_equal_value() {
    let heap = Heap::new_shared(
        GcMode::RefCount,
        TraceSink::new(Box::new(std::io::sink())),
    );
    let v = Handle::vec(&heap, 1).unwrap();
    for i in 0..6i16 {
        let n = Handle::num(&heap, i * 11).unwrap();
        v.push(&n).unwrap();
        let back = v.get(v.length().unwrap() - 1).unwrap();
        assert!(back.equals(&n).unwrap());
    }
}
