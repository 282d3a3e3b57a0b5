#![no_main]

use libfuzzer_sys::fuzz_target;

use heapviz_core::error::HeapvizError;
use heapviz_core::gc::collector::GcMode;
use heapviz_core::gc::heap::Heap;
use heapviz_core::gc::roots::Handle;
use heapviz_core::gc::trace::TraceSink;

// Interleave allocation, mutation, handle drops and collections under
// every collector policy.  After each collection the surviving data must
// read back intact through its handles.
fuzz_target!(|data: &[u8]| {
    let Some((&mode_byte, ops)) = data.split_first() else {
        return;
    };
    let mode = match mode_byte % 4 {
        0 => GcMode::RefCount,
        1 => GcMode::MarkSweep,
        2 => GcMode::MarkCompact,
        _ => GcMode::Copying,
    };

    let heap = Heap::new_shared(mode, TraceSink::new(Box::new(std::io::sink())));
    let Ok(keep) = Handle::vec(&heap, 2) else { return };
    let mut expected: Vec<i16> = Vec::new();
    let mut scratch: Vec<Handle> = Vec::new();

    // The copying collector assumes the live set fits one semi-space;
    // keep the retained data well inside that bound.
    const KEEP_LIMIT: usize = 200;
    const SCRATCH_LIMIT: usize = 20;

    for &b in ops {
        let result = match b % 4 {
            0 if expected.len() < KEEP_LIMIT => {
                Handle::num(&heap, b as i16).and_then(|n| {
                    keep.push(&n)?;
                    expected.push(b as i16);
                    Ok(())
                })
            }
            0 => Ok(()),
            1 if scratch.len() < SCRATCH_LIMIT => {
                Handle::str(&heap, &vec![b'g'; (b % 11) as usize]).map(|h| scratch.push(h))
            }
            1 => Ok(()),
            2 => {
                scratch.clear();
                Ok(())
            }
            _ => heap.borrow_mut().collect(),
        };
        match result {
            Ok(()) => {}
            Err(HeapvizError::HeapExhausted { .. }) => return,
            Err(other) => panic!("unexpected failure under {mode:?}: {other}"),
        }
    }

    heap.borrow_mut().collect().expect("final collection");
    heap.borrow().verify_heap().expect("heap must stay parseable");
    assert_eq!(keep.length().expect("kept vector survives") as usize, expected.len());
    for (i, want) in expected.iter().enumerate() {
        let got = keep.get(i as u16).expect("kept element readable");
        assert_eq!(got.to_i().expect("kept element is a Num"), *want);
    }
});
