#![no_main]

use libfuzzer_sys::fuzz_target;

use heapviz_core::error::HeapvizError;
use heapviz_core::gc::collector::GcMode;
use heapviz_core::gc::heap::Heap;
use heapviz_core::gc::roots::Handle;
use heapviz_core::gc::trace::TraceSink;

// Byte-driven workout of the handle API under eager reference counting:
// pushes, slot stores, clones and drops in arbitrary order.  The heap
// must stay parseable and typed operations must fail cleanly, never
// corrupt.
fuzz_target!(|data: &[u8]| {
    let heap = Heap::new_shared(GcMode::RefCount, TraceSink::new(Box::new(std::io::sink())));
    let Ok(v) = Handle::vec(&heap, 1) else { return };
    let mut pool: Vec<Handle> = Vec::new();

    for chunk in data.chunks(2) {
        let op = chunk[0];
        let arg = chunk.get(1).copied().unwrap_or(0);
        let outcome = match op % 6 {
            0 => Handle::num(&heap, arg as i16).map(|h| pool.push(h)),
            1 => Handle::str(&heap, &vec![b'a' + (arg % 26); (arg % 8) as usize])
                .map(|h| pool.push(h)),
            2 => match pool.last() {
                Some(h) => v.push(h),
                None => Ok(()),
            },
            3 => {
                if !pool.is_empty() {
                    let idx = arg as usize % pool.len();
                    pool.swap_remove(idx);
                }
                Ok(())
            }
            4 => match pool.last() {
                Some(h) => {
                    pool.push(h.clone());
                    Ok(())
                }
                None => Ok(()),
            },
            _ => {
                let len = v.length().expect("workout vector keeps its type");
                if len > 0 {
                    let got = v.get(arg as u16 % len).expect("in-bounds get succeeds");
                    pool.push(got);
                }
                Ok(())
            }
        };
        match outcome {
            Ok(()) => {}
            Err(HeapvizError::HeapExhausted { .. }) => break,
            Err(other) => panic!("unexpected failure: {other}"),
        }
        heap.borrow().verify_heap().expect("heap must stay parseable");
    }
});
