#![no_main]

use libfuzzer_sys::fuzz_target;

use heapviz_core::error::HeapvizError;
use heapviz_core::gc::collector::GcMode;
use heapviz_core::gc::heap::Heap;
use heapviz_core::gc::roots::Handle;
use heapviz_core::gc::trace::TraceSink;

fuzz_target!(|data: &[u8]| {
    // Each byte encodes one allocation request: the low nibble picks a
    // variant, the high nibble a payload size.  Exhaustion is the only
    // acceptable failure; the heap must stay parseable throughout.
    let heap = Heap::new_shared(GcMode::None, TraceSink::new(Box::new(std::io::sink())));
    let mut handles = Vec::new();

    for &b in data {
        let size = (b >> 4) as u16;
        let result = match b & 0x0f {
            0..=3 => Handle::num(&heap, b as i16),
            4..=7 => Handle::str(&heap, &vec![b'x'; size as usize]),
            8..=11 => Handle::tup(&heap, size),
            _ => Handle::vec(&heap, size),
        };
        match result {
            Ok(h) => handles.push(h),
            Err(HeapvizError::HeapExhausted { .. }) => break,
            Err(other) => panic!("unexpected allocation failure: {other}"),
        }
        heap.borrow().verify_heap().expect("heap must stay parseable");
    }
});
