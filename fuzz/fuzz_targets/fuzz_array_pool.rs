#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

use repool::array_pool::ArrayPool;
use repool::monitor::{ElementKind, MemoryMonitor};

fuzz_target!(|data: &[u8]| {
    let pool = ArrayPool::<u8>::new(
        ElementKind::U8,
        4096,
        4,
        Arc::new(MemoryMonitor::new(false)),
        false,
    );

    let mut held: Vec<Vec<u8>> = Vec::new();

    // Interpret the input as an op stream: rent, return, or foreign return.
    for chunk in data.chunks(3) {
        let op = chunk[0] % 3;
        let len = chunk.get(1).copied().unwrap_or(0) as usize
            | (chunk.get(2).copied().unwrap_or(0) as usize) << 8;
        match op {
            0 => {
                let array = pool.rent(len);
                if len > 0 {
                    assert!(array.len() >= len);
                }
                held.push(array);
            }
            1 => {
                if let Some(array) = held.pop() {
                    pool.return_array(array, len % 2 == 0);
                }
            }
            _ => {
                // Foreign arrays of arbitrary length must never corrupt buckets.
                pool.return_array(vec![0u8; len % 8192], false);
            }
        }
    }

    // Everything rentable afterwards still covers its request.
    for request in [1usize, 17, 4096] {
        assert!(pool.rent(request).len() >= request);
    }
});
