#![no_main]

use libfuzzer_sys::fuzz_target;

use repool::object_pool::ObjectPool;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let capacity = (data[0] as usize % 16).max(1);
    let pool: ObjectPool<Vec<u8>> = ObjectPool::new(capacity);

    let mut held: Vec<Vec<u8>> = Vec::new();
    for &byte in &data[1..] {
        if byte % 2 == 0 {
            let mut obj = pool.get();
            // Rented objects are always reset.
            assert!(obj.is_empty());
            obj.push(byte);
            held.push(obj);
        } else if let Some(obj) = held.pop() {
            pool.return_obj(obj);
        }
        assert!(pool.len() <= capacity);
    }

    pool.clear();
    assert!(pool.is_empty());
});
