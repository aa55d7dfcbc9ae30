#![no_main]

use libfuzzer_sys::fuzz_target;
use newsline_core::identity::IdentityKey;
use newsline_core::sequence::{MemoryKv, SEQUENCE_STORAGE_KEY, SequenceRecord, SequenceStore};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);

    let (record, _) = SequenceRecord::parse(&raw);
    assert!(record.map.values().all(|&n| n <= record.counter));

    // Whatever is stored, a cycle must still number new keys above the counter.
    let mut store = SequenceStore::new(MemoryKv::with_entry(SEQUENCE_STORAGE_KEY, &raw));
    let before = store.load();
    let key = IdentityKey::from("c:fuzz-new-key");
    let assignment = store.assign(std::slice::from_ref(&key));
    let sequence = assignment.sequence(&key).unwrap_or_default();
    match before.get(&key) {
        Some(existing) => assert_eq!(sequence, existing),
        None => assert_eq!(sequence, before.counter + 1),
    }
});
