#![no_main]

use libfuzzer_sys::fuzz_target;
use newsline_core::identity::{IdentityResolver, normalize_url};
use newsline_core::model::FeedSnapshot;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let normalized = normalize_url(text);
    assert_eq!(normalize_url(text), normalized);
    assert!(!normalized.contains('?'));

    let Ok(snapshot) = FeedSnapshot::from_json(text) else {
        return;
    };
    let resolver = IdentityResolver::default();
    for item in &snapshot.items {
        let key = resolver.resolve(item);
        assert!(!key.as_str().is_empty());
        assert_eq!(resolver.resolve(item), key);
    }
});
