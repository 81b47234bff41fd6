#![no_main]

use libfuzzer_sys::fuzz_target;
use lyrix::breakdown::parse_breakdown;
use lyrix::lyrics::normalize_lyrics;
use lyrix::resolver::BreakdownResolver;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(doc) = normalize_lyrics(text) {
        assert!(doc.text().starts_with(lyrix::lyrics::ANCHOR));
        let _ = doc.line_at(u64::from(data.len() as u32) * 1_000);
    }

    let Ok(map) = parse_breakdown(text) else {
        return;
    };
    assert!(map.contains(0));

    let mut resolver = BreakdownResolver::default();
    for byte in data {
        let line = i64::from(*byte) - 16;
        if let Ok(Some(index)) = resolver.on_line_change(line, &map) {
            assert!(map.contains(index));
        }
    }
});
