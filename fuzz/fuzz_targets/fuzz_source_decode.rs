#![no_main]

use libfuzzer_sys::fuzz_target;
use srcid::index::SourceRecord;

fuzz_target!(|data: &[u8]| {
    // Arbitrary table bytes must decode or fail cleanly, never panic.
    // Anything that decodes has to survive a re-encode unchanged.
    if let Ok(record) = SourceRecord::decode(data) {
        let bytes = record.encode().unwrap();
        assert_eq!(SourceRecord::decode(&bytes).unwrap(), record);
    }
});
