//! Fuzz harness for `parse_klv`.
//!
//! This target exercises the KLV decoder with arbitrary byte sequences:
//! forged BER lengths, truncated values, indefinite-form length bytes, and
//! pathological item counts. The parser must never panic, read out of
//! bounds, or allocate proportionally to a forged length field; every
//! malformed input must come back as a recoverable error.

#![no_main]
use libfuzzer_sys::fuzz_target;
use tempest_kernel::{find_item, parse_klv, KlvBuffer, KLV_UAS_DATALINK_LS};

fuzz_target!(|data: &[u8]| {
    let buffer = KlvBuffer::new(data.to_vec(), 0, 0);

    // Ok or Err, never a panic.
    if let Ok(items) = parse_klv(&buffer) {
        // Accepted items must stay inside the buffer.
        let min_consumed: u64 = items.iter().map(|item| 17 + u64::from(item.length)).sum();
        assert!(min_consumed <= data.len() as u64);
        for item in &items {
            assert_eq!(item.value.len(), item.length as usize);
        }
        let _ = find_item(&items, &KLV_UAS_DATALINK_LS);
    }
});
