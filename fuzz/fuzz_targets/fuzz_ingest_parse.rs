//! Fuzz target: `parse_adv_report` and `count_sensor_samples`
//!
//! Arbitrary frame bodies must be either rejected with a typed error or
//! turned into a record whose payload fits the table slot.
//!
//! cargo fuzz run fuzz_ingest_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use blegw::adv::ADV_DATA_MAX_LEN;
use blegw::ingest::parse_adv_report;

fuzz_target!(|data: &[u8]| {
    let company_id = match data {
        [a, b, ..] => u16::from_le_bytes([*a, *b]),
        _ => 0x0499,
    };
    if let Ok(report) = parse_adv_report(Some(data), 1, company_id) {
        assert!(report.data.len() <= ADV_DATA_MAX_LEN);
        assert!(usize::from(report.samples_counter) <= report.data.len() / 4);
        assert_eq!(report.timestamp, 1);
    }
});
