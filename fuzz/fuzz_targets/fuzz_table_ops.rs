//! Fuzz target: `AdvTable` put / drain / history
//!
//! Each input byte is one operation on a small table.  The table must
//! never panic, never report more pending records than tracked ones, and
//! never list a device twice.
//!
//! cargo fuzz run fuzz_table_ops

#![no_main]

use libfuzzer_sys::fuzz_target;
use blegw::adv::{AdvBatch, AdvReport, AdvTable, MacAddr};

const SLOTS: usize = 16;

fuzz_target!(|data: &[u8]| {
    let table: AdvTable<SLOTS> = AdvTable::new();
    let mut out = AdvBatch::<SLOTS>::new();
    for (i, &op) in data.iter().enumerate() {
        match op >> 6 {
            0 => {
                table.drain_retransmission_queue(&mut out);
                assert_eq!(table.num_pending(), 0);
            }
            1 => {
                table.read_history(i as u32, u32::from(op & 0x3F), true, &mut out);
            }
            _ => {
                let report = AdvReport {
                    tag_mac: MacAddr::new([0, 0, 0, 0, 0, op & 0x3F]),
                    timestamp: i as u32 + 1,
                    samples_counter: 0,
                    rssi: -(op as i8 & 0x7F),
                    data: Default::default(),
                };
                let _ = table.put(&report);
            }
        }
        assert!(table.num_pending() <= table.num_tracked());
        assert!(table.num_tracked() <= SLOTS);

        table.read_history(0, 0, false, &mut out);
        let mut macs: Vec<_> = out.iter().map(|r| r.tag_mac).collect();
        macs.sort_by_key(|m| m.octets());
        macs.dedup();
        assert_eq!(macs.len(), out.len());
    }
});
