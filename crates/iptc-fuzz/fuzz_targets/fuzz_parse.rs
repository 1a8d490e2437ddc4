#![no_main]
use libfuzzer_sys::fuzz_target;

use iptc_core::blob::RawInfo;
use iptc_core::model::Counters;
use iptc_core::table::Table;
use iptc_core::transport::{CountersInfo, ReplaceHeader, Transport, TransportResult};

/// Hands back whatever arbitrary bytes the fuzzer gave it as both the
/// info block and the entry blob; `iptc-core`'s parser must reject
/// malformed input with an `Err`, never panic or read out of bounds.
struct ArbitraryTransport {
    info: RawInfo,
    blob: Vec<u8>,
}

impl Transport for ArbitraryTransport {
    fn get_info(&mut self, _table: &str) -> TransportResult<RawInfo> {
        Ok(self.info.clone())
    }

    fn get_entries(&mut self, _table: &str, _expected_size: u32) -> TransportResult<Vec<u8>> {
        Ok(self.blob.clone())
    }

    fn set_replace(&mut self, _header: &ReplaceHeader, _blob: &[u8]) -> TransportResult<Vec<Counters>> {
        Ok(Vec::new())
    }

    fn add_counters(&mut self, _info: &CountersInfo, _deltas: &[Counters]) -> TransportResult<()> {
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    // Reserve a fixed-size header off the front of the corpus entry to
    // drive the valid-hook bitmask and per-hook offsets; the remainder is
    // the raw snapshot blob the parser actually walks.
    if data.len() < 24 {
        return;
    }
    let valid_hooks = u32::from_le_bytes(data[0..4].try_into().unwrap());
    let mut hook_entry = vec![0u32; 5];
    let mut underflow = vec![0u32; 5];
    for h in 0..5 {
        let base = 4 + h * 4;
        hook_entry[h] = u32::from_le_bytes(data[base..base + 4].try_into().unwrap());
    }
    underflow.clone_from(&hook_entry);

    let blob = data[24..].to_vec();
    let info = RawInfo {
        valid_hooks,
        hook_entry,
        underflow,
        num_entries: 0,
        size: blob.len() as u32,
    };

    let transport = ArbitraryTransport { info, blob };
    let _ = Table::init("filter", transport);
});
