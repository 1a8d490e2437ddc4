//! An in-memory stand-in for the kernel's table `getsockopt`/`setsockopt`
//! interface, plus blob builders for the literal S1-S6 scenarios of the
//! original spec's §8.

use iptc_core::blob::{self, RawInfo};
use iptc_core::model::Counters;
use iptc_core::table::Table;
use iptc_core::transport::{
    CountersInfo, ReplaceHeader, Transport, TransportError, TransportResult,
};

/// Captures every `set_replace`/`add_counters` call it receives, so a
/// scenario can assert on the blob or counters the core actually emitted
/// without the caller needing to thread extra plumbing through `Table`.
pub struct MockTransport {
    pub info: RawInfo,
    pub blob: Vec<u8>,
    /// Pre-replace counters `set_replace` should hand back, indexed by the
    /// old snapshot's linear rule position. Scenario code seeds this to
    /// simulate "the kernel counted packets between read and replace."
    pub pre_replace_counters: Vec<Counters>,
    pub last_replace: Option<(ReplaceHeader, Vec<u8>)>,
    pub last_counters: Option<(CountersInfo, Vec<Counters>)>,
}

impl MockTransport {
    pub fn new(info: RawInfo, blob: Vec<u8>) -> Self {
        let pre_replace_counters = vec![Counters::zero(); info.num_entries as usize];
        Self {
            info,
            blob,
            pre_replace_counters,
            last_replace: None,
            last_counters: None,
        }
    }

    pub fn with_pre_replace_counters(mut self, counters: Vec<Counters>) -> Self {
        self.pre_replace_counters = counters;
        self
    }
}

impl Transport for MockTransport {
    fn get_info(&mut self, _table: &str) -> TransportResult<RawInfo> {
        Ok(self.info.clone())
    }

    fn get_entries(&mut self, _table: &str, _expected_size: u32) -> TransportResult<Vec<u8>> {
        Ok(self.blob.clone())
    }

    fn set_replace(
        &mut self,
        header: &ReplaceHeader,
        blob: &[u8],
    ) -> TransportResult<Vec<Counters>> {
        if header.old_num_entries != self.info.num_entries {
            return Err(TransportError::SnapshotChanged);
        }
        let pre = self.pre_replace_counters.clone();
        self.info = RawInfo {
            valid_hooks: header.valid_hooks,
            hook_entry: header.hook_entry.clone(),
            underflow: header.underflow.clone(),
            num_entries: header.num_entries,
            size: header.size,
        };
        self.blob = blob.to_vec();
        self.last_replace = Some((header.clone(), blob.to_vec()));
        Ok(pre)
    }

    fn add_counters(&mut self, info: &CountersInfo, deltas: &[Counters]) -> TransportResult<()> {
        self.last_counters = Some((info.clone(), deltas.to_vec()));
        Ok(())
    }
}

fn standard_entry(verdict: i32) -> Vec<u8> {
    blob::build_entry(
        &[0u8; blob::IP_TUPLE_SIZE],
        &[],
        blob::STANDARD_TARGET_NAME,
        0,
        &verdict.to_le_bytes(),
    )
}

fn standard_entry_with_counters(verdict: i32, counters: Counters) -> Vec<u8> {
    let mut bytes = standard_entry(verdict);
    blob::patch_counters(&mut bytes, counters.packets, counters.bytes);
    bytes
}

fn error_chain_header(name: &str) -> Vec<u8> {
    blob::build_entry(
        &[0u8; blob::IP_TUPLE_SIZE],
        &[],
        blob::ERROR_TARGET_NAME,
        0,
        &blob::error_payload(name),
    )
}

fn error_footer() -> Vec<u8> {
    blob::build_entry(
        &[0u8; blob::IP_TUPLE_SIZE],
        &[],
        blob::ERROR_TARGET_NAME,
        0,
        &blob::error_payload("ERROR"),
    )
}

/// The S1 snapshot: INPUT (hook 1, ACCEPT), FORWARD (hook 2, DROP),
/// OUTPUT (hook 3, ACCEPT), no user-defined chains.
pub fn stock_filter_table() -> (String, RawInfo, Vec<u8>) {
    let mut blob = Vec::new();
    blob.extend_from_slice(&standard_entry(-1));
    blob.extend_from_slice(&standard_entry(-2));
    blob.extend_from_slice(&standard_entry(-1));
    blob.extend_from_slice(&error_footer());
    let info = builtin_info(&blob, 3);
    ("filter".to_string(), info, blob)
}

/// The S4/S5 snapshot: a single user-defined chain `U` with one rule
/// tagged NORMAL_MAP at position 3 (the chain header, its one rule, and
/// its RETURN footer are positions 0-2; position 3 is... actually the
/// spec's scenario numbers *that rule* at index 3, so this fixture gives
/// `U` three leading rules before the one under test to land it there).
pub fn chain_with_counted_rule(rule_counters: Counters) -> (String, RawInfo, Vec<u8>) {
    let mut blob = Vec::new();
    // INPUT/FORWARD/OUTPUT with no rules (positions 0-2).
    blob.extend_from_slice(&standard_entry(-1));
    blob.extend_from_slice(&standard_entry(-2));
    blob.extend_from_slice(&standard_entry(-1));
    // Chain U: header (not counted — `begin_user_chain` never advances
    // the parser's rule_seq counter, so the header consumes no map_pos
    // slot) + one counted rule (map_pos 3, after INPUT/FORWARD/OUTPUT's
    // 0/1/2) + RETURN footer.
    blob.extend_from_slice(&error_chain_header("U"));
    blob.extend_from_slice(&standard_entry_with_counters(
        -1,
        rule_counters,
    ));
    blob.extend_from_slice(&standard_entry(-5)); // RETURN footer
    blob.extend_from_slice(&error_footer());
    let info = builtin_info(&blob, 6);
    ("filter".to_string(), info, blob)
}

fn builtin_info(blob: &[u8], expected_entries: u32) -> RawInfo {
    let off_input = 0u32;
    let off_forward = blob::next_offset(blob, off_input).expect("fixture entry 0");
    let off_output = blob::next_offset(blob, off_forward).expect("fixture entry 1");

    let mut hook_entry = vec![0u32; 5];
    let mut underflow = vec![0u32; 5];
    hook_entry[1] = off_input;
    hook_entry[2] = off_forward;
    hook_entry[3] = off_output;
    underflow[1] = off_input;
    underflow[2] = off_forward;
    underflow[3] = off_output;

    RawInfo {
        valid_hooks: (1 << 1) | (1 << 2) | (1 << 3),
        hook_entry,
        underflow,
        num_entries: expected_entries,
        size: blob.len() as u32,
    }
}

/// Build a `Table` over a fresh [`MockTransport`] seeded with `(name, info, blob)`.
pub fn init(name: String, info: RawInfo, blob: Vec<u8>) -> Table<MockTransport> {
    let transport = MockTransport::new(info, blob);
    Table::init(&name, transport).expect("fixture blob must parse")
}

/// Like [`init`], but additionally seeds the canned pre-replace counters
/// `set_replace` hands back on the next `commit` — used by the S4/S5
/// counter-reconciliation scenarios to simulate "the kernel counted more
/// packets between the read and the replace."
pub fn init_with_pre_replace(
    name: String,
    info: RawInfo,
    blob: Vec<u8>,
    pre_replace: Vec<Counters>,
) -> Table<MockTransport> {
    let transport = MockTransport::new(info, blob).with_pre_replace_counters(pre_replace);
    Table::init(&name, transport)
        .expect("fixture blob must parse")
        .with_diagnostics()
}

/// A minimal `EntrySpec` whose match list is empty and whose IP header is
/// all-zero (matches any packet) — enough for every scenario here, which
/// exercises target resolution and counter bookkeeping, not match parsing.
pub fn entry_spec(target_name: &str) -> iptc_core::EntrySpec {
    iptc_core::EntrySpec {
        ip_header: [0u8; blob::IP_TUPLE_SIZE],
        matches: Vec::new(),
        target_name: target_name.to_string(),
        target_revision: 0,
        target_payload: Vec::new(),
    }
}
