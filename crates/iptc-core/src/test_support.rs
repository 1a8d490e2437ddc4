//! Shared test fixtures: an in-memory [`Transport`] and a stock
//! three-builtin-chain snapshot, used by inline tests across the crate.

use crate::blob::{self, RawInfo};
use crate::model::Counters;
use crate::table::Table;
use crate::transport::{CountersInfo, ReplaceHeader, Transport, TransportError, TransportResult};

/// An in-memory stand-in for the kernel's `getsockopt`/`setsockopt`
/// table interface: `set_replace` swaps in the submitted blob and
/// hands back a zeroed pre-replace counters array, sized to the
/// snapshot it's replacing.
pub(crate) struct MockTransport {
    pub info: RawInfo,
    pub blob: Vec<u8>,
    pub last_replace: Option<(ReplaceHeader, Vec<u8>)>,
    pub last_counters: Option<(CountersInfo, Vec<Counters>)>,
}

impl Transport for MockTransport {
    fn get_info(&mut self, _table: &str) -> TransportResult<RawInfo> {
        Ok(self.info.clone())
    }

    fn get_entries(&mut self, _table: &str, _expected_size: u32) -> TransportResult<Vec<u8>> {
        Ok(self.blob.clone())
    }

    fn set_replace(&mut self, header: &ReplaceHeader, blob: &[u8]) -> TransportResult<Vec<Counters>> {
        if header.old_num_entries != self.info.num_entries {
            return Err(TransportError::SnapshotChanged);
        }
        let pre = vec![Counters::zero(); self.info.num_entries as usize];
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

fn error_footer() -> Vec<u8> {
    blob::build_entry(
        &[0u8; blob::IP_TUPLE_SIZE],
        &[],
        blob::ERROR_TARGET_NAME,
        0,
        &blob::error_payload("ERROR"),
    )
}

/// A stock filter-table snapshot: builtin INPUT (ACCEPT), FORWARD
/// (DROP), OUTPUT (ACCEPT), no user-defined chains, terminated by the
/// blob's final ERROR pseudo-entry.
pub(crate) fn three_empty_chains() -> (String, Vec<u8>) {
    let mut blob = Vec::new();
    blob.extend_from_slice(&standard_entry(-1)); // INPUT: ACCEPT
    blob.extend_from_slice(&standard_entry(-2)); // FORWARD: DROP
    blob.extend_from_slice(&standard_entry(-1)); // OUTPUT: ACCEPT
    blob.extend_from_slice(&error_footer());
    ("filter".to_string(), blob)
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

/// A snapshot where INPUT's first rule already is a JUMP to user-defined
/// chain `U`, written the way `compile.rs` itself writes one (verdict =
/// target's head offset plus its header size) — exercises `resolve_jumps`
/// against a jump this crate did not just create, unlike the create/commit
/// round trip in `parser`'s own `S2`-shaped tests.
pub(crate) fn chain_with_jump() -> (String, RawInfo, Vec<u8>) {
    let mut blob = Vec::new();

    let jump_entry = standard_entry(0); // placeholder verdict, patched below
    let jump_len = jump_entry.len();
    blob.extend_from_slice(&jump_entry);
    blob.extend_from_slice(&standard_entry(-1)); // INPUT policy: ACCEPT

    let off_forward = blob.len() as u32;
    blob.extend_from_slice(&standard_entry(-2)); // FORWARD: DROP

    let off_output = blob.len() as u32;
    blob.extend_from_slice(&standard_entry(-1)); // OUTPUT: ACCEPT

    let off_chain_u = blob.len() as u32;
    let header = error_chain_header("U");
    let header_len = header.len() as u32;
    blob.extend_from_slice(&header);
    blob.extend_from_slice(&standard_entry(-5)); // U policy: RETURN
    blob.extend_from_slice(&error_footer());

    let target_offset = off_chain_u + header_len;
    blob::patch_verdict(&mut blob[0..jump_len], target_offset as i32);

    let mut hook_entry = vec![0u32; 5];
    let mut underflow = vec![0u32; 5];
    hook_entry[1] = 0;
    hook_entry[2] = off_forward;
    hook_entry[3] = off_output;
    underflow[1] = 0;
    underflow[2] = off_forward;
    underflow[3] = off_output;

    let info = RawInfo {
        valid_hooks: (1 << 1) | (1 << 2) | (1 << 3),
        hook_entry,
        underflow,
        num_entries: 7,
        size: blob.len() as u32,
    };

    ("filter".to_string(), info, blob)
}

/// Build a [`Table`] over a [`MockTransport`] seeded with `blob`,
/// deriving hook offsets from the blob's own entry layout rather than
/// recomputing them, so the fixture can't drift out of sync with
/// itself.
pub(crate) fn init_mock(blob: Vec<u8>, table_name: String) -> Table<MockTransport> {
    let off_input = 0u32;
    let off_forward = blob::next_offset(&blob, off_input).expect("fixture entry 0");
    let off_output = blob::next_offset(&blob, off_forward).expect("fixture entry 1");
    let off_error = blob::next_offset(&blob, off_output).expect("fixture entry 2");
    let size = blob.len() as u32;
    debug_assert_eq!(blob::next_offset(&blob, off_error), Some(size));

    let mut hook_entry = vec![0u32; 5];
    let mut underflow = vec![0u32; 5];
    hook_entry[1] = off_input;
    hook_entry[2] = off_forward;
    hook_entry[3] = off_output;
    underflow[1] = off_input;
    underflow[2] = off_forward;
    underflow[3] = off_output;

    let info = RawInfo {
        valid_hooks: (1 << 1) | (1 << 2) | (1 << 3),
        hook_entry,
        underflow,
        num_entries: 4,
        size,
    };

    let transport = MockTransport {
        info,
        blob,
        last_replace: None,
        last_counters: None,
    };

    Table::init(&table_name, transport).expect("fixture blob must parse")
}

/// Like [`init_mock`], but for fixtures (e.g. [`chain_with_jump`]) that
/// already know their own `RawInfo` rather than the stock three-chain
/// layout.
pub(crate) fn init_mock_with_info(table_name: String, info: RawInfo, blob: Vec<u8>) -> Table<MockTransport> {
    let transport = MockTransport {
        info,
        blob,
        last_replace: None,
        last_counters: None,
    };
    Table::init(&table_name, transport).expect("fixture blob must parse")
}
