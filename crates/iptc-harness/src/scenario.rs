//! Runs the literal S1-S6 end-to-end scenarios named by the original
//! spec's §8 against `iptc-core::Table` driven by [`crate::fixture::MockTransport`],
//! and reports pass/fail the way a conformance report captures per-case
//! outcomes instead of a bare assert.

use iptc_core::model::Counters;
use serde::Serialize;

use crate::fixture;

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

fn outcome(name: &'static str, result: Result<(), String>) -> ScenarioOutcome {
    match result {
        Ok(()) => ScenarioOutcome {
            name,
            passed: true,
            detail: "ok".to_string(),
        },
        Err(detail) => ScenarioOutcome {
            name,
            passed: false,
            detail,
        },
    }
}

macro_rules! check {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($msg.to_string());
        }
    };
}

/// Run every named scenario and return one outcome per scenario, in order.
pub fn run_all() -> Vec<ScenarioOutcome> {
    vec![
        outcome("S1_round_trip_stock_filter_table", s1()),
        outcome("S2_create_and_jump", s2()),
        outcome("S3_delete_with_dangling_reference", s3()),
        outcome("S4_counter_reconciliation", s4()),
        outcome("S5_zeroed_counter", s5()),
        outcome("S6_rename_preserves_references", s6()),
    ]
}

fn s1() -> Result<(), String> {
    let (name, info, blob) = fixture::stock_filter_table();
    let mut t = fixture::init(name, info, blob);

    check!(t.first_chain().as_deref() == Some("INPUT"), "first_chain != INPUT");
    check!(t.next_chain().as_deref() == Some("FORWARD"), "next_chain != FORWARD");
    check!(t.next_chain().as_deref() == Some("OUTPUT"), "next_chain != OUTPUT");
    check!(t.next_chain().is_none(), "expected no chain after OUTPUT");

    let (policy, counters) = t.get_policy("FORWARD").map_err(|e| e.to_string())?;
    check!(policy.name() == "DROP", "FORWARD policy != DROP");
    check!(counters == Counters::zero(), "FORWARD counters != (0, 0)");

    // Without mutating, commit must be a no-op: no set_replace call reaches the transport.
    t.commit().map_err(|e| e.to_string())?;
    Ok(())
}

fn s2() -> Result<(), String> {
    let (name, info, blob) = fixture::stock_filter_table();
    let mut t = fixture::init(name, info, blob);

    t.create_chain("block").map_err(|e| e.to_string())?;
    t.append_entry("INPUT", fixture::entry_spec("block"))
        .map_err(|e| e.to_string())?;
    check!(t.get_references("block").map_err(|e| e.to_string())? == 1, "refcount != 1");

    t.commit().map_err(|e| e.to_string())?;

    // Invariant 3 (parser round-trip): re-parsing the compiled blob must
    // resolve the appended rule's jump back to "block" and preserve the
    // reference count.
    check!(t.get_target("INPUT", 1).map_err(|e| e.to_string())? == "block", "JUMP target not preserved post-commit");
    check!(t.get_references("block").map_err(|e| e.to_string())? == 1, "refcount lost post-commit");
    Ok(())
}

fn s3() -> Result<(), String> {
    let (name, info, blob) = fixture::stock_filter_table();
    let mut t = fixture::init(name, info, blob);

    t.create_chain("block").map_err(|e| e.to_string())?;
    t.append_entry("INPUT", fixture::entry_spec("block"))
        .map_err(|e| e.to_string())?;
    t.commit().map_err(|e| e.to_string())?;

    let err = t.delete_chain("block").unwrap_err();
    check!(err == iptc_core::error::IptcError::StillReferenced, "expected STILL_REFERENCED");

    t.delete_num_entry("INPUT", 0).map_err(|e| e.to_string())?;
    t.delete_chain("block").map_err(|e| e.to_string())?;
    check!(!t.is_chain("block"), "block chain still present after delete");
    Ok(())
}

fn s4() -> Result<(), String> {
    let cached = Counters { packets: 100, bytes: 20_000 };
    let (name, info, blob) = fixture::chain_with_counted_rule(cached);
    let pre_replace = Counters { packets: 150, bytes: 30_000 };
    let mut pre = vec![Counters::zero(); info.num_entries as usize];
    pre[3] = pre_replace;
    let mut t = fixture::init_with_pre_replace(name, info, blob, pre);

    // The caller does not mutate U; force a commit by touching an
    // unrelated, already-empty chain so the counter-reconciliation math
    // for U's untouched rule is still exercised end to end.
    t.zero_entries("INPUT").map_err(|e| e.to_string())?;
    t.commit().map_err(|e| e.to_string())?;

    let record = t.commit_log().last().ok_or("no commit log record")?;
    let recon = record
        .reconciliations
        .iter()
        .find(|r| r.tag == "NORMAL_MAP" && r.pre_replace == pre_replace)
        .ok_or("no NORMAL_MAP reconciliation matching pre-replace counters")?;
    check!(recon.contribution == pre_replace, "NormalMap contribution != pre_replace verbatim");
    Ok(())
}

fn s5() -> Result<(), String> {
    let cached = Counters { packets: 100, bytes: 20_000 };
    let (name, info, blob) = fixture::chain_with_counted_rule(cached);
    let pre_replace = Counters { packets: 150, bytes: 30_000 };
    let mut pre = vec![Counters::zero(); info.num_entries as usize];
    pre[3] = pre_replace;
    let mut t = fixture::init_with_pre_replace(name, info, blob, pre);

    t.zero_entries("U").map_err(|e| e.to_string())?;
    t.commit().map_err(|e| e.to_string())?;

    let want = Counters { packets: 50, bytes: 10_000 };
    let record = t.commit_log().last().ok_or("no commit log record")?;
    let recon = record
        .reconciliations
        .iter()
        .find(|r| r.tag == "ZEROED" && r.pre_replace == pre_replace)
        .ok_or("no ZEROED reconciliation matching pre-replace counters")?;
    check!(recon.contribution == want, "Zeroed contribution != pre_replace - cached");
    Ok(())
}

fn s6() -> Result<(), String> {
    let (name, info, blob) = fixture::stock_filter_table();
    let mut t = fixture::init(name, info, blob);

    t.create_chain("a").map_err(|e| e.to_string())?;
    t.create_chain("b").map_err(|e| e.to_string())?;
    t.append_entry("INPUT", fixture::entry_spec("b"))
        .map_err(|e| e.to_string())?;
    t.rename_chain("b", "z").map_err(|e| e.to_string())?;

    check!(t.get_target("INPUT", 1).map_err(|e| e.to_string())? == "z", "JUMP target name not renamed");
    check!(t.get_references("z").map_err(|e| e.to_string())? == 1, "refcount not preserved across rename");
    Ok(())
}
