//! Runs the S1-S6 literal end-to-end scenarios of the original spec's §8
//! and asserts every one passes.

#[test]
fn all_scenarios_pass() {
    let outcomes = iptc_harness::run_all();
    for outcome in &outcomes {
        assert!(outcome.passed, "{}: {}", outcome.name, outcome.detail);
    }
    assert_eq!(outcomes.len(), 6);
}
