//! Conformance testing harness for `iptc-core`.
//!
//! This crate provides:
//! - an in-memory [`Transport`](iptc_core::transport::Transport) implementation
//!   (`fixture::MockTransport`) so `iptc-core` can be driven without a real
//!   kernel socket;
//! - fixture builders that assemble the literal snapshot byte arrays named
//!   by the S1-S6 end-to-end scenarios;
//! - a scenario runner that drives those fixtures through `iptc-core::Table`
//!   and reports pass/fail as structured JSON, the way a conformance report
//!   for a C library would be captured/replayed against fixture data instead
//!   of the live system.

#![forbid(unsafe_code)]

pub mod fixture;
pub mod scenario;

pub use scenario::{run_all, ScenarioOutcome};
