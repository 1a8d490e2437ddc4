//! The in-memory cache model: chains and rules (§3 Data Model).
//!
//! Chains live in an arena (`Table::chains`, a `Vec<Option<Chain>>`)
//! addressed by a stable [`ChainId`], rather than behind a raw pointer:
//! a `Rule::Jump` needs to name a chain that can legitimately be shared
//! by many rules, and an arena index survives every mutation that a raw
//! pointer into a reallocating `Vec` would not.

/// Stable handle to a [`Chain`] within one [`crate::table::Table`].
///
/// Never reused after `delete_chain` frees the slot (the arena does
/// not recycle indices), so a stale `ChainId` a caller failed to drop
/// is simply absent from the table rather than silently aliasing a
/// different chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub(crate) usize);

/// Terminal action or control-transfer a STANDARD target encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Drop,
    Queue,
    Return,
}

impl Verdict {
    pub fn name(self) -> &'static str {
        match self {
            Verdict::Accept => "ACCEPT",
            Verdict::Drop => "DROP",
            Verdict::Queue => "QUEUE",
            Verdict::Return => "RETURN",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ACCEPT" => Some(Verdict::Accept),
            "DROP" => Some(Verdict::Drop),
            "QUEUE" => Some(Verdict::Queue),
            "RETURN" => Some(Verdict::Return),
            _ => None,
        }
    }
}

/// Reserved chain-name labels that may never be used as a user chain name.
pub const RESERVED_LABELS: [&str; 4] = ["ACCEPT", "DROP", "QUEUE", "RETURN"];

pub fn is_reserved_label(name: &str) -> bool {
    RESERVED_LABELS.contains(&name)
}

/// How a rule's or chain's post-commit counter is derived from the
/// pre-replace read-back (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterTag {
    /// Newly created by the caller; not present in the last snapshot.
    NoMap,
    /// Present in the last snapshot at `map_pos`; counters are read,
    /// not rewritten, by the caller.
    NormalMap { map_pos: usize },
    /// Present in the last snapshot at `map_pos`; the caller zeroed the
    /// cached counters (subtract on reconciliation instead of adding).
    Zeroed { map_pos: usize },
    /// The caller set counters explicitly; use them verbatim.
    Set,
}

impl CounterTag {
    pub fn map_pos(self) -> Option<usize> {
        match self {
            CounterTag::NormalMap { map_pos } | CounterTag::Zeroed { map_pos } => Some(map_pos),
            _ => None,
        }
    }
}

/// Packet/byte counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Counters {
    pub packets: u64,
    pub bytes: u64,
}

impl Counters {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// What a rule's target resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    /// `verdict` is one of ACCEPT/DROP/QUEUE/RETURN.
    Standard(Verdict),
    /// Named extension target; payload is opaque to the core.
    Module { name: String, target_size: u16 },
    /// Empty target name; falls through to the next rule.
    FallThrough,
    /// Non-negative verdict resolved to another chain.
    Jump(ChainId),
}

/// One rule: a match list plus a resolved target (§3 Data Model).
#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: RuleKind,
    /// Current offset in the most recently compiled/parsed blob.
    pub offset: u32,
    /// Serialized entry size (header + matches + target), XT-aligned.
    pub size: u32,
    pub counters: Counters,
    pub counter_tag: CounterTag,
    /// Embedded raw entry bytes: match-list + target header + payload.
    /// Retained verbatim so `delete_entry`'s byte-equal comparison and
    /// `commit`'s re-emission never have to reconstruct an extension's
    /// opaque payload.
    pub bytes: Vec<u8>,
}

impl Rule {
    pub fn target_name(&self) -> String {
        match &self.kind {
            RuleKind::Standard(v) => v.name().to_string(),
            RuleKind::Module { name, .. } => name.clone(),
            RuleKind::FallThrough => String::new(),
            RuleKind::Jump(_) => "STANDARD".to_string(),
        }
    }
}

/// Built-in vs. user-defined chain distinction and built-in-only fields.
#[derive(Debug, Clone)]
pub enum ChainKind {
    Builtin { hook: u32, policy: Verdict },
    UserDefined,
}

/// A named list of rules ending in a policy (built-in) or RETURN
/// (user-defined) (§3 Data Model).
#[derive(Debug, Clone)]
pub struct Chain {
    pub name: String,
    pub kind: ChainKind,
    pub counters: Counters,
    pub counter_tag: CounterTag,
    /// Number of JUMP rules across the table that currently target
    /// this chain. Gates `delete_chain` (invariant 2 in §8).
    pub refcount: u32,
    pub rules: Vec<Rule>,
    pub head_offset: u32,
    pub foot_offset: u32,
}

impl Chain {
    pub fn is_builtin(&self) -> bool {
        matches!(self.kind, ChainKind::Builtin { .. })
    }

    pub fn hook(&self) -> Option<u32> {
        match self.kind {
            ChainKind::Builtin { hook, .. } => Some(hook),
            ChainKind::UserDefined => None,
        }
    }

    pub fn policy(&self) -> Option<Verdict> {
        match self.kind {
            ChainKind::Builtin { policy, .. } => Some(policy),
            ChainKind::UserDefined => None,
        }
    }
}
