//! Chain Index (§4.2): a sorted sparse array over the user-defined
//! chains, enabling O(log(N/K) + K) search by name, and — while the
//! chain list's offsets remain monotone — by offset, sharing the same
//! binary-search shape for both (a "double binary search" design).

use crate::config::IndexConfig;
use crate::model::ChainId;
use std::cmp::Ordering;

/// Sparse index over user-defined chains: one slot per [`IndexConfig::bucket_size`].
#[derive(Debug, Clone, Default)]
pub struct ChainIndex {
    /// `slots[i]` is the chain at the start of bucket `i` in the
    /// sorted user-defined chain list.
    slots: Vec<ChainId>,
    /// Whether chain head-offsets are still monotone with name order
    /// (so [`Self::lookup_by_offset`] is usable). Cleared by the
    /// parser the first time a chain arrives out of kernel order.
    pub sorted_offsets: bool,
    inserts_since_build: usize,
}

impl ChainIndex {
    pub fn empty() -> Self {
        Self {
            slots: Vec::new(),
            sorted_offsets: true,
            inserts_since_build: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `build(chain_list)`: fills every `K`th user-defined chain into
    /// the array, in list order.
    pub fn build(&mut self, sorted_user_chains: &[ChainId], cfg: &IndexConfig) {
        let bucket = cfg.bucket_size.max(1);
        self.slots = sorted_user_chains
            .iter()
            .copied()
            .step_by(bucket)
            .collect();
        self.inserts_since_build = 0;
    }

    /// Record a completed insert; triggers an unconditional rebuild once
    /// more than `rebuild_tolerance` inserts have accumulated.
    pub fn note_insert(&mut self, sorted_user_chains: &[ChainId], cfg: &IndexConfig) {
        self.inserts_since_build += 1;
        if self.inserts_since_build > cfg.rebuild_tolerance {
            self.build(sorted_user_chains, cfg);
        }
    }

    /// Replace the first slot directly — used when a new chain becomes
    /// the new head of the sorted list (cheaper than a rebuild).
    pub fn replace_head(&mut self, id: ChainId) {
        if let Some(slot) = self.slots.first_mut() {
            *slot = id;
        } else {
            self.slots.push(id);
        }
    }

    /// Binary search by name. Returns a chain to begin a forward linear
    /// scan from; `None` means "scan from the start of the user-defined
    /// chain list" (empty index, or list shorter than one bucket).
    pub fn lookup_by_name(&self, name: &str, name_of: impl Fn(ChainId) -> String) -> Option<ChainId> {
        binary_search(&self.slots, |cid| name_of(*cid).as_str().cmp(name))
    }

    /// Same shape as [`Self::lookup_by_name`], but by head offset;
    /// only meaningful while `sorted_offsets` holds.
    pub fn lookup_by_offset(&self, offset: u32, offset_of: impl Fn(ChainId) -> u32) -> Option<ChainId> {
        if !self.sorted_offsets {
            return None;
        }
        binary_search(&self.slots, |cid| offset_of(*cid).cmp(&offset))
    }

    /// `delete_chain(c)`: patch the slot referencing `removed` to its
    /// sorted-order successor. Returns `false` if the successor no
    /// longer belongs to the same bucket (caller must `rebuild`
    /// instead), `true` if the patch (or no-op) sufficed.
    pub fn delete_chain(
        &mut self,
        removed: ChainId,
        successor: Option<ChainId>,
        successor_pos: usize,
        bucket_size: usize,
    ) -> bool {
        let Some(slot_idx) = self.slots.iter().position(|&c| c == removed) else {
            return true;
        };
        match successor {
            Some(next) => {
                let bucket_end = (slot_idx + 1) * bucket_size.max(1);
                if successor_pos < bucket_end {
                    self.slots[slot_idx] = next;
                    true
                } else {
                    false
                }
            }
            None => {
                self.slots.remove(slot_idx);
                true
            }
        }
    }

    pub fn rebuild(&mut self, sorted_user_chains: &[ChainId], cfg: &IndexConfig) {
        self.build(sorted_user_chains, cfg);
    }
}

/// Returns the rightmost slot whose key compares `<=` the target, per
/// `cmp`, or the first slot if every key is greater. `None` if `slots`
/// is empty.
fn binary_search<T: Copy>(slots: &[T], cmp: impl Fn(&T) -> Ordering) -> Option<T> {
    if slots.is_empty() {
        return None;
    }
    let mut lo: i64 = 0;
    let mut hi: i64 = slots.len() as i64 - 1;
    let mut result = slots[0];
    while lo <= hi {
        let mid = ((lo + hi) / 2) as usize;
        match cmp(&slots[mid]) {
            Ordering::Equal => return Some(slots[mid]),
            Ordering::Less => {
                result = slots[mid];
                lo = mid as i64 + 1;
            }
            Ordering::Greater => hi = mid as i64 - 1,
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> ChainId {
        ChainId(n)
    }

    #[test]
    fn empty_chain_list_yields_empty_index() {
        let mut idx = ChainIndex::empty();
        idx.build(&[], &IndexConfig::default());
        assert!(idx.is_empty());
    }

    #[test]
    fn build_takes_every_kth_chain() {
        let mut idx = ChainIndex::empty();
        let cfg = IndexConfig {
            bucket_size: 2,
            ..Default::default()
        };
        let chains: Vec<ChainId> = (0..5).map(id).collect();
        idx.build(&chains, &cfg);
        assert_eq!(idx.len(), 3); // positions 0, 2, 4
    }

    #[test]
    fn lookup_by_name_finds_bucket_at_or_before_target() {
        let mut idx = ChainIndex::empty();
        let cfg = IndexConfig {
            bucket_size: 2,
            ..Default::default()
        };
        // sorted names: a(0) c(1) e(2) g(3) i(4)
        let names = ["a", "c", "e", "g", "i"];
        let chains: Vec<ChainId> = (0..5).map(id).collect();
        idx.build(&chains, &cfg);
        let name_of = |cid: ChainId| names[cid.0].to_string();

        // exact hit
        assert_eq!(idx.lookup_by_name("e", name_of), Some(id(2)));
        // between e(pos2, indexed) and g(pos3, not indexed) -> bucket at pos2
        assert_eq!(idx.lookup_by_name("f", name_of), Some(id(2)));
        // before everything -> first bucket
        assert_eq!(idx.lookup_by_name("0", name_of), Some(id(0)));
    }

    #[test]
    fn rebuild_tolerance_triggers_after_threshold() {
        let mut idx = ChainIndex::empty();
        let cfg = IndexConfig {
            bucket_size: 4,
            rebuild_tolerance: 2,
        };
        let chains: Vec<ChainId> = (0..4).map(id).collect();
        idx.build(&chains, &cfg);
        let grown: Vec<ChainId> = (0..7).map(id).collect();
        idx.note_insert(&grown, &cfg); // 1
        assert_eq!(idx.len(), 1);
        idx.note_insert(&grown, &cfg); // 2
        assert_eq!(idx.len(), 1);
        idx.note_insert(&grown, &cfg); // 3 > tolerance(2) -> rebuild
        assert_eq!(idx.len(), 2); // positions 0, 4 of a 7-chain list
    }
}
