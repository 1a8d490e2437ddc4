//! Chain Index tuning knobs: bucket size `K` and the insert-tolerance
//! before a rebuild, exposed as a small config struct rather than
//! hard-coded so the bench crate can sweep them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    /// Number of user-defined chains indexed per bucket (`K`).
    pub bucket_size: usize,
    /// Inserts tolerated since the last `build`/`rebuild` before the
    /// index is rebuilt unconditionally.
    pub rebuild_tolerance: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            bucket_size: 40,
            rebuild_tolerance: 355,
        }
    }
}
