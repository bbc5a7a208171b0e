//! Worker pool sizing.

use std::num::NonZeroUsize;

/// Number of worker loops for a host with `available_parallelism` cores.
///
/// One core is left for the rest of the process, but there is always at
/// least one loop.
pub fn pool_size(available_parallelism: usize) -> usize {
    available_parallelism.saturating_sub(1).max(1)
}

/// [`pool_size`] for the current machine.
pub fn default_pool_size() -> usize {
    let available = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    pool_size(available)
}
