use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Stable hash of a string, used to derive per-stream seed offsets from rng
/// stream names. `FxHasher` is deterministic across processes and platforms,
/// unlike `std`'s `RandomState`.
pub(crate) fn hash_str(data: &str) -> u64 {
    let mut hasher = FxHasher::default();
    data.hash(&mut hasher);
    hasher.finish()
}
