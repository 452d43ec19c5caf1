//! The choice of hash function used for the pretoken, pair and reverse-index tables has a big
//! impact on training time, since the merge loop does nothing but hash lookups on small keys.
//!
//! This is isolated to this module to make it easier to experiment with different impls.
//! Nothing in the trainer may depend on the iteration order of these maps.

pub use rustc_hash::FxHashMap as HashMap;
pub use rustc_hash::FxHashSet as HashSet;
