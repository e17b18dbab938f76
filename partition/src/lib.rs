//! Deterministic, cross-process key partitioning.
//!
//! Every mapper and reducer in a run must agree on `P = hash(term) mod
//! N_PART` (spec §3/§4.4), so the hasher is seeded with a fixed key rather
//! than `std::collections::hash_map::RandomState`'s per-process random seed.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

use std::hash::{Hash, Hasher};

use siphasher::sip::SipHasher13;

/// Fixed SipHash key. Any value works as long as every worker process in a
/// run compiles against the same one.
const HASH_KEY: (u64, u64) = (0x5eed_f00d_dead_beef, 0xc0ffee00_1337_babe);

/// The repository-wide default partition count (spec §6).
pub const DEFAULT_N_PART: u32 = 16;

/// Compute `hash(key) mod n_part` using a fixed-key SipHash-1-3.
///
/// # Panics
/// Panics if `n_part == 0`.
pub fn partition_of(key: &str, n_part: u32) -> u32 {
    assert!(n_part > 0, "n_part must be positive");
    let mut hasher = SipHasher13::new_with_keys(HASH_KEY.0, HASH_KEY.1);
    key.hash(&mut hasher);
    (hasher.finish() % u64::from(n_part)) as u32
}
