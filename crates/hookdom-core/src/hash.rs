//! Build hasher used by every keyed container in the engine.
//!
//! `ahash` is the default; the `std-hash` feature falls back to SipHash for
//! hosts that need a DoS-resistant hasher or cannot pull in `ahash`.

#[cfg(feature = "std-hash")]
pub type BuildHasher = std::collections::hash_map::RandomState;

#[cfg(not(feature = "std-hash"))]
pub type BuildHasher = ahash::RandomState;
