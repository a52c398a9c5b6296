#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use hashbrown::{HashMap, HashSet};
}

/// Insertion-ordered containers share the build hasher selected in [`crate::hash`].
pub mod ordered {
    pub type IndexMap<K, V> = indexmap::IndexMap<K, V, crate::hash::BuildHasher>;
    pub type IndexSet<T> = indexmap::IndexSet<T, crate::hash::BuildHasher>;
}
