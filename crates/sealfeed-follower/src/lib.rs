//! # Sealfeed Follower
//!
//! Follower-side key state for encrypted feeds: applying grants, replaying
//! rekey events in epoch order, and deriving per-epoch content keys to
//! decrypt posts. One [`FollowerKeyStore`] per followed feed.

pub mod cache;
pub mod error;
pub mod store;

pub use cache::{CekCache, DEFAULT_CACHE_CAPACITY};
pub use error::{FollowerError, Result};
pub use store::FollowerKeyStore;
