//! # Sealfeed Engine
//!
//! Owner-side key management: the binary LKH key tree over follower leaf
//! slots, the Grant and Revoke protocols, and the [`FeedKeyEngine`] that
//! ties them to the epoch CEK chain.
//!
//! All operations are synchronous and in-memory. The engine produces
//! records (via `sealfeed-core`) for the caller to publish; it never
//! touches a ledger itself.

pub mod engine;
pub mod error;
pub mod grant;
pub mod revoke;
pub mod tree;

pub use engine::FeedKeyEngine;
pub use error::{EngineError, Result};
pub use grant::GrantBuilder;
pub use revoke::RevocationEngine;
pub use tree::{KeyTree, MAX_TREE_CAPACITY};
