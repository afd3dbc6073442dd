//! # Sealfeed Testkit
//!
//! Testing utilities for Sealfeed.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: pinned hash-chain and KDF outputs so independent
//!   implementations derive identical content keys
//! - **Generators**: proptest strategies for property-based testing
//! - **Fixtures**: a feed with its engine plus follower handles for
//!   multi-party scenarios
//!
//! ## Fixtures
//!
//! ```rust
//! use sealfeed_testkit::fixtures::FeedFixture;
//!
//! let mut feed = FeedFixture::new();
//! let mut bob = feed.follower();
//! feed.join(&mut bob);
//!
//! let post = feed.post("hello");
//! assert_eq!(bob.read(&post).unwrap(), b"hello");
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{FeedFixture, FollowerHandle, FIXTURE_CAPACITY, FIXTURE_MAX_EPOCH};
pub use vectors::{chain_vectors, verify_chain_vectors, ChainVector};

/// Install a logging subscriber for test runs. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
