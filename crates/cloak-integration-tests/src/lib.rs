//! Integration test crate for the Cloak payment core.
//!
//! This crate has no library code. It only contains integration tests
//! that drive the sender and receiver flows across the workspace crates
//! against the in-memory ledger.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p cloak-integration-tests
//! ```
