//! Falsification tests for kvfault
//!
//! Each test in this module attempts to refute a specific claim about the
//! failover harness. A passing test means the claim survived the attempt.

// Allow test-specific patterns that are denied in production code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod doubles;
mod load;
mod orchestration;
mod verification;
