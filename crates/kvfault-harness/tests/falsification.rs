//! Falsification tests for kvfault
//!
//! Each test in this module attempts to refute a specific claim about the
//! failover harness. A passing test means the claim survived the attempt.

mod falsification_tests;
