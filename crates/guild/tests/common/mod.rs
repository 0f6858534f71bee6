//! Shared test utilities for guild integration tests.
//!
//! This module provides:
//! - `TestHarness`, a dispatcher wired to a temporary SQLite store
//! - Scripted collaborators and builders for stage sets and configs

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
