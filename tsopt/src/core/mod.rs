//! Deterministic, pure logic for step advancement.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod arguments;
pub mod constraints;
pub mod geometry;
pub mod pyrepr;
pub mod reaction;
pub mod state;
pub mod types;
