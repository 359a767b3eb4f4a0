//! Transition-state search step orchestration.
//!
//! A reaction instance moves through a constrained optimization procedure one
//! step at a time: each call polls the previous job, asks the constraint
//! solver what to do next, adjusts the geometry, writes a job script and
//! submits it. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (step transitions, constraint
//!   normalization, argument construction, value serialization).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (scheduler submission, result
//!   files, templates, geometry log, config). Behind traits where the
//!   advancer consumes them, so tests can substitute scripted doubles.
//!
//! Orchestration modules ([`advance`], [`drive`]) coordinate core logic with
//! I/O to implement CLI commands.

pub mod advance;
pub mod core;
pub mod drive;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
