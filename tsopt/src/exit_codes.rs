//! Stable exit codes for tsopt CLI commands.

/// A job script was written and the scheduler accepted it.
pub const OK: i32 = 0;
/// Command failed due to invalid config/reaction input or other errors.
pub const INVALID: i32 = 1;
/// The step moved past `max_step`; nothing is left to run.
pub const DONE: i32 = 2;
/// The job for the current step is still in flight, or its submission was
/// deferred and the same step must be retried.
pub const PENDING: i32 = 3;
