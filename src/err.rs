//! Common error-handling support.
//!
//! Mirrors the shape of the kernel's original error module: small, `Copy`
//! error enums returned through `Result`, reserved for conditions a caller
//! can recover from locally. Everything else in the kernel's error
//! taxonomy -- creating a task after launch, launching twice, a processor
//! fault, watchdog expiry -- is a documented precondition or an external
//! event, not a `Result`; see §7 of the design notes.

/// Failure returned by [`crate::Kernel::create`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CreateError {
    /// The task table is full (`task_count == MAX_TASKS`). The table is
    /// left unchanged; the caller may retry after freeing a slot in a
    /// future kernel that supports it, though this kernel never does
    /// (tasks are never deleted).
    CapacityExhausted,
}
