//! Compile-time kernel configuration.
//!
//! These are `const`s rather than Cargo features or a config file because
//! they size fixed-capacity arrays the linker lays out once, for good: the
//! task table and its backing stacks. Changing them means relinking, not
//! reconfiguring a running system (§3: stacks are never relocated or
//! resized).

/// Capacity of the task table. `os_task_create`-equivalent calls beyond
/// this many fail with [`crate::CreateError::CapacityExhausted`].
pub const MAX_TASKS: usize = 10;

/// Size of each task's private stack, in 32-bit words. Must be large
/// enough to hold the deepest expected call graph plus one synthetic
/// exception frame (16 words, see [`crate::task::FRAME_WORDS`]).
pub const TASK_STACK_SIZE: usize = 1024;

/// Maximum number of visible characters in a task name, not counting the
/// null terminator (§3: "at most 15 visible characters").
pub const TASK_NAME_CAPACITY: usize = 15;
