//! Task selection.
//!
//! The original kernel's scheduler (and this one's) does not look at
//! priority at all: every task gets an equal turn, in creation order, and
//! the ring wraps. This replaces the teacher kernel's priority-aware scan,
//! which has no counterpart here -- see the Non-goals.

/// Returns the index of the task that should run after `current`, out of
/// `task_count` tasks arranged in a ring.
///
/// `task_count` must be at least 1; the kernel never calls this before at
/// least one task has been created.
pub fn select(current: usize, task_count: usize) -> usize {
    debug_assert!(task_count > 0, "select() called with an empty task table");
    (current + 1) % task_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_by_one() {
        assert_eq!(select(0, 3), 1);
        assert_eq!(select(1, 3), 2);
    }

    #[test]
    fn wraps_around() {
        assert_eq!(select(2, 3), 0);
    }

    #[test]
    fn single_task_selects_itself() {
        assert_eq!(select(0, 1), 0);
    }
}
