//! Task control blocks and their backing stacks.
//!
//! A task's entire machine state when it is not running lives in one place:
//! the saved stack pointer, plus whatever the hardware and the `PendSV`
//! handler pushed onto the task's own stack. This mirrors the original
//! kernel's `TCB` (a bare `stack_ptr`, nothing else resembling saved
//! registers) rather than the richer per-register save areas used by
//! kernels that also carry IPC message registers -- this kernel has no IPC,
//! so there is nothing to put in those fields.

use crate::config::{MAX_TASKS, TASK_NAME_CAPACITY, TASK_STACK_SIZE};

/// Number of words in the synthetic frame [`crate::arch::init_stack`] builds
/// on top of a freshly created task's stack: 8 words the hardware pushes
/// and pops automatically on exception entry/exit (r0-r3, r12, lr, pc,
/// xpsr) plus 8 callee-saved words (r4-r11) the `PendSV` handler pushes and
/// pops by hand.
pub const FRAME_WORDS: usize = 16;

/// Builds the synthetic initial exception frame in the top
/// [`FRAME_WORDS`] words of `stack`, so the first dispatch (or any later
/// resumption) looks exactly like an ordinary return from an interrupt.
///
/// Shared between the architecture backends because the frame layout
/// itself isn't architecture-specific -- only how it's consumed
/// afterward is (a real `ldmia`/`bx` sequence on hardware, a plain field
/// read in the host simulator). `exc_return` is threaded in rather than
/// hard-coded so each backend supplies it from wherever it's allowed to
/// come from (a build-time constant on real hardware, a plain literal on
/// the host).
///
/// Returns the stack pointer the task should be resumed with: the
/// address [`FRAME_WORDS`] words below the top of `stack`.
pub(crate) fn synthetic_frame(
    stack: &mut [u32],
    entry_addr: u32,
    exc_return: u32,
) -> *mut u32 {
    let len = stack.len();
    let frame = &mut stack[len - FRAME_WORDS..];
    // frame[0..8) are r4-r11, left zeroed: a fresh task has no prior
    // register state to resume.
    frame[13] = exc_return; // LR
    frame[14] = entry_addr; // PC
    frame[15] = 0x0100_0000; // xPSR: Thumb bit set, nothing else
    frame.as_mut_ptr()
}

/// Identifies a task by its slot in the task table.
///
/// Slots are never reused or compacted (tasks are never deleted), so a
/// `TaskId` remains valid for the lifetime of the kernel once issued.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(pub(crate) u8);

impl TaskId {
    /// Returns the task's index into the task table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One task's private stack: `TASK_STACK_SIZE` words, owned entirely by the
/// task and the kernel's context-switch code. Never shared, never resized,
/// never moved after [`crate::Kernel::create`] returns.
#[repr(C, align(8))]
pub struct Stack(pub [u32; TASK_STACK_SIZE]);

impl Stack {
    pub const fn new() -> Self {
        Stack([0; TASK_STACK_SIZE])
    }
}

/// A task's control block.
///
/// `stack_ptr` is deliberately the first field: the architecture backend
/// reads and writes it by computed offset from naked assembly, and relying
/// on `repr(C)` field order keeps that offset at zero instead of buried in
/// a constant that has to be kept in sync by hand.
#[repr(C)]
pub struct Task {
    /// Saved process stack pointer. Meaningful only while the task is not
    /// the running task; while running, the live value is in the CPU's
    /// PSP register, not here.
    pub(crate) stack_ptr: *mut u32,

    /// This task's slot number, fixed at creation time.
    pub(crate) id: u8,

    /// Visible name, NUL-padded, truncated to [`TASK_NAME_CAPACITY`] bytes
    /// plus the terminator.
    name: [u8; TASK_NAME_CAPACITY + 1],

    /// Length of the name actually stored, not counting the terminator.
    name_len: u8,
}

// Safety: a `Task`'s stack pointer is only ever touched by the kernel
// itself (from kernel-mode code or the architecture's exception handlers),
// which serializes access by construction -- at most one core, one task
// runs at a time, and the handlers never re-enter.
unsafe impl Send for Task {}
unsafe impl Sync for Task {}

impl Task {
    /// Builds a not-yet-runnable task descriptor. The caller
    /// ([`crate::Kernel::create`]) is responsible for calling
    /// [`crate::arch::init_stack`] to give it an initial `stack_ptr`
    /// before it is ever selected to run.
    pub(crate) fn new(id: u8, name: &str) -> Self {
        let mut buf = [0u8; TASK_NAME_CAPACITY + 1];
        let mut len = 0usize;
        for b in name.bytes().take(TASK_NAME_CAPACITY) {
            buf[len] = b;
            len += 1;
        }
        Task {
            stack_ptr: core::ptr::null_mut(),
            id,
            name: buf,
            name_len: len as u8,
        }
    }

    /// The task's name, truncated at creation time to at most
    /// [`TASK_NAME_CAPACITY`] bytes.
    pub fn name(&self) -> &str {
        let len = self.name_len as usize;
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    pub fn id(&self) -> TaskId {
        TaskId(self.id)
    }
}

/// The fixed-capacity task table: up to [`MAX_TASKS`] tasks, each paired
/// with its own stack, with the pairing fixed for the lifetime of the
/// kernel (slot `i`'s task always runs on stack `i`).
pub struct TaskTable {
    tasks: [Option<Task>; MAX_TASKS],
    stacks: [Stack; MAX_TASKS],
    count: usize,
}

impl TaskTable {
    pub const fn new() -> Self {
        // `Option<Task>` and `Stack` are not `Copy`, so this array literal
        // has to be written out by hand; `MAX_TASKS` is small and fixed, so
        // this doesn't need to be generic over N.
        TaskTable {
            tasks: [
                None, None, None, None, None, None, None, None, None, None,
            ],
            stacks: [
                Stack::new(),
                Stack::new(),
                Stack::new(),
                Stack::new(),
                Stack::new(),
                Stack::new(),
                Stack::new(),
                Stack::new(),
                Stack::new(),
                Stack::new(),
            ],
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == MAX_TASKS
    }

    pub fn get(&self, index: usize) -> &Task {
        self.tasks[index].as_ref().expect("task slot not yet populated")
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Task {
        self.tasks[index].as_mut().expect("task slot not yet populated")
    }

    pub fn stack_mut(&mut self, index: usize) -> &mut Stack {
        &mut self.stacks[index]
    }

    /// Inserts a new task at the next free slot, returning its id, or
    /// `None` if the table is already full.
    pub fn insert(&mut self, name: &str) -> Option<TaskId> {
        if self.is_full() {
            return None;
        }
        let index = self.count;
        self.tasks[index] = Some(Task::new(index as u8, name));
        self.count += 1;
        Some(TaskId(index as u8))
    }
}
