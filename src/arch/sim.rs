//! Host simulator backend.
//!
//! Models the pieces of the hardware the dispatcher depends on -- the
//! pendable-service pend bit, the supervisor call, and the process stack
//! pointer -- in safe Rust, over real OS threads instead of a single real
//! processor. One thread stands in for one task's "private stack"; a
//! `Gate` (a mutex-and-condvar pair) stands in for the pend bit plus the
//! dispatcher's choice of which stack to resume, guaranteeing that at
//! most one task thread is ever unblocked at a time -- the same
//! single-hardware-thread, no-parallelism property the real kernel gets
//! from having only one processor.
//!
//! The one property this can't reproduce faithfully is true preemption:
//! real hardware can interrupt a spinning, non-yielding task mid
//! instruction, but there is no safe, portable way to suspend another OS
//! thread from here. A task that never yields and never calls
//! [`fire_tick`]-aware code simply keeps running on its own OS thread
//! even after the simulated tick has moved `current` elsewhere. Tests
//! that exercise tick-driven preemption (the scheduler never calls back
//! into a task the way a real interrupt would) account for this; see the
//! `tests/` directory.
//!
//! Because the task table, the current-task index, and the gate are all
//! process-wide (mirroring the microcontroller's single, global kernel
//! state), tests that use this backend call [`reset_for_test`] first,
//! which also serializes them against each other.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::thread;

use crate::kernel::{CURRENT_TASK, TASK_COUNT, TASK_TABLE};
use crate::sched;
use crate::task::{synthetic_frame, TaskTable};
use crate::watchdog::HardwareWatchdog;

/// Same EXC_RETURN value the real backend bakes in at build time (no FPU,
/// thread mode, PSP); hard-coded here since there's no build script step
/// for the host target.
const EXC_RETURN_CONST: u32 = 0xFFFF_FFFD;

/// Builds the same synthetic frame the real backend does, so the stack
/// frame shape property is testable without a processor.
pub fn init_stack(stack: &mut [u32], entry: extern "C" fn() -> !) -> *mut u32 {
    synthetic_frame(stack, entry as usize as u32, EXC_RETURN_CONST)
}

struct Gate {
    current: Mutex<usize>,
    cv: Condvar,
}

impl Gate {
    const fn new() -> Self {
        Gate {
            current: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    fn wait_for_turn(&self, me: usize) {
        let mut cur = self.current.lock().unwrap_or_else(|e| e.into_inner());
        while *cur != me {
            cur = self.cv.wait(cur).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Advances `current` by one scheduling step and wakes every parked
    /// task thread to re-check whether it's now their turn.
    fn advance(&self) {
        let task_count = TASK_COUNT.load(Ordering::Relaxed);
        let mut cur = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *cur = sched::select(*cur, task_count);
        CURRENT_TASK.store(*cur, Ordering::Relaxed);
        self.cv.notify_all();
    }

    fn set(&self, value: usize) {
        let mut cur = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *cur = value;
        self.cv.notify_all();
    }
}

// Held behind an `Arc` rather than one plain `'static` value: each
// `reset_for_test` call installs a brand new `Gate`, so task threads left
// over from a previous test (if any ever failed to reach their final
// `wait_for_turn` before the test moved on) keep waiting on a `Gate`
// nobody advances anymore, instead of waking up inside a later,
// unrelated test when its `current` happens to cycle back to the same
// index.
static GATE: OnceLock<Mutex<Arc<Gate>>> = OnceLock::new();

fn gate_slot() -> &'static Mutex<Arc<Gate>> {
    GATE.get_or_init(|| Mutex::new(Arc::new(Gate::new())))
}

fn gate() -> Arc<Gate> {
    gate_slot().lock().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Spawns the OS thread standing in for this task's private stack,
/// parked until the dispatcher selects it for the first time.
///
/// Real hardware does nothing analogous at creation time -- a task's
/// stack just sits there until the dispatcher restores it -- but the
/// simulator has to have *something* ready to run `entry` the first time
/// `current` reaches this slot, and an OS thread parked on the gate is
/// the closest safe-Rust equivalent.
pub fn on_task_created(index: usize, entry: extern "C" fn() -> !) {
    let gate = gate();
    thread::Builder::new()
        .name(std::format!("sim-task-{}", index))
        .spawn(move || {
            gate.wait_for_turn(index);
            entry();
        })
        .expect("failed to spawn simulated task thread");
}

/// Parks the calling (kernel) thread forever after handing off to the
/// first task, matching the real dispatcher's contract that `launch`
/// never returns.
pub fn start_first_task() -> ! {
    let first = CURRENT_TASK.load(Ordering::Relaxed);
    gate().set(first);
    loop {
        thread::park();
    }
}

/// Voluntary or simulated-tick-driven context switch: advances the
/// scheduler by one step, then blocks the calling task's thread until
/// the dispatcher selects it again.
pub fn request_switch() {
    let me = CURRENT_TASK.load(Ordering::Relaxed);
    let gate = gate();
    gate.advance();
    gate.wait_for_turn(me);
}

/// Test control hook standing in for a system tick interrupt: advances
/// the scheduler exactly the way [`request_switch`] does, but does not
/// block the calling thread (a tick fires from the timer, not from the
/// task being preempted).
pub fn fire_tick() {
    gate().advance();
}

/// The task currently selected to run, for test assertions.
pub fn current_task() -> usize {
    CURRENT_TASK.load(Ordering::Relaxed)
}

static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Resets all kernel-global state (task table, current-task index, the
/// dispatch gate) to freshly initialized, and returns a guard that
/// serializes simulator-backed tests against each other.
///
/// Necessary because the task table and current-task index are
/// process-wide statics -- standing in for the single microcontroller
/// the real kernel assumes -- so two tests running concurrently would
/// otherwise corrupt each other's kernel state.
pub fn reset_for_test() -> MutexGuard<'static, ()> {
    let guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    CURRENT_TASK.store(0, Ordering::Relaxed);
    TASK_COUNT.store(0, Ordering::Relaxed);
    // Safety: serialized by `guard`; no task thread from a previous test
    // still touches the table once that test's assertions have returned.
    unsafe {
        TASK_TABLE = TaskTable::new();
    }
    // Install a fresh gate so any zombie threads left over from a prior
    // test (one that didn't park all its tasks before returning) are
    // talking to an abandoned `Gate` that nothing advances anymore,
    // rather than this test's.
    *gate_slot().lock().unwrap_or_else(|e| e.into_inner()) = Arc::new(Gate::new());
    guard
}

/// Host stand-in for [`crate::SystemTimer`]: configuring it does nothing,
/// since simulated time is driven explicitly by test code calling
/// [`fire_tick`] rather than by a real counter.
pub struct SimTimer;

impl crate::kernel::SystemTimer for SimTimer {
    fn start(&mut self, _reload: u32) {}
}

/// Host stand-in for [`crate::PendableService`]: pending a switch on the
/// simulator just runs the switch immediately, since there's no
/// interrupt tail to wait for.
pub struct SimPendSv;

impl crate::kernel::PendableService for SimPendSv {
    fn pend(&mut self) {
        request_switch();
    }
}

/// In-memory [`HardwareWatchdog`] for exercising the arming sequence and
/// the monitor task's feed cadence without real IWDG hardware.
#[derive(Default)]
pub struct SimWatchdog {
    unlocked: bool,
    prescaler: u32,
    reload: u32,
    started: bool,
    feed_count: u32,
}

impl SimWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_count(&self) -> u32 {
        self.feed_count
    }

    pub fn is_armed(&self) -> bool {
        self.unlocked && self.started
    }
}

impl HardwareWatchdog for SimWatchdog {
    fn unlock(&mut self) {
        self.unlocked = true;
    }

    fn set_prescaler(&mut self, value: u32) {
        self.prescaler = value;
    }

    fn set_reload(&mut self, value: u32) {
        self.reload = value;
    }

    fn start(&mut self) {
        self.started = true;
    }

    fn feed(&mut self) {
        self.feed_count += 1;
    }
}
