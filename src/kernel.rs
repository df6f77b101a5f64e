//! The kernel proper: task table ownership, task creation, and the
//! launch / yield entry points tying the scheduler to the hardware.

use crate::arch;
use crate::err::CreateError;
use crate::sched;
use crate::task::{TaskId, TaskTable};
use core::sync::atomic::{AtomicUsize, Ordering};

/// Abstraction over the periodic system tick timer driving preemption.
pub trait SystemTimer {
    /// Configures the timer to raise an interrupt every `reload` core
    /// clock cycles, counting down from `reload`, and starts it.
    fn start(&mut self, reload: u32);
}

/// Abstraction over the pendable service call used to request a
/// context switch from ordinary (non-fault, non-reset) code.
pub trait PendableService {
    /// Marks a context switch as pending. Takes effect once the
    /// currently running exception handler, if any, returns, at the
    /// lowest interrupt priority in the system (see the design notes on
    /// priority configuration).
    fn pend(&mut self);
}

/// Index of the task currently selected to run, and the number of tasks
/// created so far. These live at file scope rather than inside [`Kernel`]
/// because the architecture's `PendSV` and `SVCall` handlers are bare
/// functions invoked directly by the processor, with no `Kernel` value to
/// call methods on -- they read and write these statics the same way the
/// reference kernel's handlers reach a file-scope "current task" pointer.
pub(crate) static CURRENT_TASK: AtomicUsize = AtomicUsize::new(0);
pub(crate) static TASK_COUNT: AtomicUsize = AtomicUsize::new(0);

/// The task table, for the same reason kept outside `Kernel`:
/// [`crate::arch::init_stack`] and the context-switch handlers reach
/// individual tasks' `stack_ptr` fields directly, without a `Kernel`
/// reference in hand.
///
/// # Safety
/// Mutated only before [`Kernel::launch`] (by [`Kernel::create`], which
/// takes `&mut Kernel` and thus cannot race another `create`) and by the
/// architecture's exception handlers afterward, which never preempt each
/// other or run concurrently with kernel setup code.
pub(crate) static mut TASK_TABLE: TaskTable = TaskTable::new();

/// The kernel itself: the task table plus the two peripherals it needs to
/// drive scheduling, the system tick timer and the pendable service call.
pub struct Kernel<T: SystemTimer, P: PendableService> {
    timer: T,
    pendsv: P,
    launched: bool,
}

impl<T: SystemTimer, P: PendableService> Kernel<T, P> {
    /// Binds a kernel to the given timer and pendable-service peripherals,
    /// with the task table and current-task index reset to empty. Must be
    /// called before any task is created. Call [`Kernel::create`] to
    /// populate tasks and [`Kernel::launch`] to start running them.
    pub fn init(timer: T, pendsv: P) -> Self {
        CURRENT_TASK.store(0, Ordering::Relaxed);
        TASK_COUNT.store(0, Ordering::Relaxed);
        Kernel {
            timer,
            pendsv,
            launched: false,
        }
    }

    /// Runs the arming sequence (unlock, prescaler, reload, start) on a
    /// hardware watchdog.
    ///
    /// # Precondition
    /// Must be called after the system-monitor task has been created
    /// ([`watchdog::MonitorTask`]) and before [`Kernel::launch`], so the
    /// monitor gets its first scheduling turn before the watchdog's
    /// reload period can elapse. Not enforced by this method; getting the
    /// order wrong resets the system on the next watchdog expiry, same as
    /// on real hardware.
    ///
    /// [`watchdog::MonitorTask`]: crate::watchdog::MonitorTask
    pub fn arm_watchdog<W: crate::watchdog::HardwareWatchdog>(
        &self,
        watchdog: &mut W,
        prescaler: u32,
        reload: u32,
    ) {
        assert!(!self.launched, "arm the watchdog before launch");
        watchdog.unlock();
        watchdog.set_prescaler(prescaler);
        watchdog.set_reload(reload);
        watchdog.start();
    }

    /// Creates a new task with the given entry point and name.
    ///
    /// `priority` is accepted and stored nowhere: this scheduler is a
    /// plain round-robin ring and does not use it (see Non-goals). It
    /// stays in the signature so code ported from a priority-aware
    /// kernel doesn't need its call sites rewritten.
    ///
    /// # Panics
    /// Panics if called after [`Kernel::launch`]; the task table is only
    /// ever populated before the kernel starts running tasks.
    pub fn create(
        &mut self,
        entry: extern "C" fn() -> !,
        name: &str,
        _priority: u8,
    ) -> Result<TaskId, CreateError> {
        assert!(!self.launched, "cannot create a task after launch");
        // Safety: single-threaded, pre-launch; no ISR or other task runs
        // concurrently with kernel setup code at this point.
        let table = unsafe { &mut TASK_TABLE };
        let id = table.insert(name).ok_or(CreateError::CapacityExhausted)?;
        let index = id.index();
        let stack = table.stack_mut(index);
        let stack_ptr = arch::init_stack(&mut stack.0, entry);
        table.get_mut(index).stack_ptr = stack_ptr;
        TASK_COUNT.store(index + 1, Ordering::Relaxed);
        arch::on_task_created(index, entry);
        klog!("created task '{}' in slot {}", name, index);
        Ok(id)
    }

    /// Arms the pendable-service handler, starts the system tick timer,
    /// and switches into the first created task. Never returns: once
    /// control passes to user tasks, it only comes back to kernel code
    /// through an interrupt or exception handler.
    ///
    /// # Panics
    /// Panics if no task has been created yet.
    pub fn launch(mut self, tick_reload: u32) -> ! {
        let task_count = TASK_COUNT.load(Ordering::Relaxed);
        assert!(task_count > 0, "launch() called with no tasks created");

        // Land on task 0 by asking the ordinary scheduler to select the
        // task after the last one -- the same trick the kernel this is
        // modeled on uses to share one code path between first launch and
        // steady-state switches, rather than special-casing the first
        // dispatch.
        let first = sched::select(task_count - 1, task_count);
        CURRENT_TASK.store(first, Ordering::Relaxed);

        self.timer.start(tick_reload);
        self.launched = true;
        klog!("launching task {}", first);
        // The first dispatch goes through the supervisor call, not the
        // pendable service call: there is no "previous task" context to
        // save yet, so this is a distinct code path from an ordinary
        // switch (see `arch::start_first_task`'s doc comment). `self.pendsv`
        // is only ever exercised afterward, by `yield_now`.
        arch::start_first_task()
    }
}

/// Computes the system tick's reload value for a given bus frequency and
/// scheduling quantum, using the same formula the original kernel's
/// `os_launch` uses: `(bus_frequency_hz / 1000) * quantum_ms - 1`, the
/// down-counter value that makes the tick fire once every `quantum_ms`
/// milliseconds.
///
/// Bus frequency is a board bring-up concern (clock tree configuration is
/// out of scope for this crate, see the module docs), so this is a plain
/// function rather than something [`Kernel::launch`] computes itself --
/// the caller passes in its board's bus frequency and feeds the result to
/// [`Kernel::launch`] as `tick_reload`.
///
/// # Panics
/// Per the design notes' open question, the original does not clamp: for
/// a `quantum_ms` large enough that the product doesn't fit the system
/// tick's 24-bit reload register, or with `quantum_ms == 0`, this is
/// undefined behavior in the original and a debug-mode overflow panic
/// here, left unclamped deliberately rather than silently wrapping.
pub fn tick_reload(bus_frequency_hz: u32, quantum_ms: u32) -> u32 {
    (bus_frequency_hz / 1000) * quantum_ms - 1
}

/// Requests a voluntary context switch, yielding the remainder of this
/// task's time slice to the next task in the ring.
///
/// Returns once this task is selected to run again. Safe to call from any
/// task context. Calling it before [`Kernel::launch`] or from within an
/// interrupt handler is a precondition violation this kernel does not
/// check for.
pub fn yield_now() {
    arch::request_switch();
}

#[cfg(test)]
mod tests {
    use super::tick_reload;

    #[test]
    fn matches_the_original_formula() {
        // 168 MHz bus, 1ms quantum: a common STM32F407 configuration.
        assert_eq!(tick_reload(168_000_000, 1), 167_999);
    }

    #[test]
    fn ten_ms_quantum() {
        assert_eq!(tick_reload(168_000_000, 10), 1_679_999);
    }

    #[test]
    #[should_panic]
    fn zero_quantum_is_unclamped_and_panics() {
        tick_reload(168_000_000, 0);
    }
}
