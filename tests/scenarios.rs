//! Integration tests against the host simulator backend, covering the
//! scenarios and quantified invariants from the kernel's design notes.
//!
//! Each test calls [`arch::reset_for_test`] first: the task table,
//! current-task index, and dispatch gate are process-wide, standing in
//! for the single microcontroller the kernel assumes, so the guard it
//! returns also serializes these tests against each other.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use swarm_os::arch;
use swarm_os::{CreateError, Kernel};

/// Polls `condition` until it's true or the budget of retries is spent.
/// Used instead of a fixed sleep so these tests run fast when the
/// dispatcher is prompt and only burn the full timeout when something is
/// actually stuck.
fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..2000 {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

mod round_robin {
    use super::*;

    static LOG: Mutex<String> = Mutex::new(String::new());

    extern "C" fn task_a() -> ! {
        loop {
            LOG.lock().unwrap().push('A');
            swarm_os::yield_now();
        }
    }
    extern "C" fn task_b() -> ! {
        loop {
            LOG.lock().unwrap().push('B');
            swarm_os::yield_now();
        }
    }
    extern "C" fn task_c() -> ! {
        loop {
            LOG.lock().unwrap().push('C');
            swarm_os::yield_now();
        }
    }

    /// Scenario A: three tasks that each log their label and yield
    /// forever produce "ABCABCABC..." in creation order.
    #[test]
    fn three_task_round_robin() {
        let _guard = arch::reset_for_test();
        LOG.lock().unwrap().clear();

        let mut kernel = Kernel::init(arch::SimTimer, arch::SimPendSv);
        kernel.create(task_a, "a", 0).unwrap();
        kernel.create(task_b, "b", 0).unwrap();
        kernel.create(task_c, "c", 0).unwrap();
        thread::spawn(move || kernel.launch(0));

        assert!(wait_until(|| LOG.lock().unwrap().len() >= 9));
        assert_eq!(&LOG.lock().unwrap()[..9], "ABCABCABC");
    }

    /// Invariant 7: with exactly one task, every switch re-selects it.
    #[test]
    fn single_task_is_invariant_under_switching() {
        let _guard = arch::reset_for_test();
        LOG.lock().unwrap().clear();

        let mut kernel = Kernel::init(arch::SimTimer, arch::SimPendSv);
        kernel.create(task_a, "solo", 0).unwrap();
        thread::spawn(move || kernel.launch(0));

        assert!(wait_until(|| LOG.lock().unwrap().len() >= 20));
        assert!(LOG.lock().unwrap().chars().all(|c| c == 'A'));
        assert_eq!(arch::current_task(), 0);
    }
}

mod tick_preemption {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    static SAW_SPIN: AtomicBool = AtomicBool::new(false);
    static SAW_MONITOR: AtomicBool = AtomicBool::new(false);

    extern "C" fn spinner() -> ! {
        loop {
            SAW_SPIN.store(true, Ordering::Relaxed);
        }
    }

    extern "C" fn monitor() -> ! {
        loop {
            SAW_MONITOR.store(true, Ordering::Relaxed);
            swarm_os::yield_now();
        }
    }

    /// Scenario B: a task that spins without yielding and a monitor task
    /// that yields every time both get to run once the tick starts
    /// firing -- neither is starved over the run.
    #[test]
    fn tick_reaches_both_tasks() {
        let _guard = arch::reset_for_test();
        SAW_SPIN.store(false, Ordering::Relaxed);
        SAW_MONITOR.store(false, Ordering::Relaxed);

        let mut kernel = Kernel::init(arch::SimTimer, arch::SimPendSv);
        kernel.create(spinner, "spin", 0).unwrap();
        kernel.create(monitor, "mon", 0).unwrap();
        thread::spawn(move || kernel.launch(0));

        // Simulate a 10ms quantum for 100ms of wall time: ten ticks.
        for _ in 0..10 {
            arch::fire_tick();
            thread::sleep(Duration::from_millis(2));
        }

        assert!(SAW_SPIN.load(Ordering::Relaxed));
        assert!(SAW_MONITOR.load(Ordering::Relaxed));
    }
}

mod capacity {
    use super::*;

    extern "C" fn idle() -> ! {
        loop {
            swarm_os::yield_now();
        }
    }

    /// Scenario C / invariant 4: after `MAX_TASKS` successful creates,
    /// the next one fails and leaves the table unchanged.
    #[test]
    fn capacity_rejection() {
        let _guard = arch::reset_for_test();

        let mut kernel = Kernel::init(arch::SimTimer, arch::SimPendSv);
        for i in 0..swarm_os::config::MAX_TASKS {
            kernel
                .create(idle, &std::format!("t{}", i), 0)
                .expect("table should not be full yet");
        }

        assert_eq!(
            kernel.create(idle, "overflow", 0),
            Err(CreateError::CapacityExhausted)
        );
    }
}

mod stack_isolation {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TASK0_OK: AtomicU32 = AtomicU32::new(0);
    static TASK1_OK: AtomicU32 = AtomicU32::new(0);

    extern "C" fn checker0() -> ! {
        let mut local = 0u32;
        loop {
            local = 0;
            swarm_os::yield_now();
            local += 1;
            if local == 1 {
                TASK0_OK.fetch_add(1, Ordering::Relaxed);
            }
            swarm_os::yield_now();
        }
    }

    extern "C" fn checker1() -> ! {
        let mut local = 0u32;
        loop {
            local = 1_000_000;
            swarm_os::yield_now();
            local += 1;
            if local == 1_000_001 {
                TASK1_OK.fetch_add(1, Ordering::Relaxed);
            }
            swarm_os::yield_now();
        }
    }

    /// Scenario D: two tasks that each write a private identifier to a
    /// local, yield, then re-read it, always read back their own value
    /// -- a stand-in for the "write to the first word of the local
    /// variable region" wording, expressed over an ordinary stack local
    /// instead of raw memory, since each task genuinely runs on its own
    /// OS thread's own call stack here.
    #[test]
    fn stacks_do_not_bleed_into_each_other() {
        let _guard = arch::reset_for_test();
        TASK0_OK.store(0, Ordering::Relaxed);
        TASK1_OK.store(0, Ordering::Relaxed);

        let mut kernel = Kernel::init(arch::SimTimer, arch::SimPendSv);
        kernel.create(checker0, "t0", 0).unwrap();
        kernel.create(checker1, "t1", 0).unwrap();
        thread::spawn(move || kernel.launch(0));

        assert!(wait_until(|| TASK0_OK.load(Ordering::Relaxed) >= 1000
            && TASK1_OK.load(Ordering::Relaxed) >= 1000));
    }
}

mod watchdog_liveness {
    use super::*;
    use swarm_os::watchdog::MonitorTask;

    extern "C" fn monitor() -> ! {
        let mut watchdog = arch::SimWatchdog::new();
        MonitorTask::body(&mut watchdog, swarm_os::yield_now)
    }

    extern "C" fn worker() -> ! {
        loop {
            swarm_os::yield_now();
        }
    }

    /// Scenario E: the monitor task, scheduled within one round-robin
    /// cycle of every other task's yield, keeps feeding the watchdog.
    /// This exercises the arming sequence and the feed cadence, not the
    /// dedicated `arch::arm_watchdog`-fed instance (the monitor task
    /// constructs and feeds its own, as on real hardware, where the same
    /// peripheral handle is owned solely by that task).
    #[test]
    fn monitor_feeds_watchdog_every_cycle() {
        let _guard = arch::reset_for_test();

        let mut kernel = Kernel::init(arch::SimTimer, arch::SimPendSv);
        kernel.create(worker, "worker", 0).unwrap();
        kernel.create(monitor, "monitor", 0).unwrap();
        thread::spawn(move || kernel.launch(0));

        // Ten full round-robin cycles, two tasks each: just confirm the
        // scheduler keeps reaching task 1 (the monitor) repeatedly by
        // watching `current_task` cycle, which it can only do if the
        // monitor keeps yielding, which it can only do if its feed loop
        // keeps running.
        let mut saw_monitor_turn = 0;
        for _ in 0..2000 {
            if arch::current_task() == 1 {
                saw_monitor_turn += 1;
                if saw_monitor_turn >= 10 {
                    break;
                }
            }
            thread::sleep(Duration::from_micros(200));
        }
        assert!(saw_monitor_turn >= 10);
    }
}

mod double_switch {
    use super::*;

    extern "C" fn idle() -> ! {
        loop {
            swarm_os::yield_now();
        }
    }

    /// Invariant 5: two context switches back-to-back (here, a tick
    /// pending immediately after a yield, with nothing of the current
    /// task in between) advance the current-task pointer by exactly two
    /// positions, not one -- the dispatcher's critical section must treat
    /// them as two independent steps rather than collapsing or
    /// corrupting either.
    #[test]
    fn two_switches_advance_two_positions() {
        let _guard = arch::reset_for_test();

        let mut kernel = Kernel::init(arch::SimTimer, arch::SimPendSv);
        kernel.create(idle, "a", 0).unwrap();
        kernel.create(idle, "b", 0).unwrap();
        kernel.create(idle, "c", 0).unwrap();
        thread::spawn(move || kernel.launch(0));

        assert!(wait_until(|| arch::current_task() == 0));
        let start = arch::current_task();

        // A tick pending the dispatcher twice in a row, with no task
        // instructions executed in between, is exactly "two switches
        // back-to-back" from the scheduler's point of view.
        arch::fire_tick();
        arch::fire_tick();

        assert_eq!(arch::current_task(), (start + 2) % 3);
    }
}

mod min_quantum {
    use super::*;

    extern "C" fn idle() -> ! {
        loop {
            swarm_os::yield_now();
        }
    }

    /// Invariant 8: with the tick reload set to its minimum representable
    /// value, the scheduler still makes forward progress -- no missed
    /// pends even when ticks arrive back-to-back as fast as possible.
    #[test]
    fn minimum_reload_still_advances() {
        let _guard = arch::reset_for_test();

        let mut kernel = Kernel::init(arch::SimTimer, arch::SimPendSv);
        kernel.create(idle, "a", 0).unwrap();
        kernel.create(idle, "b", 0).unwrap();
        thread::spawn(move || kernel.launch(0));

        assert!(wait_until(|| arch::current_task() < 2));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..20 {
            seen.insert(arch::current_task());
            arch::fire_tick();
        }
        assert_eq!(seen.len(), 2, "both tasks must have had a turn");
    }
}

mod launch_never_returns {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    static REACHED_AFTER_LAUNCH: AtomicBool = AtomicBool::new(false);

    extern "C" fn idle() -> ! {
        loop {
            swarm_os::yield_now();
        }
    }

    /// Scenario F: even with a single task (so the scheduler never
    /// visibly does anything but re-select it), the code textually after
    /// the `launch` call is never reached.
    #[test]
    fn launch_does_not_return_even_with_one_task() {
        let _guard = arch::reset_for_test();
        REACHED_AFTER_LAUNCH.store(false, Ordering::Relaxed);

        let mut kernel = Kernel::init(arch::SimTimer, arch::SimPendSv);
        kernel.create(idle, "solo", 0).unwrap();

        thread::spawn(move || {
            kernel.launch(0);
            REACHED_AFTER_LAUNCH.store(true, Ordering::Relaxed);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!REACHED_AFTER_LAUNCH.load(Ordering::Relaxed));
    }
}
