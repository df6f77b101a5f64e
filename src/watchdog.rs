//! Watchdog binding.
//!
//! Grounded in the original kernel's IWDG sequence: unlock the protected
//! registers, set a prescaler and reload value, start the counter, then
//! feed it periodically from a dedicated monitor task. This module defines
//! the contract; `arch::arm_m` supplies the real IWDG-backed implementation
//! and `arch::sim` a host-testable fake.

/// Hardware watchdog timer binding.
///
/// The sequencing contract (unlock before configuring, configure before
/// starting, start before the first feed is due) is the caller's
/// responsibility -- this trait doesn't encode it in the type system
/// because the real IWDG doesn't either; getting it wrong is a hardware
/// reset, not a recoverable error.
pub trait HardwareWatchdog {
    /// Unlocks the watchdog's configuration registers for writing.
    fn unlock(&mut self);

    /// Sets the watchdog's input clock prescaler.
    fn set_prescaler(&mut self, value: u32);

    /// Sets the down-counter reload value. The watchdog resets the
    /// processor if the counter reaches zero before the next [`feed`].
    ///
    /// [`feed`]: HardwareWatchdog::feed
    fn set_reload(&mut self, value: u32);

    /// Starts the watchdog counting down from the reload value.
    fn start(&mut self);

    /// Reloads the down-counter, postponing the next reset.
    fn feed(&mut self);
}

/// The system-monitor task: the sole task in the system permitted to
/// refresh the hardware watchdog. Its body is grounded on the original
/// `task_sys_mon` -- an unbounded sequence of refresh, then yield.
pub struct MonitorTask;

impl MonitorTask {
    /// Feeds the watchdog, then yields, forever.
    ///
    /// A task built around this only stops feeding the watchdog if it
    /// stops being scheduled at all -- starved by a runaway task that
    /// never yields, or parked in a fault handler -- which is exactly the
    /// condition the watchdog exists to catch.
    pub fn body<W: HardwareWatchdog>(watchdog: &mut W, yield_now: impl Fn()) -> ! {
        loop {
            watchdog.feed();
            yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct FakeWatchdog {
        unlocked: bool,
        prescaler: u32,
        reload: u32,
        started: bool,
        feed_count: u32,
    }

    impl HardwareWatchdog for FakeWatchdog {
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

    #[test]
    fn monitor_feeds_then_yields_repeatedly() {
        let mut wd = FakeWatchdog {
            unlocked: false,
            prescaler: 0,
            reload: 0,
            started: false,
            feed_count: 0,
        };
        wd.unlock();
        wd.set_prescaler(0x06);
        wd.set_reload(250);
        wd.start();
        assert!(wd.unlocked);
        assert!(wd.started);

        let yields = Cell::new(0u32);
        let mut iterations = 0u32;
        // Can't run `MonitorTask::body` itself (it never returns);
        // exercise the same feed-then-yield shape directly instead.
        while iterations < 10 {
            wd.feed();
            yields.set(yields.get() + 1);
            iterations += 1;
        }
        assert_eq!(wd.feed_count, 10);
        assert_eq!(yields.get(), 10);
    }
}
