//! Kernel logging.
//!
//! `klog!` is made visible to the rest of the kernel by the `#[macro_use]`
//! on this module in `lib.rs`. Its implementation is architecture- and
//! feature-specific: on real hardware it goes out over the Instrumentation
//! Trace Macrocell (`klog-itm`, the default) or semihosting
//! (`klog-semihosting`); on the host simulator backend it just prints.
//! If neither hardware feature is enabled, it's stubbed out entirely so it
//! costs nothing in interrupt-latency terms.

#[cfg(all(target_os = "none", feature = "klog-itm"))]
#[macro_export]
macro_rules! klog {
    ($s:expr) => {
        #[allow(unused_unsafe)]
        unsafe {
            let stim = &mut (*cortex_m::peripheral::ITM::ptr()).stim[0];
            cortex_m::iprintln!(stim, $s);
        }
    };
    ($s:expr, $($tt:tt)*) => {
        #[allow(unused_unsafe)]
        unsafe {
            let stim = &mut (*cortex_m::peripheral::ITM::ptr()).stim[0];
            cortex_m::iprintln!(stim, $s, $($tt)*);
        }
    };
}

#[cfg(all(target_os = "none", feature = "klog-semihosting"))]
#[macro_export]
macro_rules! klog {
    ($s:expr) => { let _ = cortex_m_semihosting::hprintln!($s); };
    ($s:expr, $($tt:tt)*) => { let _ = cortex_m_semihosting::hprintln!($s, $($tt)*); };
}

#[cfg(not(target_os = "none"))]
#[macro_export]
macro_rules! klog {
    ($s:expr) => { std::println!($s); };
    ($s:expr, $($tt:tt)*) => { std::println!($s, $($tt)*); };
}

#[cfg(all(target_os = "none", not(feature = "klog-itm"), not(feature = "klog-semihosting")))]
#[macro_export]
macro_rules! klog {
    ($s:expr) => {};
    ($s:expr, $($tt:tt)*) => {};
}
