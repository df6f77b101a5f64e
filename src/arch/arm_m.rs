//! Architecture support for ARMv7-M.
//!
//! # Why a separate `PendSV`
//!
//! On any exception entry the processor auto-stacks eight words (r0-r3,
//! r12, lr, pc, xpsr) and leaves the rest of the register file alone. A
//! handler written in ordinary Rust only has to save what it actually
//! clobbers, which the compiler handles for us -- *unless* the handler's
//! job is to switch which task's stack those clobbered registers belong
//! to. Then the saving has to be exhaustive and has to land somewhere the
//! next handler invocation can find it again, which means hand-written
//! assembly.
//!
//! `SVCall` always does a full save/restore, because landing here means a
//! context switch is about to happen (either to start the first task or
//! to return from a syscall that would only be meaningful this way). The
//! system tick never does the save/restore itself; it just pends `PendSV`
//! (the same mechanism [`crate::yield_now`] uses), so the full sequence
//! only runs when a switch is actually due.
//!
//! This split is the standard Cortex-M context-switch idiom, not
//! something invented for this kernel.

use core::arch::{asm, global_asm};
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::kernel::{CURRENT_TASK, TASK_TABLE};
use crate::sched;
use crate::task::synthetic_frame;
use crate::watchdog::HardwareWatchdog;

include!(concat!(env!("OUT_DIR"), "/consts.rs"));

/// Points at the `stack_ptr` field of whichever `Task` is current.
///
/// Kept separate from [`CURRENT_TASK`] (a plain index) because the
/// assembly below has no way to turn an index into a field address
/// without a multiply and an array base it would have to hard-code; this
/// way it only ever has to load one pointer and dereference it, the same
/// trick the teacher's `CURRENT_TASK_PTR` uses for its `Task` pointer.
#[no_mangle]
static CURRENT_TASK_PTR: AtomicPtr<*mut u32> = AtomicPtr::new(core::ptr::null_mut());

/// Builds the synthetic initial exception frame described in the data
/// model: the words at the top of the frame encode the processor status
/// register, the entry point, and the EXC_RETURN code the first dispatch
/// (or any later resumption) returns through; everything below that is
/// the callee-saved register file, zeroed, since a task has no prior
/// state to resume.
///
/// Returns the stack pointer the task should be resumed with: the
/// address sixteen words below the top of `stack`.
pub fn init_stack(stack: &mut [u32], entry: extern "C" fn() -> !) -> *mut u32 {
    synthetic_frame(stack, entry as usize as u32, EXC_RETURN_CONST)
}

/// No hardware thread to spawn on real silicon: the task starts running
/// the first time the dispatcher restores its frame. Exists only so
/// `Kernel::create` has one call that both backends implement.
pub fn on_task_created(_index: usize, _entry: extern "C" fn() -> !) {}

/// Runs the fault/interrupt priority setup, configures the system tick,
/// and falls into the assembly that performs the first dispatch.
///
/// Never returns in the Rust sense: the `svc` instruction below traps
/// into [`SVCall`], whose startup path drops privilege, switches onto
/// the first task's stack, and returns directly into that task's entry
/// point. Nothing after the `svc` in this function ever executes.
pub fn start_first_task() -> ! {
    // Safety: purely lowering interrupt priorities below the kernel's own
    // handlers' from their power-on defaults; can't cause a surprise
    // preemption mid-setup.
    unsafe {
        let scb = &*cortex_m::peripheral::SCB::ptr();
        // SVCall, PendSV and SysTick all run at the lowest priority, so
        // none of them preempts another: the kernel's own entry points
        // never nest.
        scb.shpr[7].write(0xFF); // SVCall
        scb.shpr[10].write(0xFF); // PendSV
        scb.shpr[11].write(0xFF); // SysTick
    }

    let current = CURRENT_TASK.load(Ordering::Relaxed);
    // Safety: `create` has already run for at least one task by the time
    // `launch` (the only caller of this function) is reached.
    let stack_ptr_field = unsafe { &mut TASK_TABLE.get_mut(current).stack_ptr as *mut *mut u32 };
    CURRENT_TASK_PTR.store(stack_ptr_field, Ordering::Relaxed);

    // Safety: traps into `SVCall`'s startup path below, which never
    // returns control here.
    unsafe {
        asm!("svc #0xff", options(noreturn));
    }
}

// `SVCall` is given the name `SVCall` because that's the symbol the
// `cortex-m-rt` vector table expects for the Supervisor Call exception.
//
// Unlike `PendSV`, `SVCall` only ever runs once: the first and only use
// of `svc` in this kernel is the one `start_first_task` issues above.
// There's no outgoing context to save, so this is a strict subset of the
// `PendSV` sequence -- drop privilege, materialize the EXC_RETURN value,
// and branch into the first task.
global_asm! {"
    .section .text.SVCall
    .globl SVCall
    .type SVCall,function
    SVCall:
        movs r0, #1
        msr CONTROL, r0
        @ no barrier needed: the exception return below serves as one.

        movw r0, #:lower16:CURRENT_TASK_PTR
        movt r0, #:upper16:CURRENT_TASK_PTR
        ldr r0, [r0]
        ldr r1, [r0]
        ldmia r1!, {{r4-r11}}
        msr PSP, r1

        ldr lr, ={exc_return}
        bx lr
    ",
    exc_return = const EXC_RETURN_CONST,
}

/// Voluntary or tick-driven context switch: pends `PendSV`, which runs
/// once the caller's own handler (if any) returns, or immediately if
/// called from thread mode, as soon as a higher-priority handler isn't
/// already running.
pub fn request_switch() {
    cortex_m::peripheral::SCB::set_pendsv();
}

global_asm! {"
    .section .text.PendSV
    .globl PendSV
    .type PendSV,function
    PendSV:
        movw r0, #:lower16:CURRENT_TASK_PTR
        movt r0, #:upper16:CURRENT_TASK_PTR
        ldr r0, [r0]
        mrs r2, PSP
        stmdb r2!, {{r4-r11}}
        str r2, [r0]

        bl pendsv_entry

        movw r0, #:lower16:CURRENT_TASK_PTR
        movt r0, #:upper16:CURRENT_TASK_PTR
        ldr r0, [r0]
        ldr r1, [r0]
        ldmia r1!, {{r4-r11}}
        msr PSP, r1

        bx lr
    ",
}

/// The Rust side of `PendSV`: runs the scheduler and repoints
/// [`CURRENT_TASK_PTR`] at the newly selected task, after the outgoing
/// task's registers are safely on its own stack and before the incoming
/// task's are restored from its.
#[no_mangle]
extern "C" fn pendsv_entry() {
    let task_count = crate::kernel::TASK_COUNT.load(Ordering::Relaxed);
    let current = CURRENT_TASK.load(Ordering::Relaxed);
    let next = sched::select(current, task_count);
    CURRENT_TASK.store(next, Ordering::Relaxed);
    // Safety: the assembly above has already finished using the previous
    // task's fields; nothing else touches the task table concurrently.
    let stack_ptr_field = unsafe { &mut TASK_TABLE.get_mut(next).stack_ptr as *mut *mut u32 };
    CURRENT_TASK_PTR.store(stack_ptr_field, Ordering::Relaxed);
    klog!("switch {} -> {}", current, next);
}

/// System tick handler: every tick is treated exactly like a yield (see
/// the scheduler's design notes), so this does nothing but pend the same
/// switch `request_switch` does. The actual register save/restore runs
/// in `PendSV`, once this handler returns.
#[no_mangle]
extern "C" fn SysTick() {
    request_switch();
}

/// Real IWDG-backed [`HardwareWatchdog`], using the STM32 independent
/// watchdog's unlock-key protocol: writes of `0x5555` to the key register
/// unlock the prescaler and reload registers for one write, `0xCCCC`
/// starts the counter, and `0xAAAA` reloads it.
pub struct Iwdg {
    key: *mut u32,
    prescaler: *mut u32,
    reload: *mut u32,
}

impl Iwdg {
    /// # Safety
    /// `base` must be the IWDG peripheral's base address for the target
    /// part.
    pub unsafe fn new(base: usize) -> Self {
        Iwdg {
            key: base as *mut u32,
            prescaler: (base + 0x04) as *mut u32,
            reload: (base + 0x08) as *mut u32,
        }
    }
}

impl HardwareWatchdog for Iwdg {
    fn unlock(&mut self) {
        unsafe { self.key.write_volatile(0x5555) };
    }

    fn set_prescaler(&mut self, value: u32) {
        unsafe { self.prescaler.write_volatile(value) };
    }

    fn set_reload(&mut self, value: u32) {
        unsafe { self.reload.write_volatile(value) };
    }

    fn start(&mut self) {
        unsafe { self.key.write_volatile(0xCCCC) };
    }

    fn feed(&mut self) {
        unsafe { self.key.write_volatile(0xAAAA) };
    }
}

/// Real SysTick-backed [`crate::SystemTimer`].
pub struct SysTickTimer;

impl crate::kernel::SystemTimer for SysTickTimer {
    fn start(&mut self, reload: u32) {
        // Safety: exclusive access to SYST is assumed here, matching the
        // rest of this module's treatment of core peripherals as
        // effectively singletons reached by raw pointer.
        unsafe {
            let syst = &*cortex_m::peripheral::SYST::ptr();
            syst.rvr.write(reload);
            syst.cvr.write(0);
            syst.csr.write(0b111); // ENABLE | TICKINT | CLKSOURCE
        }
    }
}

/// Real PendSV-backed [`crate::PendableService`].
pub struct PendSvService;

impl crate::kernel::PendableService for PendSvService {
    fn pend(&mut self) {
        request_switch();
    }
}
