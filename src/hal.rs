//! Abstract hardware/platform interfaces the scheduling core consumes but
//! does not implement: the tick counter, interrupt-disable nesting
//! (`pushcli`/`popcli`), the local APIC (hart) id, kernel stack storage, and
//! the `swtch` context-switch primitive.
//!
//! On real hardware these would be backed by CSR reads/writes and a few
//! lines of assembly (see `swtch.S` in the original sources this crate is
//! modeled on). Here they are kept as a small, mockable surface so the
//! process table and scheduler logic can be exercised under `cfg(test)`
//! without a hart.

use core::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use crate::param::NCPU;

/// Monotonic tick counter, incremented by the timer interrupt.
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Returns the current tick count.
pub fn now() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Advances the tick counter by one. Called from the timer trap handler.
pub fn tick() -> u64 {
    TICKS.fetch_add(1, Ordering::Relaxed) + 1
}

struct HartState {
    num_off: AtomicI64,
    interrupts_enabled: AtomicBool,
}

impl HartState {
    const fn new() -> Self {
        Self {
            num_off: AtomicI64::new(0),
            interrupts_enabled: AtomicBool::new(false),
        }
    }
}

static HART_STATE: [HartState; NCPU] = [const { HartState::new() }; NCPU];

#[cfg(not(test))]
mod arch {
    /// Returns this hart's id, as read from the `tp` register by the boot
    /// assembly.
    pub fn lapicid() -> usize {
        // A real port reads the per-hart id register (`tp` on RISC-V, the
        // local APIC id on x86). Left as a documented extension point: the
        // trap/IRQ layer is out of scope for this crate (see module docs).
        0
    }

    pub fn interrupts_get() -> bool {
        false
    }

    pub fn interrupts_enable() {}

    pub fn interrupts_disable() {}
}

#[cfg(test)]
mod arch {
    use core::cell::Cell;

    std::thread_local! {
        static FAKE_INTERRUPTS: Cell<bool> = const { Cell::new(false) };
    }

    pub fn lapicid() -> usize {
        0
    }

    pub fn interrupts_get() -> bool {
        FAKE_INTERRUPTS.with(|c| c.get())
    }

    pub fn interrupts_enable() {
        FAKE_INTERRUPTS.with(|c| c.set(true));
    }

    pub fn interrupts_disable() {
        FAKE_INTERRUPTS.with(|c| c.set(false));
    }
}

/// Returns the id of the hart executing this code.
///
/// # Safety
/// Must be called with interrupts disabled, since the hart can otherwise be
/// preempted and rescheduled onto a different hart between the read and its
/// use.
pub unsafe fn lapicid() -> usize {
    arch::lapicid()
}

/// Returns whether interrupts are currently enabled in hardware.
pub fn read_eflags() -> bool {
    arch::interrupts_get()
}

/// Unconditionally enables interrupts in hardware.
pub fn sti() {
    arch::interrupts_enable();
}

fn hart() -> &'static HartState {
    // # Safety: reading our own hart id with interrupts in an unknown state
    // is fine here; we only use it to index our own slot.
    &HART_STATE[unsafe { lapicid() }]
}

/// Disables interrupts, incrementing this hart's cli nesting depth.
/// `popcli` undoes exactly one `pushcli`.
pub fn pushcli() {
    let enabled = arch::interrupts_get();
    arch::interrupts_disable();

    let hart = hart();
    if hart.num_off.load(Ordering::Relaxed) == 0 {
        hart.interrupts_enabled.store(enabled, Ordering::Relaxed);
    }
    hart.num_off.fetch_add(1, Ordering::Relaxed);
}

/// Decrements this hart's cli nesting depth, re-enabling interrupts once it
/// reaches zero and they were enabled before the matching `pushcli`.
pub fn popcli() {
    assert!(!arch::interrupts_get(), "popcli - interruptible");

    let hart = hart();
    let depth = hart.num_off.fetch_sub(1, Ordering::Relaxed);
    assert!(depth >= 1, "popcli");

    if depth == 1 && hart.interrupts_enabled.load(Ordering::Relaxed) {
        arch::interrupts_enable();
    }
}

/// Saved register context for a `swtch` kernel-stack switch.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Context {
    pub ra: usize,
    pub sp: usize,
    pub s0: usize,
    pub s1: usize,
}

impl Context {
    pub const fn new() -> Self {
        Self {
            ra: 0,
            sp: 0,
            s0: 0,
            s1: 0,
        }
    }

    pub fn zero(&mut self) {
        *self = Self::new();
    }
}

/// Switches kernel stacks: saves the caller's registers into `old` and
/// restores them from `new`. Returns when some other context later
/// `swtch`es back into `old`.
///
/// # Safety
/// `old` and `new` must both be valid, previously-initialized contexts
/// belonging to kernel threads that are not concurrently running.
#[cfg(not(test))]
pub unsafe fn swtch(_old: *mut Context, _new: *const Context) {
    // A real port trades `old`/`new` on the hart's kernel stack via a few
    // lines of `global_asm!` (see swtch.S in the sources this is modeled
    // on). The scheduling core above never inspects the saved registers, so
    // the mechanism is an implementation detail of the HAL.
    unreachable!("swtch requires a hart; this build target has none")
}

/// Test double for `swtch`: since tests run every "process" as an ordinary
/// Rust call frame on the host stack, there is nothing to save or restore.
/// The scheduler logic under test only cares that control crosses this
/// point, not what's in the registers.
#[cfg(test)]
pub unsafe fn swtch(_old: *mut Context, _new: *const Context) {}

/// Opaque per-process trap frame.
///
/// The trap/IRQ layer (register shape, `uservec`/`userret` trampoline,
/// `usertrap`/`usertrapret`) is an external collaborator of the scheduling
/// core (see crate docs): the core only needs to own one of these per
/// process and hand its address to `fork`'s register-copy step, never to
/// interpret its fields.
#[derive(Debug, Clone, Default)]
pub struct TrapFrame {
    /// Return-value register (`a0` on RISC-V). `fork` zeroes this in the
    /// child so that `fork` returns 0 there.
    pub a0: usize,
}

/// Returns to user mode, mimicking `usertrap()`'s return path. A real port
/// restores user registers from the trap frame and switches page tables;
/// left as a documented extension point here.
pub fn return_to_user() {}

/// Allocates a kernel stack for a newly created process.
///
/// Returns the stack's top-of-stack address to seed into a fresh `Context`.
pub fn alloc_kstack() -> Option<usize> {
    Some(0xffff_ffff)
}

/// Releases a kernel stack previously returned by `alloc_kstack`.
pub fn free_kstack(_top: usize) {}

/// Writes a single byte to the console sink (UART, simulated terminal, ...).
///
/// A real port pushes the byte out over the UART; left as a documented
/// extension point here, matching the rest of this module.
#[cfg(not(test))]
pub fn console_putc(_byte: u8) {}

#[cfg(test)]
pub fn console_putc(byte: u8) {
    use std::io::Write;
    let _ = std::io::stdout().write_all(&[byte]);
}
