//! Per-CPU scheduler state and the context-handoff contract: the
//! per-hart scheduler loop, `sched`/`yield_`/`sleep`/`wakeup`, `forkret`,
//! and `timer_tick`.
//!
//! The table is guarded by exactly one lock (see `table` module docs), so
//! unlike the original's per-proc-lock `sleep`, there is no separate
//! condition lock to hand off: the table lock itself is the condition
//! lock, and it is already held by every caller here.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::hal;
use crate::param::NCPU;
#[cfg(feature = "sched-mlfq")]
use crate::param::NMLFQ;

use super::policy;
use super::table::{ProcTable, TableInner};
use super::{Channel, ProcState};

/// Per-hart scheduler state: which slot (if any) this hart is running,
/// and the context `swtch` returns to once that slot gives up the CPU.
pub struct Cpu {
    pub proc: Option<usize>,
    pub context: hal::Context,
}

impl Cpu {
    const fn new() -> Self {
        Self {
            proc: None,
            context: hal::Context::new(),
        }
    }
}

struct CpuTable([UnsafeCell<Cpu>; NCPU]);

// Safety: each hart only ever reaches its own slot, via `current_cpu`'s
// `lapicid`-indexed lookup.
unsafe impl Sync for CpuTable {}

static CPU_TABLE: CpuTable = CpuTable([const { UnsafeCell::new(Cpu::new()) }; NCPU]);

/// Returns this hart's per-CPU scheduler state.
///
/// # Safety
/// Must be called with interrupts disabled, per [`hal::lapicid`].
unsafe fn current_cpu() -> &'static mut Cpu {
    let id = unsafe { hal::lapicid() };
    unsafe { &mut *CPU_TABLE.0[id].get() }
}

/// Returns the table slot currently running on this hart, or `None` if
/// this hart is idling in the scheduler loop.
///
/// # Safety
/// Must be called with interrupts disabled.
pub unsafe fn current_slot() -> Option<usize> {
    unsafe { current_cpu() }.proc
}

/// Each hart's idle loop: repeatedly asks the compiled-in policy for a
/// process to run, switches into it, and reclaims the hart once it gives
/// up the CPU (via `yield_`, `sleep`, or `exit`).
///
/// # Safety
/// Must be called once per hart, after `proc::table::init` has run on
/// hart 0.
pub unsafe fn scheduler(t: &ProcTable) -> ! {
    let cpu = unsafe { current_cpu() };
    cpu.proc = None;

    loop {
        // A process that ran last may have left interrupts disabled;
        // re-enable them here so a hart with nothing runnable doesn't
        // deadlock waiting for one.
        hal::sti();

        let mut inner = t.lock();
        let now = hal::now();
        if let Some(slot) = policy::dispatch(&mut inner, now) {
            inner.procs[slot].state = ProcState::Running;
            cpu.proc = Some(slot);

            let proc_ctx: *const hal::Context = &inner.procs[slot].context;
            // Safety: `slot` was just dequeued as Runnable and is about to
            // be marked Running by no other hart; the table lock excludes
            // concurrent access to its context.
            unsafe { hal::swtch(&mut cpu.context, proc_ctx) };

            cpu.proc = None;
        }
        drop(inner);
    }
}

/// Switches away from `slot`, back into this hart's scheduler loop.
/// Precondition: the table lock is held and `slot` has already been
/// flipped away from `Running` by the caller.
pub fn sched(inner: &mut TableInner, slot: usize) {
    assert_ne!(
        inner.procs[slot].state,
        ProcState::Running,
        "sched: process still marked running"
    );
    assert!(!hal::read_eflags(), "sched: interruptible");

    // Safety: the table lock is held by the caller, so no other hart can
    // observe or mutate `slot`'s context concurrently.
    let cpu = unsafe { current_cpu() };
    let proc_ctx: *mut hal::Context = &mut inner.procs[slot].context;
    let cpu_ctx: *const hal::Context = &cpu.context;
    unsafe { hal::swtch(proc_ctx, cpu_ctx) };
}

/// Gives up the CPU for one scheduling round: flips `slot` back to
/// `Runnable`, increments its `num_run` counter, lets the compiled-in
/// policy record the quantum expiry (MLFQ demotion), then hands control
/// back to the scheduler.
pub fn yield_(t: &ProcTable, slot: usize) {
    let mut inner = t.lock();
    inner.procs[slot].state = ProcState::Runnable;
    inner.procs[slot].num_run += 1;
    let now = hal::now();
    policy::on_yield(&mut inner, slot, now);
    sched(&mut inner, slot);
}

/// Puts `slot` to sleep on `chan`. Caller already holds the table lock.
pub fn sleep(inner: &mut TableInner, slot: usize, chan: Channel) {
    inner.procs[slot].chan = Some(chan);
    inner.procs[slot].state = ProcState::Sleeping;
    sched(inner, slot);
    inner.procs[slot].chan = None;
}

/// Wakes every process sleeping on `chan`. Caller already holds the table
/// lock.
pub fn wakeup_locked(inner: &mut TableInner, chan: Channel) {
    let now = hal::now();
    for slot in 0..inner.procs.len() {
        if inner.procs[slot].state == ProcState::Sleeping && inner.procs[slot].chan == Some(chan) {
            inner.procs[slot].state = ProcState::Runnable;
            inner.procs[slot].chan = None;
            policy::on_wake(inner, slot, now);
        }
    }
}

/// Acquires the table lock and wakes every process sleeping on `chan`.
pub fn wakeup(t: &ProcTable, chan: Channel) {
    let mut inner = t.lock();
    wakeup_locked(&mut inner, chan);
}

/// Entry point for a freshly allocated process's very first scheduling.
/// `allocproc` points `context.ra` at this function, so the first
/// `swtch` into a new slot lands here rather than resuming a previously
/// running kernel thread.
///
/// Takes no arguments and reaches for the global table rather than a
/// passed-in reference: `swtch` jumps to this address directly (it is
/// never an ordinary Rust call), so there is no calling convention
/// available to hand it one.
///
/// # Safety
/// Must only be reached via the `swtch` performed by `scheduler`, which
/// leaves the table lock held on this hart with no guard value to drop.
pub unsafe fn forkret() {
    // Only the very first process to reach here performs deferred,
    // process-context-only setup (e.g. bringing up the log/fs layer);
    // every later fork's first scheduling just falls through.
    static FIRST: AtomicBool = AtomicBool::new(true);

    unsafe { super::table::table().force_unlock() };

    if FIRST.swap(false, Ordering::Relaxed) {
        // Deferred first-process setup lives outside this crate (see
        // `fs` module docs): the scheduling core only needs to mark that
        // the moment has passed.
    }

    hal::return_to_user();
}

/// Advances the global tick and updates every process's accounting:
/// `rtime` for whichever slot is `Running`, `iotime` for every `Sleeping`
/// slot, and (MLFQ only) the current queue's elapsed-quantum counter.
///
/// The original's equivalent bookkeeping lives in `trap.c`'s periodic
/// `update_time()`, which this crate does not retrieve (see `hal` module
/// docs on the trap layer being out of scope); call sites outside tests
/// must wire this into their own timer interrupt.
pub fn timer_tick(t: &ProcTable) {
    hal::tick();
    let mut inner = t.lock();

    for slot in 0..inner.procs.len() {
        match inner.procs[slot].state {
            ProcState::Running => {
                inner.procs[slot].rtime += 1;
                #[cfg(feature = "sched-mlfq")]
                {
                    let priority = inner.procs[slot].priority;
                    let level = (priority - 1).clamp(0, NMLFQ as i32 - 1) as usize;
                    inner.procs[slot].cq[level] += 1;
                }
            }
            ProcState::Sleeping => {
                inner.procs[slot].iotime += 1;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::Pid;
    use crate::proc::table::kill;
    use proptest::prelude::*;

    fn runnable_slot(inner: &mut TableInner, pid: usize) -> usize {
        let slot = inner.procs.iter().position(|p| p.is_unused()).unwrap();
        inner.procs[slot].pid = Pid::new(pid);
        inner.procs[slot].state = ProcState::Runnable;
        slot
    }

    proptest! {
        /// Universal invariant: `kill(p)` followed by sufficient
        /// scheduling always transitions p out of SLEEPING within one
        /// scheduling round, on any wait channel.
        #[test]
        fn kill_wakes_a_sleeper_on_any_channel(
            chan_is_ticks in any::<bool>(),
            chan_id in 0usize..64,
        ) {
            let table = ProcTable::new();
            let slot;
            let pid;
            {
                let mut inner = table.lock();
                slot = runnable_slot(&mut inner, 1);
                pid = inner.procs[slot].pid;
            }
            let chan = if chan_is_ticks { Channel::Ticks } else { Channel::Proc(chan_id) };
            {
                let mut inner = table.lock();
                sleep(&mut inner, slot, chan);
            }
            prop_assert_eq!(table.lock().procs[slot].state, ProcState::Sleeping);

            prop_assert_eq!(kill(&table, pid), 0);
            prop_assert_eq!(table.lock().procs[slot].state, ProcState::Runnable);
            prop_assert!(table.lock().procs[slot].killed);
        }

        /// Universal invariant: `sleep(chan)` followed by `wakeup(chan)`
        /// always wakes the sleeper, for any interleaving in which
        /// `wakeup` begins after `sleep` has set state to SLEEPING — here
        /// trivially true since the PT lock serializes both ends, but
        /// exercised across arbitrary channel ids.
        #[test]
        fn wakeup_after_sleep_never_loses_the_wakeup(chan_id in 0usize..64) {
            let table = ProcTable::new();
            let slot;
            {
                let mut inner = table.lock();
                slot = runnable_slot(&mut inner, 1);
                sleep(&mut inner, slot, Channel::Proc(chan_id));
            }
            prop_assert_eq!(table.lock().procs[slot].state, ProcState::Sleeping);

            wakeup(&table, Channel::Proc(chan_id));
            prop_assert_eq!(table.lock().procs[slot].state, ProcState::Runnable);
            prop_assert!(table.lock().procs[slot].chan.is_none());
        }
    }

    #[test]
    fn sleep_then_wakeup_by_channel() {
        let table = ProcTable::new();
        let slot;
        {
            let mut inner = table.lock();
            slot = runnable_slot(&mut inner, 1);
            sleep(&mut inner, slot, Channel::Ticks);
        }
        assert_eq!(table.lock().procs[slot].state, ProcState::Sleeping);

        wakeup(&table, Channel::Ticks);
        assert_eq!(table.lock().procs[slot].state, ProcState::Runnable);
        assert!(table.lock().procs[slot].chan.is_none());
    }

    #[test]
    fn wakeup_ignores_other_channels() {
        let table = ProcTable::new();
        let slot;
        {
            let mut inner = table.lock();
            slot = runnable_slot(&mut inner, 1);
            sleep(&mut inner, slot, Channel::Proc(3));
        }

        wakeup(&table, Channel::Ticks);
        assert_eq!(table.lock().procs[slot].state, ProcState::Sleeping);
    }

    #[test]
    fn yield_flips_to_runnable_and_counts_it() {
        let table = ProcTable::new();
        let slot;
        {
            let mut inner = table.lock();
            slot = runnable_slot(&mut inner, 1);
            inner.procs[slot].state = ProcState::Running;
        }

        yield_(&table, slot);

        let inner = table.lock();
        assert_eq!(inner.procs[slot].state, ProcState::Runnable);
        assert_eq!(inner.procs[slot].num_run, 1);
    }

    #[test]
    #[should_panic(expected = "sched: process still marked running")]
    fn sched_rejects_a_slot_still_marked_running() {
        let table = ProcTable::new();
        let mut inner = table.lock();
        let slot = runnable_slot(&mut inner, 1);
        inner.procs[slot].state = ProcState::Running;
        sched(&mut inner, slot);
    }

    #[test]
    fn timer_tick_accrues_rtime_and_iotime() {
        let table = ProcTable::new();
        let (running, sleeping);
        {
            let mut inner = table.lock();
            running = runnable_slot(&mut inner, 1);
            inner.procs[running].state = ProcState::Running;
            sleeping = runnable_slot(&mut inner, 2);
            inner.procs[sleeping].state = ProcState::Sleeping;
        }

        timer_tick(&table);

        let inner = table.lock();
        assert_eq!(inner.procs[running].rtime, 1);
        assert_eq!(inner.procs[sleeping].iotime, 1);
    }
}
