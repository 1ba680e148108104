//! Process-lifecycle and introspection syscall bodies: the thin layer
//! between a decoded syscall (owned by the trap layer, out of scope here
//! per `hal` module docs) and the `proc` module's actual logic.

use crate::error::KernelError;
use crate::hal;
use crate::proc::introspection::Procstat;
use crate::proc::{self, Channel, Pid};

/// Returns the slot this hart is currently running.
///
/// # Panics
/// Panics if called from outside a process context (e.g. the idle
/// scheduler loop itself).
fn current_slot() -> usize {
    hal::pushcli();
    // Safety: interrupts are disabled for the duration of the read.
    let slot = unsafe { proc::scheduler::current_slot() };
    hal::popcli();
    slot.expect("sysproc: no process running on this hart")
}

pub fn sys_fork() -> Result<Pid, KernelError> {
    let slot = current_slot();
    proc::table::fork(proc::table::table(), slot)
}

/// Terminates the calling process. Never returns: the scheduler never
/// switches back into a zombie.
pub fn sys_exit() -> ! {
    let slot = current_slot();
    proc::table::exit(proc::table::table(), slot);
    unreachable!("sys_exit: a zombie process was rescheduled")
}

pub fn sys_wait() -> Option<Pid> {
    let slot = current_slot();
    proc::table::wait(proc::table::table(), slot)
}

/// As [`sys_wait`], but also reports `(wtime, rtime)` ticks for the
/// reaped child.
pub fn sys_waitx() -> Option<(Pid, u64, u64)> {
    let slot = current_slot();
    proc::table::waitx(proc::table::table(), slot)
}

pub fn sys_kill(pid: Pid) -> i32 {
    proc::table::kill(proc::table::table(), pid)
}

pub fn sys_yield() {
    let slot = current_slot();
    proc::scheduler::yield_(proc::table::table(), slot);
}

pub fn sys_getpinfo(pid: Pid, out: &mut Procstat) -> i32 {
    proc::introspection::getpinfo(proc::table::table(), pid, out)
}

pub fn sys_cps() -> i32 {
    proc::introspection::cps(proc::table::table())
}

pub fn sys_cpr(pid: Pid, priority: i32) -> i32 {
    proc::introspection::cpr(proc::table::table(), pid, priority)
}

/// Sleeps the calling process for `duration` ticks, waking early (with a
/// short count) if it is killed in the meantime.
pub fn sys_sleep(duration: u64) {
    let target = hal::now() + duration;
    let slot = current_slot();

    loop {
        let mut inner = proc::table::table().lock();
        if hal::now() >= target || inner.procs[slot].killed {
            break;
        }
        proc::scheduler::sleep(&mut inner, slot, Channel::Ticks);
    }
}

pub fn sys_uptime() -> u64 {
    hal::now()
}

pub fn sys_getpid() -> Pid {
    let slot = current_slot();
    proc::table::table().lock().procs[slot].pid
}
