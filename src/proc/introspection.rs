//! User- and debug-visible process queries: `getpinfo` (the structured
//! per-process stat block used by `waitx`'s userland counterpart),
//! `cps`/`cpr` (the priority-inspection/override pair used by PBS), and
//! `procdump` (the Ctrl-P debugging dump).

use crate::param::NMLFQ;

use super::table::ProcTable;
use super::{Pid, ProcState};

/// Per-process statistics, mirroring the original's `proc_stat` struct:
/// the fields `waitx`'s userland counterpart and `cps` both need to
/// report.
#[derive(Debug, Clone, Copy, Default)]
pub struct Procstat {
    pub pid: usize,
    pub runtime: u64,
    pub num_run: u64,
    pub current_queue: i32,
    /// Ticks spent at each MLFQ level (queue 0..NMLFQ); zeroed under the
    /// other policies.
    pub ticks: [u32; NMLFQ],
}

/// Fills `out` with `pid`'s stats. Returns `25` on success (matching the
/// original syscall's return value), `-1` if no such process exists.
pub fn getpinfo(t: &ProcTable, pid: Pid, out: &mut Procstat) -> i32 {
    let inner = t.lock();

    for p in inner.procs.iter() {
        if p.pid == pid && !p.is_unused() {
            out.pid = p.pid.as_usize();
            out.runtime = p.rtime;
            out.num_run = p.num_run;
            out.current_queue = p.priority;
            out.ticks = p.cq;
            return 25;
        }
    }
    -1
}

fn state_label(state: ProcState) -> &'static str {
    match state {
        ProcState::Unused => "unused",
        ProcState::Embryo => "embryo",
        ProcState::Sleeping => "sleeping",
        ProcState::Runnable => "runnable",
        ProcState::Running => "running",
        ProcState::Zombie => "zombie",
    }
}

/// Prints one line per live process: pid, name, state, and priority.
/// Returns `24`, matching the original `cps` syscall's return value.
pub fn cps(t: &ProcTable) -> i32 {
    let inner = t.lock();

    crate::console::println!("PID\tPriority\tState\tName");
    for p in inner.procs.iter() {
        if p.is_unused() {
            continue;
        }
        crate::console::println!(
            "{}\t{}\t\t{}\t{}",
            p.pid,
            p.priority,
            state_label(p.state),
            p.name
        );
    }
    24
}

/// Sets `pid`'s PBS priority. Returns the pid on success, `-1` if no such
/// process exists.
pub fn cpr(t: &ProcTable, pid: Pid, priority: i32) -> i32 {
    super::table::set_priority(t, pid, priority)
}

/// Debugging dump of every live process, bypassing the table lock so it
/// keeps working even if the lock is held by a wedged hart. Called from a
/// keyboard interrupt handler in a full kernel; this crate exposes it as
/// a plain function since that trigger is out of scope (see crate docs).
pub fn procdump(t: &ProcTable) {
    // Safety: a debugging aid, documented to tolerate a torn read.
    let inner = unsafe { t.get_unchecked() };

    for p in inner.procs.iter() {
        if p.is_unused() {
            continue;
        }
        crate::console::println!(
            "{} {} {}",
            p.pid,
            state_label(p.state),
            p.name
        );
        if p.state == ProcState::Sleeping {
            // A real port walks the saved frame pointer chain on the
            // process's kernel stack here; left as a documented extension
            // point (see `hal` module docs on the trap layer).
            crate::console::println!("  (stack trace unavailable)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getpinfo_reports_unknown_pid() {
        let table = ProcTable::new();
        let mut out = Procstat::default();
        assert_eq!(getpinfo(&table, Pid::new(42), &mut out), -1);
    }

    #[test]
    fn getpinfo_fills_stats_for_a_live_process() {
        let table = ProcTable::new();
        let pid = Pid::new(7);
        {
            let mut inner = table.lock();
            inner.procs[0].pid = pid;
            inner.procs[0].state = ProcState::Runnable;
            inner.procs[0].rtime = 3;
            inner.procs[0].num_run = 2;
            inner.procs[0].priority = 4;
            inner.procs[0].cq = [1, 2, 0, 0, 0];
        }

        let mut out = Procstat::default();
        assert_eq!(getpinfo(&table, pid, &mut out), 25);
        assert_eq!(out.pid, 7);
        assert_eq!(out.runtime, 3);
        assert_eq!(out.num_run, 2);
        assert_eq!(out.current_queue, 4);
        assert_eq!(out.ticks, [1, 2, 0, 0, 0]);
    }

    #[test]
    fn cpr_updates_priority_and_returns_pid() {
        let table = ProcTable::new();
        let pid = Pid::new(9);
        {
            let mut inner = table.lock();
            inner.procs[0].pid = pid;
            inner.procs[0].state = ProcState::Runnable;
        }

        assert_eq!(cpr(&table, pid, 10), 9);
        assert_eq!(table.lock().procs[0].priority, 10);
        assert_eq!(cpr(&table, Pid::new(999), 10), -1);
    }

    #[test]
    fn cps_returns_its_fixed_code() {
        let table = ProcTable::new();
        assert_eq!(cps(&table), 24);
    }
}
