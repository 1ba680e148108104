//! Pluggable scheduling-policy dispatch.
//!
//! Exactly one cargo feature among `sched-fcfs`, `sched-pbs`, `sched-mlfq`
//! selects the policy compiled into the real scheduler loop (round-robin
//! is the default). The [`Policy`] trait itself is feature-independent so
//! every concrete policy (MLFQ aside, since it needs the feature-gated
//! queue bank in [`super::table::TableInner`]) can be unit-tested directly
//! regardless of which feature is active, per the design note calling for
//! testable policy dispatch.

use super::ProcState;
use super::table::TableInner;

/// A scheduling policy's decision points. All methods are called with the
/// PT lock already held.
pub trait Policy {
    /// Selects the next process to dispatch, or `None` if nothing is
    /// runnable.
    fn pick_next(&self, table: &mut TableInner, now: u64) -> Option<usize>;

    /// Called from `yield_` immediately after flipping `slot` from
    /// `Running` back to `Runnable`. A no-op for every policy but MLFQ,
    /// which uses it to drive quantum-expiry demotion.
    fn on_yield(&self, _table: &mut TableInner, _slot: usize, _now: u64) {}

    /// Called when `slot` transitions `Sleeping -> Runnable` (wakeup) or
    /// `Embryo -> Runnable` (spawn).
    fn on_wake(&self, _table: &mut TableInner, _slot: usize, _now: u64) {}

    /// Called when `slot` is reclaimed, to drop any policy bookkeeping
    /// that survives the process itself (queue membership, etc).
    fn on_exit(&self, _table: &mut TableInner, _slot: usize) {}
}

/// Single linear pass over the table; runs every `Runnable` process once
/// per outer scheduler iteration. The default when no other policy
/// feature is enabled.
pub struct RoundRobin;

impl Policy for RoundRobin {
    fn pick_next(&self, table: &mut TableInner, _now: u64) -> Option<usize> {
        table
            .procs
            .iter()
            .position(|p| p.state == ProcState::Runnable)
    }
}

/// Dispatches the runnable process with the smallest `ctime`. Since the
/// timer tick still preempts via `yield`, this is "lowest-ctime among
/// runnable at each scheduling decision", not a strict run-to-completion
/// FCFS.
pub struct Fcfs;

impl Policy for Fcfs {
    fn pick_next(&self, table: &mut TableInner, _now: u64) -> Option<usize> {
        table
            .procs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.state == ProcState::Runnable)
            .min_by_key(|(_, p)| p.ctime)
            .map(|(i, _)| i)
    }
}

/// Dispatches the runnable process with the numerically smallest
/// `priority` (lower value, higher priority). Ties go to the first match
/// in table order.
pub struct Pbs;

impl Policy for Pbs {
    fn pick_next(&self, table: &mut TableInner, _now: u64) -> Option<usize> {
        table
            .procs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.state == ProcState::Runnable)
            .min_by_key(|(_, p)| p.priority)
            .map(|(i, _)| i)
    }
}

/// Dispatches via whichever policy is compiled in.
pub fn dispatch(table: &mut TableInner, now: u64) -> Option<usize> {
    #[cfg(feature = "sched-fcfs")]
    {
        Fcfs.pick_next(table, now)
    }
    #[cfg(feature = "sched-pbs")]
    {
        Pbs.pick_next(table, now)
    }
    #[cfg(feature = "sched-mlfq")]
    {
        super::mlfq::Mlfq.pick_next(table, now)
    }
    #[cfg(not(any(feature = "sched-fcfs", feature = "sched-pbs", feature = "sched-mlfq")))]
    {
        RoundRobin.pick_next(table, now)
    }
}

pub fn on_yield(table: &mut TableInner, slot: usize, now: u64) {
    #[cfg(feature = "sched-fcfs")]
    Fcfs.on_yield(table, slot, now);
    #[cfg(feature = "sched-pbs")]
    Pbs.on_yield(table, slot, now);
    #[cfg(feature = "sched-mlfq")]
    super::mlfq::Mlfq.on_yield(table, slot, now);
    #[cfg(not(any(feature = "sched-fcfs", feature = "sched-pbs", feature = "sched-mlfq")))]
    RoundRobin.on_yield(table, slot, now);
}

pub fn on_wake(table: &mut TableInner, slot: usize, now: u64) {
    #[cfg(feature = "sched-fcfs")]
    Fcfs.on_wake(table, slot, now);
    #[cfg(feature = "sched-pbs")]
    Pbs.on_wake(table, slot, now);
    #[cfg(feature = "sched-mlfq")]
    super::mlfq::Mlfq.on_wake(table, slot, now);
    #[cfg(not(any(feature = "sched-fcfs", feature = "sched-pbs", feature = "sched-mlfq")))]
    RoundRobin.on_wake(table, slot, now);
}

pub fn on_exit(table: &mut TableInner, slot: usize) {
    #[cfg(feature = "sched-fcfs")]
    Fcfs.on_exit(table, slot);
    #[cfg(feature = "sched-pbs")]
    Pbs.on_exit(table, slot);
    #[cfg(feature = "sched-mlfq")]
    super::mlfq::Mlfq.on_exit(table, slot);
    #[cfg(not(any(feature = "sched-fcfs", feature = "sched-pbs", feature = "sched-mlfq")))]
    RoundRobin.on_exit(table, slot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table_with(states_and_ctimes: &[(ProcState, u64)]) -> TableInner {
        let mut table = TableInner::new_for_test();
        for (i, (state, ctime)) in states_and_ctimes.iter().enumerate() {
            table.procs[i].state = *state;
            table.procs[i].ctime = *ctime;
            table.procs[i].pid = super::super::Pid::new(i + 1);
        }
        table
    }

    proptest! {
        /// Universal invariant: under FCFS, among runnable processes, the
        /// dispatched one has the minimum ctime (ties go to the first
        /// match in table order).
        #[test]
        fn fcfs_always_dispatches_the_minimum_ctime_among_runnable(
            ctimes in proptest::collection::vec(0u64..1000, 2..8),
            runnable_mask in proptest::collection::vec(any::<bool>(), 2..8),
        ) {
            let n = ctimes.len().min(runnable_mask.len());
            let mut table = TableInner::new_for_test();
            for i in 0..n {
                table.procs[i].pid = super::super::Pid::new(i + 1);
                table.procs[i].ctime = ctimes[i];
                table.procs[i].state = if runnable_mask[i] {
                    ProcState::Runnable
                } else {
                    ProcState::Zombie
                };
            }

            let picked = Fcfs.pick_next(&mut table, 0);
            let expected = (0..n).filter(|&i| runnable_mask[i]).min_by_key(|&i| ctimes[i]);
            prop_assert_eq!(picked, expected);
        }

        /// Universal invariant: under PBS, among runnable processes, the
        /// dispatched one has the minimum priority (ties go to the first
        /// match in table order).
        #[test]
        fn pbs_always_dispatches_the_minimum_priority_among_runnable(
            priorities in proptest::collection::vec(0i32..100, 2..8),
            runnable_mask in proptest::collection::vec(any::<bool>(), 2..8),
        ) {
            let n = priorities.len().min(runnable_mask.len());
            let mut table = TableInner::new_for_test();
            for i in 0..n {
                table.procs[i].pid = super::super::Pid::new(i + 1);
                table.procs[i].priority = priorities[i];
                table.procs[i].state = if runnable_mask[i] {
                    ProcState::Runnable
                } else {
                    ProcState::Zombie
                };
            }

            let picked = Pbs.pick_next(&mut table, 0);
            let expected = (0..n).filter(|&i| runnable_mask[i]).min_by_key(|&i| priorities[i]);
            prop_assert_eq!(picked, expected);
        }
    }

    #[test]
    fn round_robin_picks_first_runnable() {
        let mut table = table_with(&[
            (ProcState::Zombie, 0),
            (ProcState::Runnable, 5),
            (ProcState::Runnable, 1),
        ]);
        assert_eq!(RoundRobin.pick_next(&mut table, 0), Some(1));
    }

    #[test]
    fn fcfs_picks_smallest_ctime() {
        let mut table = table_with(&[
            (ProcState::Runnable, 30),
            (ProcState::Runnable, 10),
            (ProcState::Runnable, 20),
        ]);
        assert_eq!(Fcfs.pick_next(&mut table, 0), Some(1));
    }

    #[test]
    fn fcfs_breaks_ties_by_table_order() {
        let mut table = table_with(&[
            (ProcState::Runnable, 10),
            (ProcState::Runnable, 10),
        ]);
        assert_eq!(Fcfs.pick_next(&mut table, 0), Some(0));
    }

    #[test]
    fn pbs_picks_smallest_priority() {
        let mut table = table_with(&[
            (ProcState::Runnable, 0),
            (ProcState::Runnable, 0),
            (ProcState::Runnable, 0),
        ]);
        table.procs[0].priority = 60;
        table.procs[1].priority = 40;
        table.procs[2].priority = 50;
        assert_eq!(Pbs.pick_next(&mut table, 0), Some(1));
    }

    #[test]
    fn no_runnable_process_yields_none() {
        let mut table = table_with(&[(ProcState::Zombie, 0), (ProcState::Sleeping, 0)]);
        assert_eq!(RoundRobin.pick_next(&mut table, 0), None);
    }
}
