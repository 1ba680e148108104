//! The process table: a fixed array of `NPROC` slots guarded by exactly
//! one spinlock, plus the allocator/lifecycle calls that mutate it
//! (`allocproc`, `userinit`, `fork`, `exit`, `wait`, `waitx`, `kill`).
//!
//! A single lock (rather than one per process plus a separate parent
//! lock) is a deliberate departure: it is what the original source uses
//! (one `ptable.lock` for the whole table), and it is what makes the
//! cooperative lock handoff across `swtch` tractable to reason about (see
//! `scheduler`). The table itself is passed by reference rather than
//! reached for as a free-standing global, so lifecycle calls are directly
//! testable against a throwaway table.

use alloc::string::String;

use crate::error::KernelError;
use crate::file::RcFile;
use crate::fs::{self, RcInode};
use crate::hal;
use crate::param::{DEFAULT_PBS_PRIORITY, NMLFQ, NOFILE, NPROC};
use crate::spinlock::{SpinLock, SpinLockGuard};
use crate::sync::OnceLock;
use crate::vm::UserMemory;

use super::scheduler;
use super::{Channel, Pid, ProcState};

#[cfg(feature = "sched-mlfq")]
use super::mlfq::QueueBank;

/// One process table slot.
#[derive(Debug)]
pub struct Proc {
    pub pid: Pid,
    /// Table slot of the parent. `None` only for the init process and for
    /// unused/embryo slots.
    pub parent: Option<usize>,
    pub state: ProcState,
    /// PBS: 0..=100, default 60, lower = higher priority.
    /// MLFQ: 1..=5, lower = higher priority, always equal to the queue
    /// this process currently sits in.
    pub priority: i32,
    pub kstack: usize,
    pub context: hal::Context,
    pub tf: hal::TrapFrame,
    pub mem: UserMemory,
    pub ofile: [Option<RcFile>; NOFILE],
    pub cwd: Option<RcInode>,
    /// Valid only while `state == Sleeping`.
    pub chan: Option<Channel>,
    pub killed: bool,
    pub name: String,
    pub ctime: u64,
    pub etime: u64,
    pub rtime: u64,
    pub iotime: u64,
    pub num_run: u64,
    /// Tick at which the current MLFQ queue residency began.
    pub last_time: u64,
    pub cq: [u32; NMLFQ],
}

impl Proc {
    fn unused() -> Self {
        Self {
            pid: Pid::new(0),
            parent: None,
            state: ProcState::Unused,
            priority: DEFAULT_PBS_PRIORITY,
            kstack: 0,
            context: hal::Context::new(),
            tf: hal::TrapFrame::default(),
            mem: UserMemory::default(),
            ofile: [const { None }; NOFILE],
            cwd: None,
            chan: None,
            killed: false,
            name: String::new(),
            ctime: 0,
            etime: 0,
            rtime: 0,
            iotime: 0,
            num_run: 0,
            last_time: 0,
            cq: [0; NMLFQ],
        }
    }

    pub fn is_unused(&self) -> bool {
        self.state == ProcState::Unused
    }
}

/// The whole process table's state, co-located with the spinlock that
/// guards it: PCBs, the next-pid counter, the init slot, and (MLFQ only)
/// the queue bank.
pub struct TableInner {
    pub procs: [Proc; NPROC],
    next_pid: usize,
    pub init_slot: Option<usize>,
    #[cfg(feature = "sched-mlfq")]
    pub mlfq: QueueBank,
}

impl TableInner {
    fn new() -> Self {
        Self {
            procs: core::array::from_fn(|_| Proc::unused()),
            next_pid: 1,
            init_slot: None,
            #[cfg(feature = "sched-mlfq")]
            mlfq: QueueBank::new(),
        }
    }

    #[cfg(test)]
    pub fn new_for_test() -> Self {
        Self::new()
    }
}

pub struct ProcTable {
    inner: SpinLock<TableInner>,
}

impl ProcTable {
    pub fn new() -> Self {
        Self {
            inner: SpinLock::new(TableInner::new(), "proctable"),
        }
    }

    pub fn lock(&self) -> SpinLockGuard<'_, TableInner> {
        self.inner.lock()
    }

    /// Bypasses locking. For `procdump`, a debugging aid that must keep
    /// working even if the table lock is wedged.
    ///
    /// # Safety
    /// See [`SpinLock::get_unchecked`].
    pub unsafe fn get_unchecked(&self) -> &TableInner {
        unsafe { self.inner.get_unchecked() }
    }

    /// Releases the lock without a guard value in hand. Used by
    /// `scheduler::forkret`, which inherits the lock held across the
    /// `swtch` into a freshly allocated process with no guard to drop.
    ///
    /// # Safety
    /// See [`SpinLock::force_unlock`].
    pub unsafe fn force_unlock(&self) {
        unsafe { self.inner.force_unlock() }
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

static PROC_TABLE: OnceLock<ProcTable> = OnceLock::new();

/// Returns the global process table.
///
/// # Panics
/// Panics if called before [`init`].
pub fn table() -> &'static ProcTable {
    PROC_TABLE
        .get()
        .expect("process table used before proc::table::init()")
}

/// Initializes the global process table.
///
/// # Safety
/// Must be called exactly once, by hart 0, before any other hart can
/// observe the process table.
pub unsafe fn init() {
    PROC_TABLE
        .initialize(|| Ok::<_, ()>(ProcTable::new()))
        .expect("process table double init");
}

/// Scans for an `Unused` slot and claims it as a fresh `Embryo`. On
/// failure, nothing is mutated — avoiding the original's bug of writing
/// into the slot before confirming one was found.
fn allocproc(inner: &mut TableInner) -> Result<usize, KernelError> {
    let slot = inner
        .procs
        .iter()
        .position(Proc::is_unused)
        .ok_or(KernelError::OutOfProc)?;

    let kstack = hal::alloc_kstack().ok_or(KernelError::Alloc)?;

    let pid = Pid::new(inner.next_pid);
    inner.next_pid += 1;
    let now = hal::now();

    let p = &mut inner.procs[slot];
    *p = Proc::unused();
    p.pid = pid;
    p.state = ProcState::Embryo;
    p.kstack = kstack;
    p.ctime = now;
    p.context.ra = scheduler::forkret as usize;
    p.context.sp = kstack;

    #[cfg(feature = "sched-mlfq")]
    {
        p.priority = 1;
        p.last_time = now;
    }
    #[cfg(not(feature = "sched-mlfq"))]
    {
        p.priority = DEFAULT_PBS_PRIORITY;
    }

    // Queue membership is established by whichever caller makes the slot
    // `Runnable` (`user_init`, `fork`), via `policy::on_wake`, not here:
    // `fork` may still change `priority` before that point (inheriting the
    // parent's, which can differ from the fresh-embryo default above), and
    // enqueuing here as well as there would leave the slot in two queues at
    // once.
    Ok(slot)
}

/// Releases a slot's owned resources (kernel stack, address space, MLFQ
/// queue membership) and returns it to `Unused`. Used both to unwind a
/// partially-constructed child on `fork` failure and to reap a zombie in
/// `wait`/`waitx`.
fn reclaim_slot(inner: &mut TableInner, slot: usize) {
    super::policy::on_exit(inner, slot);
    let old = core::mem::replace(&mut inner.procs[slot], Proc::unused());
    old.mem.free();
    hal::free_kstack(old.kstack);
}

/// Builds the first user process: allocates its PCB, gives it a bare
/// kernel address space, and marks it `Runnable`. Records it as the
/// global reparenting target.
pub fn user_init(t: &ProcTable) {
    let mut inner = t.lock();

    let slot = allocproc(&mut inner).expect("userinit: out of process slots");

    {
        let p = &mut inner.procs[slot];
        p.mem = UserMemory::setup_kernel().expect("userinit: kernel vm setup failed");
        p.name.push_str("init");
        p.cwd = Some(RcInode::root());
        p.tf.a0 = 0;
        p.state = ProcState::Runnable;
    }

    let now = hal::now();
    super::policy::on_wake(&mut inner, slot, now);

    inner.init_slot = Some(slot);
}

/// Clones `parent_slot` into a new child process. Returns the child's pid
/// in the parent.
pub fn fork(t: &ProcTable, parent_slot: usize) -> Result<Pid, KernelError> {
    let mut inner = t.lock();

    let child_slot = allocproc(&mut inner)?;

    let parent_size = inner.procs[parent_slot].mem.size();
    let cloned = match inner.procs[parent_slot].mem.clone_from(parent_size) {
        Ok(mem) => mem,
        Err(e) => {
            reclaim_slot(&mut inner, child_slot);
            return Err(e);
        }
    };

    let parent_tf = inner.procs[parent_slot].tf.clone();
    let parent_priority = inner.procs[parent_slot].priority;
    let parent_name = inner.procs[parent_slot].name.clone();
    let parent_cwd = inner.procs[parent_slot].cwd.as_ref().map(RcInode::dup);
    let parent_files: [Option<RcFile>; NOFILE] =
        core::array::from_fn(|i| inner.procs[parent_slot].ofile[i].as_ref().map(RcFile::dup));
    let child_pid = inner.procs[child_slot].pid;

    let child = &mut inner.procs[child_slot];
    child.mem = cloned;
    child.parent = Some(parent_slot);
    child.tf = parent_tf;
    child.tf.a0 = 0;
    child.priority = parent_priority;
    child.name = parent_name;
    child.cwd = parent_cwd;
    child.ofile = parent_files;
    child.state = ProcState::Runnable;

    let now = hal::now();
    super::policy::on_wake(&mut inner, child_slot, now);

    Ok(child_pid)
}

/// Terminates `slot`: closes its files, releases its cwd, wakes its
/// parent, reparents its children to init, and becomes a zombie.
///
/// Returns (rather than diverging) so the transition is directly
/// testable; the syscall-facing wrapper in `sysproc` is the one that
/// actually never returns to user code.
pub fn exit(t: &ProcTable, slot: usize) {
    // Close files and release cwd before the PT lock, matching the
    // requirement that begin_op/end_op never nest inside it.
    let (files, cwd) = {
        let mut inner = t.lock();
        let files: [Option<RcFile>; NOFILE] =
            core::array::from_fn(|i| inner.procs[slot].ofile[i].take());
        let cwd = inner.procs[slot].cwd.take();
        (files, cwd)
    };
    for f in files.into_iter().flatten() {
        f.close();
    }
    if let Some(cwd) = cwd {
        let _op = fs::Operation::begin();
        cwd.put();
    }

    let mut inner = t.lock();
    assert_ne!(
        inner.init_slot,
        Some(slot),
        "exit: init process may not exit"
    );

    if let Some(parent) = inner.procs[slot].parent {
        scheduler::wakeup_locked(&mut inner, Channel::Proc(parent));
    }

    let init_slot = inner.init_slot;
    let mut reparented_zombie = false;
    for i in 0..NPROC {
        if inner.procs[i].parent == Some(slot) {
            inner.procs[i].parent = init_slot;
            if inner.procs[i].state == ProcState::Zombie {
                reparented_zombie = true;
            }
        }
    }
    if reparented_zombie {
        if let Some(init_slot) = init_slot {
            scheduler::wakeup_locked(&mut inner, Channel::Proc(init_slot));
        }
    }

    inner.procs[slot].etime = hal::now();
    inner.procs[slot].state = ProcState::Zombie;
    super::policy::on_exit(&mut inner, slot);

    scheduler::sched(&mut inner, slot);
}

/// Reaps one zombie child of `parent_slot`, or sleeps until one appears.
/// Returns `None` if the caller has no children or has been killed.
pub fn wait(t: &ProcTable, parent_slot: usize) -> Option<Pid> {
    waitx(t, parent_slot).map(|(pid, _, _)| pid)
}

/// As [`wait`], but also returns `(wtime, rtime)` ticks for the reaped
/// child.
pub fn waitx(t: &ProcTable, parent_slot: usize) -> Option<(Pid, u64, u64)> {
    let mut inner = t.lock();

    loop {
        let mut has_children = false;
        for i in 0..NPROC {
            if inner.procs[i].parent != Some(parent_slot) {
                continue;
            }
            has_children = true;
            if inner.procs[i].state == ProcState::Zombie {
                let pid = inner.procs[i].pid;
                let ctime = inner.procs[i].ctime;
                let etime = inner.procs[i].etime;
                let rtime = inner.procs[i].rtime;
                let iotime = inner.procs[i].iotime;
                let wtime = etime
                    .saturating_sub(ctime)
                    .saturating_sub(rtime)
                    .saturating_sub(iotime);

                reclaim_slot(&mut inner, i);
                return Some((pid, wtime, rtime));
            }
        }

        if !has_children || inner.procs[parent_slot].killed {
            return None;
        }

        scheduler::sleep(&mut inner, parent_slot, Channel::Proc(parent_slot));
    }
}

/// Marks the process with `pid` as killed, waking it if it is sleeping.
/// Returns `0` on a hit, `-1` if no such process exists.
pub fn kill(t: &ProcTable, pid: Pid) -> i32 {
    let mut inner = t.lock();

    for i in 0..NPROC {
        if inner.procs[i].pid == pid && !inner.procs[i].is_unused() {
            inner.procs[i].killed = true;
            if inner.procs[i].state == ProcState::Sleeping {
                inner.procs[i].state = ProcState::Runnable;
                inner.procs[i].chan = None;
                let now = hal::now();
                super::policy::on_wake(&mut inner, i, now);
            }
            return 0;
        }
    }
    -1
}

/// Sets `pid`'s priority (PBS) and returns the pid, per `cpr`'s contract.
pub fn set_priority(t: &ProcTable, pid: Pid, priority: i32) -> i32 {
    let mut inner = t.lock();

    for p in inner.procs.iter_mut() {
        if p.pid == pid && !p.is_unused() {
            p.priority = priority;
            return pid.as_usize() as i32;
        }
    }
    -1
}
