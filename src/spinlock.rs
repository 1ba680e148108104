//! A disable-interrupts spinlock, generic over the data it protects.
//!
//! The process table is guarded by exactly one `SpinLock`; see
//! `proc::table::ProcTable`. Acquiring any `SpinLock` disables interrupts on
//! the current hart for the duration of the critical section (via
//! `hal::pushcli`/`hal::popcli`), which is what makes holding the lock across
//! a `swtch` safe: the lock is logically owned by whichever kernel thread is
//! currently running on the hart, and `swtch` is the one place that
//! ownership crosses between two kernel threads.

use core::cell::UnsafeCell;
use core::hint;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicIsize, Ordering};

use crate::hal;

const NO_OWNER: isize = -1;

pub struct SpinLock<T> {
    name: &'static str,
    owner: AtomicIsize,
    data: UnsafeCell<T>,
}

// Safety: the data is only reachable through a guard that holds exclusive
// access, so `SpinLock<T>` may be shared across harts as long as `T: Send`.
unsafe impl<T: Send> Sync for SpinLock<T> {}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(value: T, name: &'static str) -> Self {
        Self {
            name,
            owner: AtomicIsize::new(NO_OWNER),
            data: UnsafeCell::new(value),
        }
    }

    fn holding(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == unsafe { hal::lapicid() as isize }
    }

    /// Acquires the lock, disabling interrupts on this hart until the
    /// returned guard is dropped.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        hal::pushcli();

        assert!(!self.holding(), "acquire {} - already held", self.name);

        let me = unsafe { hal::lapicid() as isize };
        loop {
            if self
                .owner
                .compare_exchange(NO_OWNER, me, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
            hint::spin_loop();
        }

        SpinLockGuard { lock: self }
    }

    /// Releases the lock without a guard value in hand.
    ///
    /// # Safety
    /// The caller must actually be holding the lock (e.g. a process freshly
    /// scheduled in still holds the process-table lock inherited from the
    /// scheduler, with no guard object to drop because it crossed `swtch`).
    pub unsafe fn force_unlock(&self) {
        assert!(self.holding(), "force_unlock {} - not held", self.name);
        self.owner.store(NO_OWNER, Ordering::Release);
        hal::popcli();
    }

    /// Bypasses locking entirely. For debugging aids (`procdump`) that must
    /// keep working even if the system is wedged with the lock held.
    ///
    /// # Safety
    /// The caller must not mutate through the returned reference while any
    /// other hart might be writing to it.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_unchecked(&self) -> &T {
        unsafe { &*self.data.get() }
    }
}

impl<'a, T> Drop for SpinLockGuard<'a, T> {
    fn drop(&mut self) {
        assert!(self.lock.holding(), "release {} - not held", self.lock.name);
        self.lock.owner.store(NO_OWNER, Ordering::Release);
        hal::popcli();
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.data.get() }
    }
}
