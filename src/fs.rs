//! The file subsystem is an external collaborator of the scheduling core
//! (see crate docs). `RcInode` is the narrow, refcounted handle `exit` and
//! `fork` need for the current-working-directory reference; [`Operation`]
//! is the log-transaction bracket `exit` wraps the cwd release in, matching
//! the original's "close all files, then `begin_op`, `iput(cwd)`, `end_op`"
//! ordering.

use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::sync::Arc;

/// A reference-counted inode handle (e.g. a process's current working
/// directory).
#[derive(Debug, Clone)]
pub struct RcInode {
    refs: Arc<AtomicUsize>,
}

impl RcInode {
    /// The root directory, used as every process's initial `cwd`.
    pub fn root() -> Self {
        Self {
            refs: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// Bumps the refcount and returns a new handle to the same inode.
    pub fn dup(&self) -> Self {
        self.refs.fetch_add(1, Ordering::Relaxed);
        Self {
            refs: self.refs.clone(),
        }
    }

    /// Drops this handle, decrementing the shared refcount.
    pub fn put(self) {
        self.refs.fetch_sub(1, Ordering::Relaxed);
    }
}

/// An open on-disk log transaction. `exit` brackets the `cwd` release in
/// one of these so the inode-put participates in the same transaction as
/// any writes it triggers.
pub struct Operation;

impl Operation {
    pub fn begin() -> Self {
        Operation
    }
}

impl Drop for Operation {
    fn drop(&mut self) {}
}
