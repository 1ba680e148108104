//! The file subsystem is an external collaborator of the scheduling core
//! (see crate docs): open-file duplication and closing live outside this
//! crate in a full kernel. `RcFile` is the narrow, refcounted handle the
//! core needs to duplicate into `ofile[NOFILE]` on `fork` and drop on
//! `exit`.

use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::sync::Arc;

/// A reference-counted open file. Duplicating bumps the shared refcount
/// instead of allocating a new file-table entry, mirroring `filedup`.
#[derive(Debug, Clone)]
pub struct RcFile {
    refs: Arc<AtomicUsize>,
}

impl RcFile {
    pub fn new() -> Self {
        Self {
            refs: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// Bumps the refcount and returns a new handle to the same open file.
    pub fn dup(&self) -> Self {
        self.refs.fetch_add(1, Ordering::Relaxed);
        Self {
            refs: self.refs.clone(),
        }
    }

    /// Drops this handle, decrementing the shared refcount. The last
    /// handle's drop releases the underlying open-file-table entry.
    pub fn close(self) {
        self.refs.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Default for RcFile {
    fn default() -> Self {
        Self::new()
    }
}
