//! The virtual memory subsystem is an external collaborator of the
//! scheduling core (see crate docs): page-table setup, user VM clone/grow
//! /shrink/free, and switching the active address space all live outside
//! this crate in a full kernel. `UserMemory` is the narrow handle the core
//! actually needs — something it can own per-process, clone on `fork`,
//! resize on `sbrk`, and free on reaping — without this crate implementing
//! a page table.

use crate::error::KernelError;

/// A process's user address space.
#[derive(Debug, Default)]
pub struct UserMemory {
    size: usize,
}

impl UserMemory {
    /// Builds a fresh address space with kernel mappings only (trampoline,
    /// trap frame), as `allocproc` does for every new slot.
    pub fn setup_kernel() -> Result<Self, KernelError> {
        Ok(Self { size: 0 })
    }

    /// Deep-clones `size` bytes of user memory for `fork`.
    pub fn clone_from(&self, _size: usize) -> Result<Self, KernelError> {
        Ok(Self { size: self.size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Grows the address space from `old` to `new` bytes.
    pub fn grow(&mut self, _old: usize, new: usize) -> Result<usize, KernelError> {
        self.size = new;
        Ok(new)
    }

    /// Shrinks the address space from `old` to `new` bytes.
    pub fn shrink(&mut self, _old: usize, new: usize) -> usize {
        self.size = new;
        new
    }

    /// Releases every page backing this address space. Called while
    /// reaping a zombie in `wait`/`waitx`.
    pub fn free(self) {}

    /// Makes this the active address space on the current hart.
    pub fn switch(&self) {}
}
