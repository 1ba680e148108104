//! Error classes for the scheduling core (see spec §7 of the design doc).
//!
//! Invariant violations (lock discipline, sched preconditions, init exiting)
//! are not represented here: they are fatal and handled by `assert!`/`panic!`
//! at the call site, not by `Result`. Only recoverable conditions and
//! user-visible negatives flow through `KernelError`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// `allocproc` found no `UNUSED` slot.
    OutOfProc,
    /// Kernel stack allocation failed while claiming a process slot.
    Alloc,
    /// `fork`'s address-space clone failed.
    VmClone,
}

impl KernelError {
    pub fn as_str(&self) -> &'static str {
        match self {
            KernelError::OutOfProc => "out of process slots",
            KernelError::Alloc => "kernel stack allocation failed",
            KernelError::VmClone => "address space clone failed",
        }
    }
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Return an error, logging file:line. Use instead of `return Err(...)`.
#[macro_export]
macro_rules! err {
    ($e:expr) => {{
        #[cfg(debug_assertions)]
        $crate::console::println!("! errored at {}:{}: {}", file!(), line!(), $e);
        return Err($e.into());
    }};
}

/// Propagate an error with location logging. Use instead of bare `?`.
#[macro_export]
macro_rules! try_log {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => {
                #[cfg(debug_assertions)]
                $crate::console::println!("  at {}:{}", file!(), line!());
                return Err(e.into());
            }
        }
    };
}
