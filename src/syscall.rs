//! System-call numbers for the process-lifecycle and introspection calls
//! this crate implements.
//!
//! Argument decoding (reading registers out of a trap frame, copying
//! strings in from user space) and the trap entry point that would
//! actually call into `sysproc` belong to the trap/IRQ layer, an external
//! collaborator out of scope here (see `hal` module docs): this crate's
//! `hal::TrapFrame` deliberately exposes nothing beyond the return-value
//! register `fork` needs to zero.

/// System call numbers, matching the original's `syscall.h`, trimmed to
/// the ones this crate implements.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Fork = 1,
    Exit = 2,
    Wait = 3,
    Kill = 4,
    Getpid = 5,
    Sleep = 6,
    Uptime = 7,
    Yield = 8,
    Waitx = 9,
    GetPInfo = 10,
    Cps = 11,
    Cpr = 12,
}

/// A syscall number with no known meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownSyscall(pub usize);

impl TryFrom<usize> for Syscall {
    type Error = UnknownSyscall;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Syscall::Fork),
            2 => Ok(Syscall::Exit),
            3 => Ok(Syscall::Wait),
            4 => Ok(Syscall::Kill),
            5 => Ok(Syscall::Getpid),
            6 => Ok(Syscall::Sleep),
            7 => Ok(Syscall::Uptime),
            8 => Ok(Syscall::Yield),
            9 => Ok(Syscall::Waitx),
            10 => Ok(Syscall::GetPInfo),
            11 => Ok(Syscall::Cps),
            12 => Ok(Syscall::Cpr),
            _ => Err(UnknownSyscall(value)),
        }
    }
}
