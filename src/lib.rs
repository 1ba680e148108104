#![cfg_attr(not(test), no_std)]
#![allow(clippy::missing_safety_doc)]

extern crate alloc;

#[cfg(all(feature = "sched-fcfs", feature = "sched-pbs"))]
compile_error!("at most one scheduling policy feature may be enabled");
#[cfg(all(feature = "sched-fcfs", feature = "sched-mlfq"))]
compile_error!("at most one scheduling policy feature may be enabled");
#[cfg(all(feature = "sched-pbs", feature = "sched-mlfq"))]
compile_error!("at most one scheduling policy feature may be enabled");

pub mod console;
pub mod error;
pub mod fs;
pub mod file;
pub mod hal;
pub mod kalloc;
pub mod param;
pub mod proc;
pub mod spinlock;
pub mod sync;
pub mod syscall;
pub mod sysproc;
pub mod vm;

/// Kernel entry point shared by every hart. Hart 0 performs one-time
/// initialization, then every hart enters its scheduler loop.
///
/// # Safety
/// Must be called exactly once per hart, after the boot assembly has set up
/// `tp` with the hart id and a valid stack.
pub unsafe fn main(hart_id: usize) -> ! {
    if hart_id == 0 {
        console::println!("");
        console::println!("rv6sched kernel is booting");
        unsafe { kalloc::init() };
        unsafe { proc::table::init() };
        proc::table::user_init(proc::table::table());
    }

    unsafe { proc::scheduler::scheduler(proc::table::table()) }
}
