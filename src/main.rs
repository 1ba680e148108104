#![no_std]
#![no_main]

extern crate alloc;

use sched_kernel::hal;

#[unsafe(export_name = "main")]
extern "C" fn kmain() -> ! {
    // Safety: called once at boot, before interrupts are enabled.
    let hart_id = unsafe { hal::lapicid() };
    unsafe { sched_kernel::main(hart_id) }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    sched_kernel::console::println!("kernel panic: {}", info);
    loop {
        core::hint::spin_loop();
    }
}
