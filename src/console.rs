//! Kernel console output.
//!
//! The actual character sink (UART, simulated terminal, ...) lives outside
//! the scheduling core; this module only serializes writers and formats
//! output, handing bytes off to [`crate::hal::console_putc`].

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::hal;
use crate::spinlock::SpinLock;

pub static CONSOLE: Console = Console {
    writer: SpinLock::new(Writer, "console"),
    panicked: AtomicBool::new(false),
};

pub struct Console {
    writer: SpinLock<Writer>,
    panicked: AtomicBool,
}

impl Console {
    pub fn is_panicked(&self) -> &AtomicBool {
        &self.panicked
    }
}

struct Writer;

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            hal::console_putc(byte);
        }
        Ok(())
    }
}

pub fn _print(args: fmt::Arguments<'_>, newline: bool) {
    if CONSOLE.panicked.load(Ordering::Relaxed) {
        // Already panicked: don't try to take the lock, just get the bytes out.
        let mut writer = Writer;
        let _ = writer.write_fmt(args);
        if newline {
            let _ = writer.write_char('\n');
        }
        return;
    }

    let mut writer = CONSOLE.writer.lock();
    writer.write_fmt(args).expect("print error");
    if newline {
        writer.write_char('\n').expect("print error nl");
    }
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        $crate::console::_print(format_args!($($arg)*), false);
    }};
}

#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n");
    };
    ($($arg:tt)*) => {{
        $crate::console::_print(format_args!($($arg)*), true);
    }};
}

pub use print;
pub use println;
