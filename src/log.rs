//! Minimal trace-point facade. The teacher has no tracing/log crate
//! dependency and instead prints straight to its UART
//! (`examples/dickhfchan-rustos/src/uart.rs`'s `_print`/`println!`);
//! this crate carries the same shape as a pluggable sink so a host
//! kernel can wire it to its own console without this crate knowing
//! anything about UARTs, serial ports, or framebuffers.

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

type Sink = fn(fmt::Arguments);

fn default_sink(_args: fmt::Arguments) {}

static SINK: AtomicPtr<()> = AtomicPtr::new(default_sink as *mut ());

/// Installs the console sink. Call once, early in boot, before any
/// other subsystem's `bootstrap()` (spec §9's singleton-initialization
/// pattern).
pub fn set_sink(sink: Sink) {
    SINK.store(sink as *mut (), Ordering::Relaxed);
}

#[doc(hidden)]
pub fn dispatch(args: fmt::Arguments) {
    let ptr = SINK.load(Ordering::Relaxed);
    let sink: Sink = unsafe { core::mem::transmute(ptr) };
    sink(args);
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log::dispatch(format_args!($($arg)*))
    };
}
