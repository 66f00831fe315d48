use backtrace::Backtrace;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::cmp;
use std::fs::OpenOptions;
use std::marker::PhantomData;
use widestring::U16Str;

use crate::util::permit_alloc;

/// The environment variable used to control where log output is written.
pub const LOG_ENV_VAR: &str = "VST3_ADAPTER_LOG";

/// The bit that controls flush-to-zero behavior for denormals in 32 and 64-bit floating point
/// numbers on AArch64.
///
/// <https://developer.arm.com/documentation/ddi0595/2021-06/AArch64-Registers/FPCR--Floating-point-Control-Register>
#[cfg(target_arch = "aarch64")]
const AARCH64_FTZ_BIT: u64 = 1 << 24;

#[cfg(all(
    debug_assertions,
    feature = "assert_process_allocs",
    all(windows, target_env = "gnu")
))]
compile_error!("The 'assert_process_allocs' feature does not work correctly in combination with the 'x86_64-pc-windows-gnu' target, see https://github.com/Windfisch/rust-assert-no-alloc/issues/7");

#[cfg(all(debug_assertions, feature = "assert_process_allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

/// Copy `src` to the fixed size UTF-16 buffer `dest` as a null-terminated string. If `dest` does
/// not have enough capacity the string gets truncated, and there will always be a null terminator.
pub fn u16strlcpy(dest: &mut [u16], src: &str) {
    if dest.is_empty() {
        return;
    }

    let src_utf16: Vec<u16> = src.encode_utf16().collect();

    // Make sure there's always room for a null terminator
    let copy_len = cmp::min(dest.len() - 1, src_utf16.len());
    dest[..copy_len].copy_from_slice(&src_utf16[..copy_len]);
    dest[copy_len] = 0;
}

/// Read a null-terminated UTF-16 string from a fixed size buffer. Invalid code units are replaced.
pub fn u16str_to_string(src: &[u16]) -> String {
    let len = src.iter().position(|&c| c == 0).unwrap_or(src.len());

    U16Str::from_slice(&src[..len]).to_string_lossy()
}

/// Map a host event's sample offset into `[0, total_buffer_len)`. Offsets outside of the block
/// are a host bug and trip a debug assertion.
#[inline]
pub fn clamp_input_event_timing(timing: i32, total_buffer_len: u32) -> u32 {
    // If `total_buffer_len == 0`, then 0 is a valid timing
    let last_valid_index = total_buffer_len.saturating_sub(1);

    adapter_debug_assert!(
        timing >= 0 && timing as u32 <= last_valid_index,
        "Input event is out of bounds, will be clamped to the buffer's size"
    );

    (timing.max(0) as u32).min(last_valid_index)
}

/// Set up the logger so that the `adapter_*!()` logging and assertion macros log output to a
/// centralized location and panics also get written there. By default this logs to STDERR.
///
/// The behavior can be controlled by setting the `VST3_ADAPTER_LOG` environment variable to:
///
/// - `stderr`, in which case the log output always gets written to STDERR.
/// - A file path, in which case the output gets appended to the end of that file which will be
///   created if necessary. If the file cannot be opened the output goes to STDERR instead.
///
/// Calling this more than once is harmless, only the first logger sticks.
pub fn setup_logger() {
    let log_level = if cfg!(debug_assertions) {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Info
    };

    // Always show the module in debug builds, makes it clearer where messages are coming from
    let config = if cfg!(debug_assertions) {
        ConfigBuilder::new()
            .set_target_level(log::LevelFilter::Error)
            .set_thread_level(log::LevelFilter::Trace)
            .build()
    } else {
        ConfigBuilder::new()
            .set_thread_level(log::LevelFilter::Off)
            .build()
    };

    let stderr_logger = |config: Config| -> Box<dyn SharedLogger> {
        TermLogger::new(log_level, config, TerminalMode::Stderr, ColorChoice::Auto)
    };

    let logger: Box<dyn SharedLogger> = match std::env::var(LOG_ENV_VAR) {
        Ok(target) if !target.is_empty() && !target.eq_ignore_ascii_case("stderr") => {
            match OpenOptions::new().create(true).append(true).open(&target) {
                Ok(file) => WriteLogger::new(log_level, config, file) as Box<dyn SharedLogger>,
                Err(err) => {
                    eprintln!("Could not open '{target}' for logging, falling back to STDERR: {err}");
                    stderr_logger(config)
                }
            }
        }
        _ => stderr_logger(config),
    };

    let logger_set = CombinedLogger::init(vec![logger]).is_ok();
    if logger_set {
        log_panics();
    }
}

/// Route panics through the logger, with a backtrace. A panic in `process()` would otherwise be
/// lost when the host swallows STDERR. Allocations are permitted so the hook works from the render
/// context with `assert_process_allocs` enabled.
fn log_panics() {
    std::panic::set_hook(Box::new(|info| {
        permit_alloc(|| {
            let thread = std::thread::current();
            let payload = info.payload();
            let message = payload
                .downcast_ref::<&'static str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("<non-string payload>");
            let location = info
                .location()
                .map(|location| format!(" at {}:{}", location.file(), location.line()))
                .unwrap_or_default();

            adapter_error!(
                target: "panic",
                "Thread '{}' panicked{}: {}\n{:?}",
                thread.name().unwrap_or("<unnamed>"),
                location,
                message,
                Backtrace::new()
            );
        })
    }));
}

/// Run one `process()` call. Denormals are flushed to zero for its duration, and with the
/// `assert_process_allocs` feature in a debug build any allocation inside `f` aborts.
pub fn process_wrapper<T, F: FnOnce() -> T>(f: F) -> T {
    // Hosts don't reliably do this themselves
    let _ftz_guard = ScopedFtz::enable();

    cfg_if::cfg_if! {
        if #[cfg(all(debug_assertions, feature = "assert_process_allocs"))] {
            assert_no_alloc::assert_no_alloc(f)
        } else {
            f()
        }
    }
}

/// Flush-to-zero for the current thread, reset on drop if it was off before.
struct ScopedFtz {
    /// FTZ was off when the guard was created.
    restore_off: bool,
    /// The FP control register is per thread, so the guard must not leave it.
    _not_send: PhantomData<*const ()>,
}

impl ScopedFtz {
    fn enable() -> Self {
        #[cfg(not(miri))]
        {
            #[cfg(all(target_arch = "x86_64", target_feature = "sse"))]
            {
                let mode = unsafe { std::arch::x86_64::_MM_GET_FLUSH_ZERO_MODE() };
                let restore_off = mode != std::arch::x86_64::_MM_FLUSH_ZERO_ON;
                if restore_off {
                    unsafe {
                        std::arch::x86_64::_MM_SET_FLUSH_ZERO_MODE(
                            std::arch::x86_64::_MM_FLUSH_ZERO_ON,
                        )
                    };
                }

                return Self {
                    restore_off,
                    _not_send: PhantomData,
                };
            }

            #[cfg(target_arch = "aarch64")]
            {
                // FPCR has no intrinsics, only the system register instructions
                let mut fpcr: u64;
                unsafe { std::arch::asm!("mrs {}, fpcr", out(reg) fpcr) };

                let restore_off = fpcr & AARCH64_FTZ_BIT == 0;
                if restore_off {
                    unsafe { std::arch::asm!("msr fpcr, {}", in(reg) fpcr | AARCH64_FTZ_BIT) };
                }

                return Self {
                    restore_off,
                    _not_send: PhantomData,
                };
            }
        }

        #[allow(unreachable_code)] // Other architectures leave the FP environment alone
        Self {
            restore_off: false,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ScopedFtz {
    fn drop(&mut self) {
        #[cfg(not(miri))]
        if self.restore_off {
            #[cfg(all(target_arch = "x86_64", target_feature = "sse"))]
            {
                unsafe {
                    std::arch::x86_64::_MM_SET_FLUSH_ZERO_MODE(
                        std::arch::x86_64::_MM_FLUSH_ZERO_OFF,
                    )
                };
            }

            #[cfg(target_arch = "aarch64")]
            {
                let mut fpcr: u64;
                unsafe { std::arch::asm!("mrs {}, fpcr", out(reg) fpcr) };
                unsafe { std::arch::asm!("msr fpcr, {}", in(reg) fpcr & !AARCH64_FTZ_BIT) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16strlcpy_normal() {
        let mut dest = [0; 128];
        u16strlcpy(&mut dest, "Gain");

        assert_eq!(u16str_to_string(&dest), "Gain");
        assert_eq!(dest[4], 0);
    }

    #[test]
    fn u16strlcpy_overflow() {
        let mut dest = [0; 6];
        u16strlcpy(&mut dest, "Hello, world!");

        assert_eq!(u16str_to_string(&dest), "Hello");
    }

    #[test]
    fn u16str_without_terminator() {
        let src: Vec<u16> = "abc".encode_utf16().collect();

        assert_eq!(u16str_to_string(&src), "abc");
    }

    #[test]
    fn event_timing_is_clamped() {
        assert_eq!(clamp_input_event_timing(3, 64), 3);
        assert_eq!(clamp_input_event_timing(0, 0), 0);
    }

    #[test]
    fn process_wrapper_returns_value() {
        assert_eq!(process_wrapper(|| 1 + 1), 2);
    }
}
