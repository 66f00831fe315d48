//! Logging and assertion macros used throughout the adapter, and available to plugins through the
//! prelude. Output goes to the logger installed by the [`Module`][crate::wrapper::vst3::Module],
//! see `VST3_ADAPTER_LOG`.
//!
//! Formatting a log message allocates. Apart from [`adapter_trace!()`] and the assertion macros,
//! which permit allocations while they run, keep these out of the render context.

// `#[macro_export]` puts the macros at the crate root. The `pub use`s below make them importable
// from this module as well.

/// Log an informational message.
#[macro_export]
macro_rules! adapter_log {
    ($($args:tt)*) => (
        $crate::log::info!($($args)*)
    );
}
#[doc(inline)]
pub use adapter_log;

/// Log something the host or plugin did wrong that the adapter could recover from.
#[macro_export]
macro_rules! adapter_warn {
    ($($args:tt)*) => (
        $crate::log::warn!($($args)*)
    );
}
#[doc(inline)]
pub use adapter_warn;

/// Log an error the adapter could not recover from, such as a panic.
#[macro_export]
macro_rules! adapter_error {
    ($($args:tt)*) => (
        $crate::log::error!($($args)*)
    );
}
#[doc(inline)]
pub use adapter_error;

/// Verbose tracing for object lifetimes and message routing. Release builds filter these out
/// through `log`'s `release_max_level_info` feature. Safe to use with `assert_process_allocs`.
#[macro_export]
macro_rules! adapter_trace {
    ($($args:tt)*) => (
        $crate::util::permit_alloc(|| $crate::log::trace!($($args)*))
    );
}
#[doc(inline)]
pub use adapter_trace;

/// Check an invariant in debug builds. A violation is logged as a warning so a misbehaving host
/// does not take the whole process down. Unit tests turn it into a panic.
#[macro_export]
macro_rules! adapter_debug_assert {
    ($cond:expr $(,)?) => (
        #[allow(clippy::neg_cmp_op_on_partial_ord)]
        if cfg!(debug_assertions) && !$cond {
            $crate::adapter_debug_assert_failure!("`{}` does not hold", stringify!($cond));
        }
    );
    ($cond:expr, $($args:tt)+) => (
        #[allow(clippy::neg_cmp_op_on_partial_ord)]
        if cfg!(debug_assertions) && !$cond {
            $crate::adapter_debug_assert_failure!(
                "`{}` does not hold: {}",
                stringify!($cond),
                format_args!($($args)+)
            );
        }
    );
}
#[doc(inline)]
pub use adapter_debug_assert;

/// Report an invariant violation that was already detected by the caller. Behaves like a failed
/// [`adapter_debug_assert!()`].
#[macro_export]
macro_rules! adapter_debug_assert_failure {
    () => (
        $crate::adapter_debug_assert_failure!("invariant violated")
    );
    ($($args:tt)+) => (
        if cfg!(test) {
            panic!("Debug assertion failed: {}", format_args!($($args)+));
        } else if cfg!(debug_assertions) {
            $crate::util::permit_alloc(|| {
                $crate::log::warn!("Debug assertion failed: {}", format_args!($($args)+))
            });
        }
    );
}
#[doc(inline)]
pub use adapter_debug_assert_failure;
