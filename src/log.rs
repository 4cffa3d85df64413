use crate::logging::TraceLogger;
use ::log::{LevelFilter, SetLoggerError};

/// Install `logger` as the process logger. The allocator itself never
/// calls this; wiring a sink up is left to the application.
pub fn init_trace_log(logger: TraceLogger, level: LevelFilter) -> Result<(), SetLoggerError> {
    ::log::set_boxed_logger(Box::new(logger)).map(|()| ::log::set_max_level(level))
}

/// Arena log support.
/// This takes the module as the first parameter. This module can be used
/// for conditional compilation.
/// This also supports logs without a module. Those logs are not filtered.
/// Those type of logs are stored using the target "default".
#[macro_export]
macro_rules! arena_log {
    (memory, $lvl:expr, $($arg:tt)+) => {
        #[cfg(feature = "log-memory")]
        ::log::log!(target: "memory", $lvl, $($arg)+)
    };

    // Default logs.
    ($lvl:expr, $($arg:tt)+) => (::log::log!(target: "default", $lvl, $($arg)+));
}

/// Trace logs for the arena.
#[macro_export]
macro_rules! arena_trace {
    ($module:ident, $($arg:tt)+) => ($crate::arena_log!($module, ::log::Level::Trace, $($arg)+));
    ($($arg:tt)+) => ($crate::arena_log!(::log::Level::Trace, $($arg)+));
}

/// Debug logs for the arena.
#[macro_export]
macro_rules! arena_debug {
    ($module:ident, $($arg:tt)+) => ($crate::arena_log!($module, ::log::Level::Debug, $($arg)+));
    ($($arg:tt)+) => ($crate::arena_log!(::log::Level::Debug, $($arg)+));
}

/// Info logs for the arena. Only used on the default target.
#[macro_export]
macro_rules! arena_info {
    ($($arg:tt)+) => ($crate::arena_log!(::log::Level::Info, $($arg)+));
}

/// Warn logs for the arena.
#[macro_export]
macro_rules! arena_warn {
    ($module:ident, $($arg:tt)+) => ($crate::arena_log!($module, ::log::Level::Warn, $($arg)+));
    ($($arg:tt)+) => ($crate::arena_log!(::log::Level::Warn, $($arg)+));
}

/// Error logs for the arena. Only used on the default target.
#[macro_export]
macro_rules! arena_error {
    ($($arg:tt)+) => ($crate::arena_log!(::log::Level::Error, $($arg)+));
}
