//! Leveled stderr logging for the shedder crates
//!
//! Lines are written under the stderr lock so output from the request
//! path and the background threads never interleaves mid-line. The level
//! check happens in the macro, before any formatting.
//!
//! # Environment Variables
//!
//! - `SHED_LOG_LEVEL=<level>` - off|error|warn|info|debug|trace or 0..5 (default info)
//! - `SHED_FLUSH_EPRINT=1` - Flush stderr after each line
//!
//! # Usage
//!
//! ```ignore
//! use shedder_core::{shed_info, shed_warn};
//!
//! shed_info!("CPU request for cgroup: {}m", millicores);
//! shed_warn!("sample failed: {}", err);
//! ```

use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Once;

/// Log levels, most severe first
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

const LEVELS: [LogLevel; 6] = [
    LogLevel::Off,
    LogLevel::Error,
    LogLevel::Warn,
    LogLevel::Info,
    LogLevel::Debug,
    LogLevel::Trace,
];

impl LogLevel {
    fn name(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Accepts a level name in any case or its digit
impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<usize>() {
            return LEVELS.get(n).copied().ok_or(());
        }
        LEVELS
            .iter()
            .copied()
            .find(|level| level.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static FLUSH: AtomicBool = AtomicBool::new(false);
static ENV: Once = Once::new();

/// Apply `SHED_LOG_LEVEL` and `SHED_FLUSH_EPRINT`.
///
/// Runs at most once, on the first log call if not called explicitly.
/// An unparseable level keeps the default.
pub fn init() {
    ENV.call_once(|| {
        if let Ok(val) = std::env::var("SHED_LOG_LEVEL") {
            if let Ok(level) = val.parse::<LogLevel>() {
                LEVEL.store(level as u8, Ordering::Relaxed);
            }
        }
        if let Ok(val) = std::env::var("SHED_FLUSH_EPRINT") {
            let flush = matches!(val.as_str(), "1" | "true" | "yes" | "on");
            FLUSH.store(flush, Ordering::Relaxed);
        }
    });
}

/// Set the level programmatically. The environment is not consulted
/// afterwards.
pub fn set_log_level(level: LogLevel) {
    ENV.call_once(|| {});
    LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_flush_enabled(enabled: bool) {
    FLUSH.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    init();
    level != LogLevel::Off && level as u8 <= LEVEL.load(Ordering::Relaxed)
}

#[doc(hidden)]
pub fn _write_line(level: LogLevel, args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    let _ = writeln!(out, "shedder {:<5} {}", level.name(), args);
    if FLUSH.load(Ordering::Relaxed) {
        let _ = out.flush();
    }
}

/// Log at a [`LogLevel`] variant: `shed_log!(Warn, "x = {}", x)`
#[macro_export]
macro_rules! shed_log {
    ($level:ident, $($arg:tt)*) => {{
        let level = $crate::logging::LogLevel::$level;
        if $crate::logging::level_enabled(level) {
            $crate::logging::_write_line(level, format_args!($($arg)*));
        }
    }};
}

#[macro_export]
macro_rules! shed_error {
    ($($arg:tt)*) => { $crate::shed_log!(Error, $($arg)*) };
}

#[macro_export]
macro_rules! shed_warn {
    ($($arg:tt)*) => { $crate::shed_log!(Warn, $($arg)*) };
}

#[macro_export]
macro_rules! shed_info {
    ($($arg:tt)*) => { $crate::shed_log!(Info, $($arg)*) };
}

#[macro_export]
macro_rules! shed_debug {
    ($($arg:tt)*) => { $crate::shed_log!(Debug, $($arg)*) };
}

#[macro_export]
macro_rules! shed_trace {
    ($($arg:tt)*) => { $crate::shed_log!(Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(LEVELS.windows(2).all(|w| w[0] < w[1]));
        assert!(LEVELS.iter().enumerate().all(|(i, l)| *l as usize == i));
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("WARN".parse(), Ok(LogLevel::Warn));
        assert_eq!(" 4 ".parse(), Ok(LogLevel::Debug));
        assert_eq!("off".parse(), Ok(LogLevel::Off));
        assert_eq!("loud".parse::<LogLevel>(), Err(()));
        assert_eq!("9".parse::<LogLevel>(), Err(()));
    }

    #[test]
    fn test_set_level_gates_output() {
        set_log_level(LogLevel::Warn);
        assert!(level_enabled(LogLevel::Error));
        assert!(level_enabled(LogLevel::Warn));
        assert!(!level_enabled(LogLevel::Info));
        assert!(!level_enabled(LogLevel::Off));

        set_log_level(LogLevel::Off);
        assert!(!level_enabled(LogLevel::Error));
        shed_error!("suppressed {}", 1);
        shed_warn!("suppressed");
        shed_info!("suppressed");
        shed_debug!("suppressed");
        shed_trace!("suppressed");
    }
}
