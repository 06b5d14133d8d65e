//! Kernel-style print macros for conq
//!
//! Leveled, line-atomic output to stderr in the spirit of printk. The queues
//! log rarely: internal errors, cancelled waits, and capacity shrinks.
//!
//! # Environment Variables
//!
//! - `CONQ_LOG_LEVEL=<level>` - off/error/warn/info/debug/trace or 0-5 (default: warn)
//! - `CONQ_FLUSH_EPRINT=1` - Flush stderr after each line
//!
//! Both are read once, on first use. `set_log_level` / `set_flush_enabled`
//! override them afterwards.
//!
//! # Usage
//!
//! ```ignore
//! use conq_core::{kdebug, kerror};
//!
//! kdebug!("dequeue cancelled after {:?}", waited);
//! kerror!("heap lost its head: {}", err);
//! ```

use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Once;

use crate::env::{env_get_bool, env_get_str, env_is_set};

/// Environment variable selecting the log level
pub const LOG_LEVEL_ENV: &str = "CONQ_LOG_LEVEL";

/// Environment variable enabling flush-after-write
pub const FLUSH_ENV: &str = "CONQ_FLUSH_EPRINT";

/// Log levels
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

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[conq ERROR]",
            LogLevel::Warn => "[conq WARN] ",
            LogLevel::Info => "[conq INFO] ",
            LogLevel::Debug => "[conq DEBUG]",
            LogLevel::Trace => "[conq TRACE]",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(LogLevel::Off),
            "error" | "1" => Ok(LogLevel::Error),
            "warn" | "2" => Ok(LogLevel::Warn),
            "info" | "3" => Ok(LogLevel::Info),
            "debug" | "4" => Ok(LogLevel::Debug),
            "trace" | "5" => Ok(LogLevel::Trace),
            _ => Err(()),
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
static INIT: Once = Once::new();

/// Initialize from environment variables
///
/// Runs at most once; called implicitly by the first log statement.
/// An unrecognized level falls back to warn and is reported once.
pub fn init() {
    let mut rejected = None;
    INIT.call_once(|| {
        let level = level_from_env(LOG_LEVEL_ENV).unwrap_or_else(|raw| {
            rejected = Some(raw);
            LogLevel::Warn
        });
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
        FLUSH_ENABLED.store(env_get_bool(FLUSH_ENV, false), Ordering::Relaxed);
    });
    if let Some(raw) = rejected {
        write_line(
            Some(LogLevel::Warn.prefix()),
            format_args!("ignoring unrecognized {}={:?}", LOG_LEVEL_ENV, raw),
        );
    }
}

/// Level named by `key`; unset means warn, an unparsable value is handed back
fn level_from_env(key: &str) -> Result<LogLevel, String> {
    if !env_is_set(key) {
        return Ok(LogLevel::Warn);
    }
    let raw = env_get_str(key, "");
    raw.parse().map_err(|()| raw)
}

/// Get current log level
#[inline]
pub fn log_level() -> LogLevel {
    init();
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically
pub fn set_log_level(level: LogLevel) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Set flush mode programmatically
pub fn set_flush_enabled(enabled: bool) {
    init();
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Check if a log level is enabled
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= log_level()
}

fn write_line(prefix: Option<&str>, args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    if let Some(prefix) = prefix {
        let _ = write!(handle, "{} ", prefix);
    }
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if FLUSH_ENABLED.load(Ordering::Relaxed) {
        let _ = handle.flush();
    }
}

#[doc(hidden)]
pub fn _kprintln_impl(args: std::fmt::Arguments<'_>) {
    init();
    write_line(None, args);
}

#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if level_enabled(level) {
        write_line(Some(level.prefix()), args);
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Print to stderr with newline, unconditionally
#[macro_export]
macro_rules! kprintln {
    () => {{
        $crate::kprint::_kprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::kprint::_kprintln_impl(format_args!($($arg)*));
    }};
}

/// Error level log
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warning level log
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info level log
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Debug level log
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Debug, format_args!($($arg)*));
    }};
}

/// Trace level log
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl($crate::kprint::LogLevel::Trace, format_args!($($arg)*));
    }};
}
