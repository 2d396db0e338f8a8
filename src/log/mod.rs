//! 日志模块
//!
//! 按级别过滤的日志宏，输出到可替换的 [`Logger`]。
//! 默认输出到标准错误，每条日志一行。
//! 日志只用于诊断，输出失败不会影响调度。

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::RwLock;
use std::io::Write;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(usize)]
pub enum LogLevel {
    /// 关闭日志
    Off = 0,
    /// 错误级别
    Error = 1,
    /// 警告级别
    Warn = 2,
    /// 信息级别
    Info = 3,
    /// 调试级别
    Debug = 4,
    /// 跟踪级别
    Trace = 5,
}

impl LogLevel {
    fn from_usize(v: usize) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// 全局日志级别
static GLOBAL_LOG_LEVEL: AtomicUsize = AtomicUsize::new(crate::config::DEFAULT_LOG_LEVEL as usize);

/// 设置全局日志级别
pub fn set_log_level(level: LogLevel) {
    GLOBAL_LOG_LEVEL.store(level as usize, Ordering::Relaxed);
}

/// 获取全局日志级别
pub fn get_log_level() -> LogLevel {
    LogLevel::from_usize(GLOBAL_LOG_LEVEL.load(Ordering::Relaxed))
}

/// 给定级别是否会被输出
#[inline(always)]
pub fn enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level as usize <= GLOBAL_LOG_LEVEL.load(Ordering::Relaxed)
}

/// 日志记录器特征
pub trait Logger: Send + Sync {
    /// 写入一条日志
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>);

    /// 刷新日志
    fn flush(&self) {}
}

/// 默认记录器，写到标准错误
pub struct StderrLogger;

impl Logger for StderrLogger {
    fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let mut out = std::io::stderr().lock();
        let _ = writeln!(out, "[{}] {}", level.as_str(), args);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static STDERR_LOGGER: StderrLogger = StderrLogger;
static LOGGER: RwLock<&'static dyn Logger> = RwLock::new(&STDERR_LOGGER);

/// 替换全局记录器，返回之前的记录器
pub fn set_logger(logger: &'static dyn Logger) -> &'static dyn Logger {
    core::mem::replace(&mut *LOGGER.write(), logger)
}

/// 恢复默认记录器
pub fn reset_logger() {
    set_logger(&STDERR_LOGGER);
}

/// 宏的落点，已经过级别过滤
#[doc(hidden)]
pub fn log_write(level: LogLevel, args: fmt::Arguments<'_>) {
    let logger = *LOGGER.read();
    logger.log(level, args);
}

/// 打印日志的宏，根据日志级别打印
#[macro_export]
macro_rules! log {
    ($level:expr, $($arg:tt)*) => {
        {
            let level = $level;
            if $crate::log::enabled(level) {
                $crate::log::log_write(level, format_args!($($arg)*));
            }
        }
    };
}

/// 错误级别日志
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!($crate::log::LogLevel::Error, $($arg)*)
    };
}

/// 警告级别日志
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!($crate::log::LogLevel::Warn, $($arg)*)
    };
}

/// 信息级别日志
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!($crate::log::LogLevel::Info, $($arg)*)
    };
}

/// 调试级别日志
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!($crate::log::LogLevel::Debug, $($arg)*)
    };
}

/// 跟踪级别日志
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!($crate::log::LogLevel::Trace, $($arg)*)
    };
}
