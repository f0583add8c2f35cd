use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Debug,
}

impl Level {
    fn style(self) -> (&'static str, &'static str) {
        match self {
            Level::Info => ("\x1b[32m", "INFO"),  // Green
            Level::Warn => ("\x1b[33m", "WARN"),  // Yellow
            Level::Error => ("\x1b[31m", "ERRO"), // Red
            Level::Debug => ("\x1b[34m", "DEBG"), // Blue
        }
    }
}

/// 开关 Debug 级别输出（由 logger 插件配置驱动）
pub fn set_debug(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// 统一日志输出函数
/// 格式: [Time] [LEVEL] [Target] Message
/// Warn/Error 写入 stderr，其余写入 stdout
pub fn print(level: Level, target: &str, args: std::fmt::Arguments) {
    if level == Level::Debug && !debug_enabled() {
        return;
    }

    let now = Local::now().format("%H:%M:%S");
    let gray = "\x1b[90m";
    let reset = "\x1b[0m";
    let cyan = "\x1b[36m";
    let (color, level_str) = level.style();

    let line = format!(
        "{}[{}] {}[{}] {} {}[{}]{} {}",
        gray, now, color, level_str, reset, cyan, target, reset, args
    );

    match level {
        Level::Warn | Level::Error => eprintln!("{}", line),
        Level::Info | Level::Debug => println!("{}", line),
    }
}

#[macro_export]
macro_rules! info {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Info, $target, format_args!($($arg)+))
    );
    ($($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Info, "System", format_args!($($arg)+))
    );
}

#[macro_export]
macro_rules! warn {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Warn, $target, format_args!($($arg)+))
    );
    ($($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Warn, "System", format_args!($($arg)+))
    );
}

#[macro_export]
macro_rules! error {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Error, $target, format_args!($($arg)+))
    );
    ($($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Error, "System", format_args!($($arg)+))
    );
}

#[macro_export]
macro_rules! debug {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Debug, $target, format_args!($($arg)+))
    );
    ($($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Debug, "System", format_args!($($arg)+))
    );
}
