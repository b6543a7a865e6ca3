//! Diagnostic logger
//!
//! Messages go to three places, each gated by its own level:
//!
//! - the console, prefixed with `[seconds.micros][core]`;
//! - the persistent log in the [`PersistentMemoryBlock`], appended under the
//!   cross-core [`PmemMutex`] with a bounded wait;
//! - a remote (syslog-style) sink.
//!
//! Persistence is best effort. When the lock cannot be taken in time the
//! record is dropped and a console note says so; the caller never sees an
//! error.
//!
//! [`PersistentMemoryBlock`]: crate::pmem::PersistentMemoryBlock

mod priority;
mod writer;

pub use priority::{Facility, Priority};
pub use writer::{format_truncated, TruncatingWriter};

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use hal_abstractions::{
    Console, CoreIdentity, MonotonicClock, NoRemoteLog, RawBoundedLock, RemoteLogSink,
};
use heapless::String;

use crate::lock::LockTimeout;
use crate::pmem::{LogLine, PmemMutex, LOG_RECORD_MAX};

/// Longest formatted message; longer output is truncated.
pub const LOG_MSG_MAX: usize = 256;

/// Log calls slower than this print a note in debug builds.
const SLOW_LOG_US: u64 = 10_000;

const CONSOLE_LINE_MAX: usize = LOG_MSG_MAX + 32;

/// Logger levels and limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogConfig {
    /// Console and persistent log threshold
    pub log_level: Priority,
    /// Remote sink threshold
    pub syslog_level: Priority,
    /// `debug()` verbosity; higher shows more
    pub debug_level: u8,
    /// Longest wait for the persistent memory lock
    pub lock_timeout_us: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: Priority::Err,
            syslog_level: Priority::Err,
            debug_level: 0,
            lock_timeout_us: 100,
        }
    }
}

/// What happened to one [`Logger::log`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogStatus {
    /// Below every configured level; nothing was done
    Suppressed,
    Logged {
        /// Printed on the console (and an append attempted)
        console: bool,
        /// Appended to the persistent log
        persisted: bool,
    },
}

/// Levels readable and adjustable from any core.
struct LogLevels {
    log: AtomicU8,
    syslog: AtomicU8,
    debug: AtomicU8,
}

impl LogLevels {
    fn new(config: &LogConfig) -> Self {
        Self {
            log: AtomicU8::new(config.log_level as u8),
            syslog: AtomicU8::new(config.syslog_level as u8),
            debug: AtomicU8::new(config.debug_level),
        }
    }

    fn get(level: &AtomicU8) -> Priority {
        Priority::from_u8(level.load(Ordering::Relaxed)).unwrap_or(Priority::Debug)
    }
}

/// Console timestamp `[     s.uuuuuu][core]`.
struct Stamp {
    micros: u64,
    core: u8,
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:6}.{:06}][{}]",
            self.micros / 1_000_000,
            self.micros % 1_000_000,
            self.core
        )
    }
}

/// The diagnostic logger, shared by reference between cores.
///
/// `P` supplies time, the core id, and the console; `S` is the remote sink.
pub struct Logger<'m, 'p, R, P, S = NoRemoteLog> {
    pmem: &'m PmemMutex<'p, R>,
    platform: P,
    remote: S,
    levels: LogLevels,
    lock_timeout_us: u64,
}

impl<'m, 'p, R, P> Logger<'m, 'p, R, P, NoRemoteLog>
where
    R: RawBoundedLock,
    P: MonotonicClock + CoreIdentity + Console,
{
    pub fn new(pmem: &'m PmemMutex<'p, R>, platform: P, config: &LogConfig) -> Self {
        Self::with_remote(pmem, platform, NoRemoteLog, config)
    }
}

impl<'m, 'p, R, P, S> Logger<'m, 'p, R, P, S>
where
    R: RawBoundedLock,
    P: MonotonicClock + CoreIdentity + Console,
    S: RemoteLogSink,
{
    pub fn with_remote(
        pmem: &'m PmemMutex<'p, R>,
        platform: P,
        remote: S,
        config: &LogConfig,
    ) -> Self {
        Self {
            pmem,
            platform,
            remote,
            levels: LogLevels::new(config),
            lock_timeout_us: config.lock_timeout_us,
        }
    }

    pub fn log_level(&self) -> Priority {
        LogLevels::get(&self.levels.log)
    }

    pub fn set_log_level(&self, level: Priority) {
        self.levels.log.store(level as u8, Ordering::Relaxed);
    }

    pub fn syslog_level(&self) -> Priority {
        LogLevels::get(&self.levels.syslog)
    }

    pub fn set_syslog_level(&self, level: Priority) {
        self.levels.syslog.store(level as u8, Ordering::Relaxed);
    }

    pub fn debug_level(&self) -> u8 {
        self.levels.debug.load(Ordering::Relaxed)
    }

    pub fn set_debug_level(&self, level: u8) {
        self.levels.debug.store(level, Ordering::Relaxed);
    }

    /// The guarded persistent block, for other writers on any core.
    pub fn pmem(&self) -> &'m PmemMutex<'p, R> {
        self.pmem
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Log one message. See the module docs for where it goes.
    pub fn log(&self, priority: Priority, args: fmt::Arguments<'_>) -> LogStatus {
        let local = priority <= self.log_level();
        let remote = priority <= self.syslog_level();
        if !local && !remote {
            return LogStatus::Suppressed;
        }

        let start = self.platform.now_micros();
        let mut msg: String<LOG_MSG_MAX> = format_truncated(args);
        if msg.ends_with('\n') {
            msg.pop();
        }

        let mut persisted = false;
        if local {
            let stamp = Stamp {
                micros: self.platform.now_micros(),
                core: self.platform.core_id(),
            };
            let line: String<CONSOLE_LINE_MAX> =
                format_truncated(format_args!("{} {}", stamp, msg));
            self.platform.write_line(&line);

            // Formatted before locking so the critical section is append + CRC.
            let record: String<LOG_RECORD_MAX> =
                format_truncated(format_args!("{} {}", stamp, msg));
            persisted = self.persist(record.as_bytes(), &stamp);
        }

        if remote {
            self.remote.forward(priority as u8, &msg);
        }

        let elapsed = self.platform.now_micros().saturating_sub(start);
        if cfg!(debug_assertions) && elapsed > SLOW_LOG_US {
            let note: String<96> = format_truncated(format_args!(
                "log_msg: core{}: slow log call (duration={} us)",
                self.platform.core_id(),
                elapsed
            ));
            self.platform.write_line(&note);
        }

        LogStatus::Logged {
            console: local,
            persisted,
        }
    }

    fn persist(&self, record: &[u8], stamp: &Stamp) -> bool {
        match self.pmem.lock_timeout(&self.platform, self.lock_timeout_us) {
            Ok(mut pmem) => pmem.append_log(record).is_ok(),
            Err(_) => {
                let note: String<96> = format_truncated(format_args!(
                    "{} mutex timeout: FAILED to access log ringbuffer",
                    stamp
                ));
                self.platform.write_line(&note);
                false
            }
        }
    }

    /// Console-only debug output, shown when `level <= debug_level`.
    pub fn debug(&self, level: u8, args: fmt::Arguments<'_>) -> bool {
        if level > self.debug_level() {
            return false;
        }
        let line: String<CONSOLE_LINE_MAX> =
            format_truncated(format_args!("[DEBUG] {}", args));
        self.platform.write_line(line.trim_end_matches('\n'));
        true
    }

    /// Visit the persistent log oldest first, holding the lock throughout.
    ///
    /// Returns the number of lines visited.
    pub fn for_each_log_line<F>(&self, mut f: F) -> Result<usize, LockTimeout>
    where
        F: FnMut(&LogLine),
    {
        let pmem = self.pmem.lock_timeout(&self.platform, self.lock_timeout_us)?;
        let mut count = 0;
        for line in pmem.log_lines() {
            f(&line);
            count += 1;
        }
        Ok(count)
    }
}

/// `log_msg!(logger, Priority::Info, "fmt", args...)`
#[macro_export]
macro_rules! log_msg {
    ($logger:expr, $priority:expr, $($arg:tt)+) => {
        $logger.log($priority, ::core::format_args!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{AtomicFlagLock, BoundedMutex};
    use crate::pmem::PersistentMemoryBlock;
    use core::cell::{Cell, RefCell};
    use std::boxed::Box;
    use std::string::{String as StdString, ToString};
    use std::vec::Vec;

    struct TestPlatform {
        now: Cell<u64>,
        lines: RefCell<Vec<StdString>>,
    }

    impl TestPlatform {
        fn new() -> Self {
            Self {
                now: Cell::new(1_234_567),
                lines: RefCell::new(Vec::new()),
            }
        }
    }

    impl MonotonicClock for TestPlatform {
        fn now_micros(&self) -> u64 {
            let t = self.now.get();
            self.now.set(t + 1);
            t
        }
    }

    impl CoreIdentity for TestPlatform {
        fn core_id(&self) -> u8 {
            0
        }
    }

    impl Console for TestPlatform {
        fn write_line(&self, line: &str) {
            self.lines.borrow_mut().push(line.to_string());
        }
    }

    fn block() -> Box<PersistentMemoryBlock> {
        let mut b = Box::new(PersistentMemoryBlock::zeroed());
        b.boot(false);
        b
    }

    #[test]
    fn console_line_has_timestamp_and_core() {
        let mut b = block();
        let pmem = BoundedMutex::new(AtomicFlagLock::new(), &mut *b);
        let logger = Logger::new(&pmem, TestPlatform::new(), &LogConfig::default());

        let status = log_msg!(logger, Priority::Err, "value={}\n", 7);
        assert_eq!(
            status,
            LogStatus::Logged {
                console: true,
                persisted: true
            }
        );
        let lines = logger.platform().lines.borrow();
        assert_eq!(lines[0], "[     1.234568][0] value=7");
    }

    #[test]
    fn persisted_record_matches_console() {
        let mut b = block();
        let pmem = BoundedMutex::new(AtomicFlagLock::new(), &mut *b);
        let logger = Logger::new(&pmem, TestPlatform::new(), &LogConfig::default());
        log_msg!(logger, Priority::Crit, "disk on fire");

        let mut stored = Vec::new();
        let n = logger
            .for_each_log_line(|l| stored.push(l.as_str().to_string()))
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(stored[0], logger.platform().lines.borrow()[0]);
    }

    #[test]
    fn below_both_levels_is_suppressed() {
        let mut b = block();
        let pmem = BoundedMutex::new(AtomicFlagLock::new(), &mut *b);
        let logger = Logger::new(&pmem, TestPlatform::new(), &LogConfig::default());

        assert_eq!(log_msg!(logger, Priority::Info, "quiet"), LogStatus::Suppressed);
        assert!(logger.platform().lines.borrow().is_empty());
        drop(logger);
        drop(pmem);
        assert_eq!(b.log_len(), 0);
    }

    #[test]
    fn level_changes_take_effect() {
        let mut b = block();
        let pmem = BoundedMutex::new(AtomicFlagLock::new(), &mut *b);
        let logger = Logger::new(&pmem, TestPlatform::new(), &LogConfig::default());
        logger.set_log_level(Priority::Info);
        assert_eq!(logger.log_level(), Priority::Info);
        assert!(matches!(
            log_msg!(logger, Priority::Info, "now visible"),
            LogStatus::Logged { console: true, .. }
        ));
    }

    #[test]
    fn debug_respects_level_and_skips_pmem() {
        let mut b = block();
        let pmem = BoundedMutex::new(AtomicFlagLock::new(), &mut *b);
        let logger = Logger::new(&pmem, TestPlatform::new(), &LogConfig::default());

        assert!(!logger.debug(1, format_args!("hidden")));
        logger.set_debug_level(2);
        assert!(logger.debug(2, format_args!("shown {}", 1)));
        assert!(!logger.debug(3, format_args!("too verbose")));
        assert_eq!(*logger.platform().lines.borrow(), ["[DEBUG] shown 1"]);
        assert_eq!(logger.for_each_log_line(|_| {}), Ok(0));
    }

    #[test]
    fn long_messages_are_truncated() {
        let mut b = block();
        let pmem = BoundedMutex::new(AtomicFlagLock::new(), &mut *b);
        let logger = Logger::new(&pmem, TestPlatform::new(), &LogConfig::default());
        let long = "y".repeat(1000);
        log_msg!(logger, Priority::Err, "{}", long);

        let mut len = 0;
        logger.for_each_log_line(|l| len = l.as_bytes().len()).unwrap();
        assert_eq!(len, LOG_RECORD_MAX - 1);
    }
}
