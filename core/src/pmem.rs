//! Persistent memory block
//!
//! A fixed-layout structure that lives in RAM which a soft reset does not
//! clear. It carries uptime bookkeeping across reboots and the persistent
//! diagnostic log (a ring buffer of NUL-terminated text records).
//!
//! # Layout
//!
//! ```text
//! id            u32   magic, PMEM_MAGIC once initialized
//! saved_time    u64   unix seconds of the last save, 0 = unknown
//! uptime        u64   microseconds, current session
//! prev_uptime   u64   microseconds, previous session
//! log_rb        RingState (4 x u32)
//! crc32         u32   CRC-32 over the fields above
//! log           [u8; LOG_AREA_LEN]
//! ```
//!
//! The checksum covers the header and the ring bookkeeping, not the log
//! bytes, so a log append costs a checksum over a few dozen bytes while
//! the persistent lock is held. Every field is a plain integer: whatever
//! garbage is found after a cold boot is a valid value, and
//! [`PersistentMemoryBlock::validate`] decides whether to trust it.
//!
//! Mutation from more than one execution context goes through a
//! [`PmemMutex`].

use core::fmt;

use crate::crc32::Crc32;
use crate::lock::BoundedMutex;
use crate::ringbuffer::{RingBuffer, RingError, RingState};

/// Magic identifier of an initialized block ("BPM1").
pub const PMEM_MAGIC: u32 = 0x4250_4D31;

/// Bytes backing the persistent log.
pub const LOG_AREA_LEN: usize = 8192;

/// Longest stored log record, terminator included.
pub const LOG_RECORD_MAX: usize = 255;

const RECORD_TERMINATOR: u8 = 0;

/// The persistent block shared between execution contexts.
pub type PmemMutex<'p, R> = BoundedMutex<R, &'p mut PersistentMemoryBlock>;

/// Why a block found at boot was not trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PmemError {
    /// Magic identifier absent (cold boot or never initialized)
    MissingMagic { found: u32 },
    /// Stored checksum does not match the content
    CrcMismatch { stored: u32, computed: u32 },
    /// Checksum matched but the ring bookkeeping is out of range
    CorruptRing,
}

impl fmt::Display for PmemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMagic { found } => write!(f, "no magic id (found 0x{:08x})", found),
            Self::CrcMismatch { stored, computed } => write!(
                f,
                "CRC mismatch (stored 0x{:08x}, computed 0x{:08x})",
                stored, computed
            ),
            Self::CorruptRing => write!(f, "log ring buffer state out of range"),
        }
    }
}

impl core::error::Error for PmemError {}

/// What [`PersistentMemoryBlock::boot`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootInfo {
    /// The block was valid and its content was kept
    pub restored: bool,
    /// Why the block was reinitialized, if it was
    pub reset_cause: Option<PmemError>,
    /// Uptime of the previous session in microseconds (0 if not restored)
    pub prev_uptime_us: u64,
    /// Last saved wall-clock time, if one was ever recorded
    pub saved_time: Option<u64>,
    /// The hardware watchdog caused the last reset
    pub rebooted_by_watchdog: bool,
}

#[repr(C)]
pub struct PersistentMemoryBlock {
    id: u32,
    saved_time: u64,
    uptime: u64,
    prev_uptime: u64,
    log_rb: RingState,
    crc32: u32,
    log: [u8; LOG_AREA_LEN],
}

impl PersistentMemoryBlock {
    /// An all-zero block; not valid until [`boot`](Self::boot) or
    /// [`reset`](Self::reset) runs.
    pub const fn zeroed() -> Self {
        Self {
            id: 0,
            saved_time: 0,
            uptime: 0,
            prev_uptime: 0,
            log_rb: RingState::new(0),
            crc32: 0,
            log: [0; LOG_AREA_LEN],
        }
    }

    pub fn compute_crc(&self) -> u32 {
        let mut crc = Crc32::new();
        crc.update(&self.id.to_le_bytes());
        crc.update(&self.saved_time.to_le_bytes());
        crc.update(&self.uptime.to_le_bytes());
        crc.update(&self.prev_uptime.to_le_bytes());
        crc.update(&self.log_rb.to_le_bytes());
        crc.finish()
    }

    pub fn update_crc(&mut self) {
        self.crc32 = self.compute_crc();
    }

    pub fn stored_crc(&self) -> u32 {
        self.crc32
    }

    pub fn validate(&self) -> Result<(), PmemError> {
        if self.id != PMEM_MAGIC {
            return Err(PmemError::MissingMagic { found: self.id });
        }
        let computed = self.compute_crc();
        if computed != self.crc32 {
            return Err(PmemError::CrcMismatch {
                stored: self.crc32,
                computed,
            });
        }
        if !self.log_rb.is_consistent(LOG_AREA_LEN) {
            return Err(PmemError::CorruptRing);
        }
        Ok(())
    }

    /// Reinitialize: counters zeroed, log emptied, magic and CRC written.
    pub fn reset(&mut self) {
        self.id = PMEM_MAGIC;
        self.saved_time = 0;
        self.uptime = 0;
        self.prev_uptime = 0;
        self.log_rb = RingState::new(LOG_AREA_LEN as u32);
        self.log.fill(0);
        self.update_crc();
    }

    /// Boot-time validation.
    ///
    /// A valid block is kept and its uptime rolled into `prev_uptime`;
    /// anything else is reinitialized.
    pub fn boot(&mut self, rebooted_by_watchdog: bool) -> BootInfo {
        let reset_cause = self.validate().err();
        if reset_cause.is_some() {
            self.reset();
        } else {
            self.prev_uptime = self.uptime;
            self.uptime = 0;
            self.update_crc();
        }

        BootInfo {
            restored: reset_cause.is_none(),
            reset_cause,
            prev_uptime_us: self.prev_uptime,
            saved_time: self.saved_time(),
            rebooted_by_watchdog,
        }
    }

    /// Explicit factory reset; same as [`reset`](Self::reset).
    pub fn factory_reset(&mut self) {
        self.reset();
    }

    /// Record the current session uptime and, if known, the wall-clock time.
    pub fn record_uptime(&mut self, uptime_us: u64, saved_time: Option<u64>) {
        self.uptime = uptime_us;
        if let Some(t) = saved_time {
            self.saved_time = t;
        }
        self.update_crc();
    }

    pub fn uptime_us(&self) -> u64 {
        self.uptime
    }

    pub fn prev_uptime_us(&self) -> u64 {
        self.prev_uptime
    }

    pub fn saved_time(&self) -> Option<u64> {
        match self.saved_time {
            0 => None,
            t => Some(t),
        }
    }

    fn log_ring(&mut self) -> RingBuffer<'_> {
        RingBuffer::attach(&mut self.log_rb, &mut self.log)
    }

    /// Append one text record to the persistent log and refresh the CRC.
    ///
    /// Records are cut at the first NUL and at `LOG_RECORD_MAX - 1` bytes.
    /// Whole old records are evicted to make room, so the log never starts
    /// in the middle of a line.
    pub fn append_log(&mut self, record: &[u8]) -> Result<(), RingError> {
        let record = record
            .split(|&b| b == RECORD_TERMINATOR)
            .next()
            .unwrap_or_default();
        let record = &record[..record.len().min(LOG_RECORD_MAX - 1)];

        let result = {
            let mut ring = self.log_ring();
            while ring.free() < record.len() + 1 && !ring.is_empty() {
                ring.discard_through(RECORD_TERMINATOR);
            }
            ring.push(record, false)
                .and_then(|()| ring.push(&[RECORD_TERMINATOR], false))
        };
        self.update_crc();
        result
    }

    pub fn clear_log(&mut self) {
        self.log_ring().clear();
        self.update_crc();
    }

    /// Bytes currently held by the log, terminators included.
    pub fn log_len(&self) -> usize {
        self.log_rb.len()
    }

    /// Log bytes evicted to make room for newer records.
    pub fn log_dropped(&self) -> u32 {
        self.log_rb.dropped()
    }

    /// Stored log records, oldest first.
    pub fn log_lines(&self) -> LogLines<'_> {
        let (a, b) = self.log_rb.slices(&self.log);
        LogLines {
            bytes: a.iter().chain(b.iter()),
        }
    }
}

/// One record read back from the persistent log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine(heapless::Vec<u8, LOG_RECORD_MAX>);

impl LogLine {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The record as text, cut at the first invalid UTF-8 sequence.
    pub fn as_str(&self) -> &str {
        match core::str::from_utf8(&self.0) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&self.0[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

/// Iterator over the persistent log; see [`PersistentMemoryBlock::log_lines`].
pub struct LogLines<'a> {
    bytes: core::iter::Chain<core::slice::Iter<'a, u8>, core::slice::Iter<'a, u8>>,
}

impl Iterator for LogLines<'_> {
    type Item = LogLine;

    fn next(&mut self) -> Option<LogLine> {
        let mut line = heapless::Vec::new();
        let mut seen_any = false;
        for &b in self.bytes.by_ref() {
            seen_any = true;
            if b == RECORD_TERMINATOR {
                return Some(LogLine(line));
            }
            // Records are capped on append; anything longer is truncated.
            let _ = line.push(b);
        }
        seen_any.then_some(LogLine(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;
    use std::string::String;
    use std::vec::Vec;

    fn fresh() -> Box<PersistentMemoryBlock> {
        let mut block = Box::new(PersistentMemoryBlock::zeroed());
        block.boot(false);
        block
    }

    fn lines(block: &PersistentMemoryBlock) -> Vec<String> {
        block.log_lines().map(|l| l.as_str().into()).collect()
    }

    #[test]
    fn zeroed_block_is_reset_at_boot() {
        let mut block = Box::new(PersistentMemoryBlock::zeroed());
        let info = block.boot(false);
        assert!(!info.restored);
        assert_eq!(info.reset_cause, Some(PmemError::MissingMagic { found: 0 }));
        assert_eq!(block.validate(), Ok(()));
        assert_eq!(block.log_len(), 0);
    }

    #[test]
    fn valid_block_survives_reboot() {
        let mut block = fresh();
        block.append_log(b"first").unwrap();
        block.record_uptime(5_000_000, Some(1_700_000_000));

        let info = block.boot(true);
        assert!(info.restored);
        assert_eq!(info.reset_cause, None);
        assert_eq!(info.prev_uptime_us, 5_000_000);
        assert_eq!(info.saved_time, Some(1_700_000_000));
        assert!(info.rebooted_by_watchdog);
        assert_eq!(block.uptime_us(), 0);
        assert_eq!(lines(&block), ["first"]);
    }

    #[test]
    fn corrupted_covered_byte_is_detected() {
        let mut block = fresh();
        block.append_log(b"hello").unwrap();
        block.record_uptime(42, None);
        assert_eq!(block.validate(), Ok(()));

        block.uptime ^= 1 << 17;
        assert!(matches!(
            block.validate(),
            Err(PmemError::CrcMismatch { .. })
        ));

        let info = block.boot(false);
        assert!(!info.restored);
        assert_eq!(block.log_len(), 0);
        assert_eq!(block.prev_uptime_us(), 0);
    }

    #[test]
    fn corrupted_ring_state_is_detected() {
        let mut block = fresh();
        block.log_rb = RingState::new(123);
        block.update_crc();
        assert_eq!(block.validate(), Err(PmemError::CorruptRing));
    }

    #[test]
    fn every_header_byte_is_covered() {
        let block = fresh();
        let reference = block.compute_crc();
        for bit in [0u32, 7, 31] {
            let mut copy = fresh();
            copy.id ^= 1 << bit;
            assert_ne!(copy.compute_crc(), reference);
            let mut copy = fresh();
            copy.saved_time ^= 1 << bit;
            assert_ne!(copy.compute_crc(), reference);
            let mut copy = fresh();
            copy.prev_uptime ^= 1 << bit;
            assert_ne!(copy.compute_crc(), reference);
        }
    }

    #[test]
    fn records_are_truncated_and_cut_at_nul() {
        let mut block = fresh();
        block.append_log(&[b'x'; 400]).unwrap();
        block.append_log(b"before\0after").unwrap();
        let stored = lines(&block);
        assert_eq!(stored[0].len(), LOG_RECORD_MAX - 1);
        assert_eq!(stored[1], "before");
    }

    #[test]
    fn wraparound_evicts_whole_records() {
        let mut block = fresh();
        let mut written = Vec::new();
        for i in 0..1000 {
            let line = std::format!("record number {:04} with some padding text", i);
            block.append_log(line.as_bytes()).unwrap();
            written.push(line);
        }
        assert!(block.log_len() <= LOG_AREA_LEN);
        assert!(block.log_dropped() > 0);

        let stored = lines(&block);
        assert!(!stored.is_empty());
        // A contiguous suffix of what was written, starting on a record boundary.
        assert_eq!(stored.as_slice(), &written[written.len() - stored.len()..]);
        assert_eq!(block.validate(), Ok(()));
    }

    #[test]
    fn clear_log_keeps_block_valid() {
        let mut block = fresh();
        block.append_log(b"x").unwrap();
        block.clear_log();
        assert_eq!(block.log_len(), 0);
        assert_eq!(block.validate(), Ok(()));
    }

    #[test]
    fn invalid_utf8_is_cut() {
        let mut block = fresh();
        block.append_log(&[b'o', b'k', 0xFF, b'!']).unwrap();
        let line = block.log_lines().next().unwrap();
        assert_eq!(line.as_str(), "ok");
        assert_eq!(line.as_bytes().len(), 4);
    }
}
