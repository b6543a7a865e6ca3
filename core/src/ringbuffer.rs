//! Fixed-capacity circular byte store
//!
//! The bookkeeping ([`RingState`]) and the backing bytes are kept apart so
//! that both can live inside a `#[repr(C)]` block that survives a soft
//! reset. The state holds indices only, never pointers, so it stays valid
//! wherever the block is mapped.
//!
//! Appends are variable-length and the store is most-recent-wins: with
//! `overwrite` set, the oldest bytes are evicted to make room instead of
//! failing.

use core::fmt;

/// Ring buffer bookkeeping.
///
/// All fields are plain integers so that any bit pattern is a valid value;
/// [`RingState::is_consistent`] decides whether it can be trusted.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingState {
    capacity: u32,
    /// Next write position.
    head: u32,
    /// Occupied bytes.
    len: u32,
    /// Bytes evicted by overwriting appends (saturating).
    dropped: u32,
}

/// Size of [`RingState`] when serialized with [`RingState::to_le_bytes`].
pub const RING_STATE_LEN: usize = 16;

impl RingState {
    pub const fn new(capacity: u32) -> Self {
        Self {
            capacity,
            head: 0,
            len: 0,
            dropped: 0,
        }
    }

    /// True if this state describes a usable buffer over `storage_len` bytes.
    pub fn is_consistent(&self, storage_len: usize) -> bool {
        storage_len > 0
            && self.capacity as usize == storage_len
            && self.head < self.capacity
            && self.len <= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    fn tail(&self) -> usize {
        let cap = self.capacity as usize;
        if cap == 0 {
            return 0;
        }
        (self.head as usize + cap - self.len as usize) % cap
    }

    /// Occupied bytes of `storage`, oldest first, as at most two slices.
    ///
    /// `storage` must be the buffer this state was attached to.
    pub fn slices<'s>(&self, storage: &'s [u8]) -> (&'s [u8], &'s [u8]) {
        let len = self.len as usize;
        if len == 0 {
            return (&[], &[]);
        }
        let tail = self.tail();
        if tail + len <= storage.len() {
            (&storage[tail..tail + len], &[])
        } else {
            (&storage[tail..], &storage[..self.head as usize])
        }
    }

    /// Little-endian serialization, used for checksumming.
    pub fn to_le_bytes(&self) -> [u8; RING_STATE_LEN] {
        let mut out = [0u8; RING_STATE_LEN];
        out[0..4].copy_from_slice(&self.capacity.to_le_bytes());
        out[4..8].copy_from_slice(&self.head.to_le_bytes());
        out[8..12].copy_from_slice(&self.len.to_le_bytes());
        out[12..16].copy_from_slice(&self.dropped.to_le_bytes());
        out
    }
}

/// Ring buffer operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RingError {
    /// Record is larger than the whole buffer
    TooLarge { len: usize, capacity: usize },
    /// Not enough free space and overwriting was not requested
    Full,
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { len, capacity } => {
                write!(f, "record of {} bytes exceeds capacity {}", len, capacity)
            }
            Self::Full => write!(f, "ring buffer full"),
        }
    }
}

impl core::error::Error for RingError {}

/// Mutable view joining a [`RingState`] to its backing bytes.
pub struct RingBuffer<'a> {
    state: &'a mut RingState,
    storage: &'a mut [u8],
}

impl<'a> RingBuffer<'a> {
    /// Attach `state` to `storage`.
    ///
    /// If the state does not describe `storage` (garbage after a cold boot,
    /// a resized buffer) it is reset to an empty buffer first.
    pub fn attach(state: &'a mut RingState, storage: &'a mut [u8]) -> Self {
        if !state.is_consistent(storage.len()) {
            *state = RingState::new(storage.len() as u32);
        }
        Self { state, storage }
    }

    pub fn capacity(&self) -> usize {
        self.state.capacity()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Bytes lost to overwriting appends since the last [`clear`](Self::clear).
    pub fn dropped(&self) -> u32 {
        self.state.dropped
    }

    /// Append `data` as one contiguous run.
    ///
    /// With `overwrite`, the oldest bytes are evicted when space runs out.
    pub fn push(&mut self, data: &[u8], overwrite: bool) -> Result<(), RingError> {
        if data.is_empty() {
            return Ok(());
        }
        let cap = self.capacity();
        if data.len() > cap {
            return Err(RingError::TooLarge {
                len: data.len(),
                capacity: cap,
            });
        }
        if data.len() > self.free() {
            if !overwrite {
                return Err(RingError::Full);
            }
            self.discard(data.len() - self.free());
        }

        let head = self.state.head as usize;
        let first = data.len().min(cap - head);
        self.storage[head..head + first].copy_from_slice(&data[..first]);
        self.storage[..data.len() - first].copy_from_slice(&data[first..]);

        self.state.head = ((head + data.len()) % cap) as u32;
        self.state.len += data.len() as u32;
        Ok(())
    }

    /// Drop up to `count` of the oldest bytes. Returns how many were dropped.
    pub fn discard(&mut self, count: usize) -> usize {
        let n = count.min(self.len());
        self.state.len -= n as u32;
        self.state.dropped = self.state.dropped.saturating_add(n as u32);
        n
    }

    /// Drop the oldest bytes up to and including the first `delimiter`.
    ///
    /// Drops everything if no delimiter is stored.
    pub fn discard_through(&mut self, delimiter: u8) -> usize {
        let count = match self.iter().position(|b| b == delimiter) {
            Some(pos) => pos + 1,
            None => self.len(),
        };
        self.discard(count)
    }

    pub fn clear(&mut self) {
        *self.state = RingState::new(self.storage.len() as u32);
    }

    pub fn as_slices(&self) -> (&[u8], &[u8]) {
        self.state.slices(self.storage)
    }

    /// Stored bytes, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        let (a, b) = self.as_slices();
        a.iter().chain(b.iter()).copied()
    }

    /// Copy the stored bytes, oldest first, into `out`. Returns the count copied.
    pub fn copy_to(&self, out: &mut [u8]) -> usize {
        let (a, b) = self.as_slices();
        let n_a = a.len().min(out.len());
        out[..n_a].copy_from_slice(&a[..n_a]);
        let n_b = b.len().min(out.len() - n_a);
        out[n_a..n_a + n_b].copy_from_slice(&b[..n_b]);
        n_a + n_b
    }
}
