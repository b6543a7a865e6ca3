//! Formatting into fixed-capacity strings with silent truncation

use core::fmt;

use heapless::String;

/// `fmt::Write` adapter that keeps whatever fits and drops the rest.
///
/// `heapless::String` refuses a whole `write_str` that does not fit; this
/// writes the fitting prefix instead, cut on a character boundary.
pub struct TruncatingWriter<'a, const N: usize> {
    buf: &'a mut String<N>,
    truncated: bool,
}

impl<'a, const N: usize> TruncatingWriter<'a, N> {
    pub fn new(buf: &'a mut String<N>) -> Self {
        Self {
            buf,
            truncated: false,
        }
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<const N: usize> fmt::Write for TruncatingWriter<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.buf.len();
        let mut end = s.len().min(room);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        if end < s.len() {
            self.truncated = true;
        }
        // Cannot fail: `end` bytes fit by construction.
        let _ = self.buf.push_str(&s[..end]);
        Ok(())
    }
}

/// Format `args` into a fresh `String<N>`, truncating silently.
pub fn format_truncated<const N: usize>(args: fmt::Arguments<'_>) -> String<N> {
    let mut out = String::new();
    let _ = fmt::Write::write_fmt(&mut TruncatingWriter::new(&mut out), args);
    out
}
