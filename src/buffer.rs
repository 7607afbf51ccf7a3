//! Byte-buffered pull input.
//!
//! Wraps any [`Read`] source in a single growable buffer with a sliding
//! window. Text mode pulls lines out of the window; binary mode pulls exact
//! byte spans. Bytes before the current consumption point are discarded by a
//! compacting move whenever the buffer is refilled, so the buffer never grows
//! to the full size of the file.

use std::io::{self, Read};

use crate::error::Error;

/// Bytes requested from the source in one refill.
const READ_CHUNK: usize = 4 << 20;

pub(crate) struct FileBuf<R> {
    src: R,
    buf: Vec<u8>,
    /// Start of the region still referenced by outstanding tokens. Doubles
    /// as the consumption cursor in binary mode.
    line_start: usize,
    /// End of the current line's content (exclusive).
    line_end: usize,
    /// Start of the next unread line, or `buf.len() + 1` once the final
    /// line has been handed out.
    next_line_start: usize,
    /// The source has reported EOF.
    eof: bool,
}

impl<R: Read> FileBuf<R> {
    pub fn new(src: R) -> Self {
        FileBuf {
            src,
            buf: Vec::new(),
            line_start: 0,
            line_end: 0,
            next_line_start: 0,
            eof: false,
        }
    }

    /// Discard consumed bytes and pull one chunk from the source.
    fn refill(&mut self) -> Result<usize, Error> {
        if self.line_start > 0 {
            self.buf.drain(..self.line_start);
            self.next_line_start -= self.line_start;
            self.line_end = self.line_end.saturating_sub(self.line_start);
            self.line_start = 0;
        }
        let old = self.buf.len();
        self.buf.resize(old + READ_CHUNK, 0);
        let n = match self.src.read(&mut self.buf[old..]) {
            Ok(n) => n,
            Err(e) => {
                self.buf.truncate(old);
                return Err(e.into());
            }
        };
        self.buf.truncate(old + n);
        Ok(n)
    }

    /// Advance to the next line. Lines end at `\n`, `\r`, `\r\n`, or NUL; a
    /// final unterminated line is delivered once. Returns `false` at end of
    /// input.
    pub fn read_line(&mut self) -> Result<bool, Error> {
        self.line_start = self.next_line_start;
        if self.line_start > self.buf.len() {
            return Ok(false);
        }
        loop {
            if let Some(i) = self.buf[self.line_start..]
                .iter()
                .position(|&b| b == b'\n' || b == b'\r' || b == 0)
            {
                let end = self.line_start + i;
                self.next_line_start = end + 1;
                if self.buf[end] == b'\r' && self.buf.get(end + 1) == Some(&b'\n') {
                    self.next_line_start += 1;
                }
                self.line_end = end;
                return Ok(true);
            }
            if self.eof {
                if self.line_start >= self.buf.len() {
                    // The previous line consumed everything; no final
                    // fragment remains.
                    self.next_line_start = self.buf.len() + 1;
                    return Ok(false);
                }
                self.line_end = self.buf.len();
                self.next_line_start = self.buf.len() + 1;
                return Ok(true);
            }
            if self.refill()? == 0 {
                self.eof = true;
            }
        }
    }

    /// The current line's content, without its terminator.
    pub fn line(&self) -> &[u8] {
        &self.buf[self.line_start..self.line_end]
    }

    /// Make at least `n` unconsumed bytes available.
    fn ensure(&mut self, n: usize) -> Result<(), Error> {
        while self.buf.len() - self.line_start < n {
            if self.eof {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "input ended with {} of {n} promised bytes available",
                        self.buf.len() - self.line_start
                    ),
                )));
            }
            if self.refill()? == 0 {
                self.eof = true;
            }
        }
        Ok(())
    }

    /// Binary mode: consume and return exactly `n` bytes.
    pub fn read_exact(&mut self, n: usize) -> Result<&[u8], Error> {
        self.ensure(n)?;
        let start = self.line_start;
        self.line_start += n;
        self.next_line_start = self.line_start;
        Ok(&self.buf[start..self.line_start])
    }

    /// Consume and return one byte.
    pub fn read_byte(&mut self) -> Result<u8, Error> {
        Ok(self.read_exact(1)?[0])
    }

    /// The next byte, without consuming it.
    pub fn peek_byte(&mut self) -> Result<u8, Error> {
        self.ensure(1)?;
        Ok(self.buf[self.line_start])
    }
}
