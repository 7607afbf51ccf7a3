//! Line tokenizer for the mmCIF text grammar.
//!
//! Each line is broken into a token array up front; callers pull tokens one
//! at a time, may push exactly one back, and can ask how many remain on the
//! current line (the loop reader's one-line-row test). Token spans borrow
//! the current line and must be consumed before the next line is read.

use std::io::Read;
use std::str;

use crate::buffer::FileBuf;
use crate::error::Error;

/// Where a `Value` token's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Src {
    /// Byte span within the current line.
    Line(usize, usize),
    /// The tokenizer's multiline scratch buffer.
    Scratch,
}

/// One token of the text grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token {
    Value(Src),
    /// Bare `.`. A quoted `'.'` is an ordinary `Value`.
    Omitted,
    /// Bare `?`. A quoted `'?'` is an ordinary `Value`.
    Unknown,
    Loop,
    DataBlock,
    SaveFrame,
    /// `_category.keyword`, as a span within the current line.
    Variable(usize, usize),
}

pub(crate) struct Tokenizer {
    tokens: Vec<Token>,
    index: usize,
    /// Accumulates semicolon-delimited multiline values.
    scratch: String,
    /// 1-based number of the line most recently read.
    pub line_num: u32,
}

fn utf8(bytes: &[u8], line: u32) -> Result<&str, Error> {
    str::from_utf8(bytes).map_err(|_| Error::FileFormat(format!("invalid UTF-8 on line {line}")))
}

impl Tokenizer {
    pub fn new() -> Self {
        Tokenizer {
            tokens: Vec::new(),
            index: 0,
            scratch: String::new(),
            line_num: 0,
        }
    }

    /// Tokens not yet consumed from the current line.
    pub fn line_tokens_left(&self) -> usize {
        self.tokens.len() - self.index
    }

    /// Push back the last token returned by [`Tokenizer::next`].
    pub fn unget(&mut self) {
        debug_assert!(self.index > 0, "unget without a preceding token");
        self.index = self.index.saturating_sub(1);
    }

    /// Resolve a `Value` or `Variable` span to text.
    pub fn resolve<'a, R: Read>(&'a self, buf: &'a FileBuf<R>, src: Src) -> &'a str {
        match src {
            Src::Scratch => &self.scratch,
            Src::Line(a, b) => buf
                .line()
                .get(a..b)
                .and_then(|s| str::from_utf8(s).ok())
                .unwrap_or(""),
        }
    }

    /// Next token, reading lines as needed; `None` at end of input.
    ///
    /// With `ignore_multiline`, the contents of semicolon-delimited values
    /// are discarded instead of accumulated, but the terminator is still
    /// consumed and an empty `Value` is produced.
    pub fn next<R: Read>(
        &mut self,
        buf: &mut FileBuf<R>,
        ignore_multiline: bool,
    ) -> Result<Option<Token>, Error> {
        while self.index >= self.tokens.len() {
            if !buf.read_line()? {
                return Ok(None);
            }
            self.line_num += 1;
            if buf.line().first() == Some(&b';') {
                self.read_multiline(buf, ignore_multiline)?;
            } else {
                self.tokenize(buf.line())?;
            }
        }
        let token = self.tokens[self.index];
        self.index += 1;
        Ok(Some(token))
    }

    /// Accumulate a `;`-delimited value; the current line holds the opening
    /// semicolon. Leaves the token array holding the single value.
    fn read_multiline<R: Read>(
        &mut self,
        buf: &mut FileBuf<R>,
        ignore: bool,
    ) -> Result<(), Error> {
        let start_line = self.line_num;
        self.scratch.clear();
        if !ignore {
            let first = utf8(&buf.line()[1..], self.line_num)?;
            self.scratch.push_str(first);
        }
        loop {
            if !buf.read_line()? {
                return Err(Error::FileFormat(format!(
                    "End of file while reading multiline string which started on line {start_line}"
                )));
            }
            self.line_num += 1;
            if buf.line().first() == Some(&b';') {
                self.tokens.clear();
                self.tokens.push(Token::Value(Src::Scratch));
                self.index = 0;
                return Ok(());
            }
            if !ignore {
                self.scratch.push('\n');
                let line = utf8(buf.line(), self.line_num)?;
                self.scratch.push_str(line);
            }
        }
    }

    /// Break one line into tokens.
    fn tokenize(&mut self, line: &[u8]) -> Result<(), Error> {
        self.tokens.clear();
        self.index = 0;
        if line.first() == Some(&b'#') {
            return Ok(());
        }
        utf8(line, self.line_num)?;
        let mut pos = 0;
        while pos < line.len() {
            while pos < line.len() && (line[pos] == b' ' || line[pos] == b'\t') {
                pos += 1;
            }
            if pos >= line.len() {
                break;
            }
            match line[pos] {
                b'#' => break,
                q @ (b'\'' | b'"') => pos = self.quoted(line, pos, q)?,
                _ => pos = self.bareword(line, pos),
            }
        }
        Ok(())
    }

    /// Scan a quoted value. The closing quote must be followed by whitespace
    /// or end-of-line; a quote mid-token is a literal character.
    fn quoted(&mut self, line: &[u8], start: usize, q: u8) -> Result<usize, Error> {
        let mut i = start + 1;
        loop {
            match line[i..].iter().position(|&b| b == q) {
                None => {
                    let kind = if q == b'\'' { "Single" } else { "Double" };
                    return Err(Error::FileFormat(format!(
                        "{kind}-quoted string not terminated in file, line {}",
                        self.line_num
                    )));
                }
                Some(j) => {
                    let at = i + j;
                    match line.get(at + 1) {
                        None | Some(b' ') | Some(b'\t') => {
                            self.tokens.push(Token::Value(Src::Line(start + 1, at)));
                            return Ok(at + 1);
                        }
                        Some(_) => i = at + 1,
                    }
                }
            }
        }
    }

    /// Scan an unquoted token and classify it. `global_` and `stop_` get no
    /// special treatment and read as plain values.
    fn bareword(&mut self, line: &[u8], start: usize) -> usize {
        let mut end = start;
        while end < line.len() && line[end] != b' ' && line[end] != b'\t' {
            end += 1;
        }
        let word = &line[start..end];
        let token = if word.eq_ignore_ascii_case(b"loop_") {
            Token::Loop
        } else if word.len() >= 5 && word[..5].eq_ignore_ascii_case(b"data_") {
            Token::DataBlock
        } else if word.len() >= 5 && word[..5].eq_ignore_ascii_case(b"save_") {
            Token::SaveFrame
        } else if word[0] == b'_' {
            Token::Variable(start, end)
        } else if word == b"." {
            Token::Omitted
        } else if word == b"?" {
            Token::Unknown
        } else {
            Token::Value(Src::Line(start, end))
        };
        self.tokens.push(token);
        end
    }
}
