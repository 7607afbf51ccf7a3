//! Public reader entry point.
//!
//! A [`Reader`] owns the byte buffer, the category registry, and the
//! per-format state. `read_block` drives either the text interpreter or the
//! binary block driver; both deliver rows through the same callbacks, so
//! handlers are format-agnostic.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::binary;
use crate::buffer::FileBuf;
use crate::category::{
    CategoryHandle, CategoryHandler, CellType, Registry, UnknownCategoryHook, UnknownKeywordHook,
};
use crate::error::Error;
use crate::source::MaybeGzip;
use crate::text;

enum Mode {
    Text,
    /// `blocks` holds the remaining count from the file header once the
    /// header has been read.
    Binary { blocks: Option<usize> },
}

/// Streaming reader over one mmCIF or BinaryCIF input.
///
/// Register the categories and keywords of interest, then call
/// [`Reader::read_block`] until it returns `false`. The reader is strictly
/// sequential and not reentrant: a callback must not drive the reader.
/// After any error the reader should be discarded.
pub struct Reader<R: Read> {
    buf: FileBuf<R>,
    tok: text::Tokenizer,
    reg: Registry,
    mode: Mode,
}

impl Reader<MaybeGzip<File>> {
    /// Open a text mmCIF file, inflating transparently if it is
    /// gzip-compressed.
    pub fn text_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Reader::text(MaybeGzip::new(File::open(path)?)?))
    }

    /// Open a BinaryCIF file, inflating transparently if it is
    /// gzip-compressed.
    pub fn binary_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Reader::binary(MaybeGzip::new(File::open(path)?)?))
    }
}

impl<R: Read> Reader<R> {
    /// Reader for the textual mmCIF grammar.
    pub fn text(source: R) -> Self {
        Reader {
            buf: FileBuf::new(source),
            tok: text::Tokenizer::new(),
            reg: Registry::new(),
            mode: Mode::Text,
        }
    }

    /// Reader for the BinaryCIF (msgpack) representation.
    pub fn binary(source: R) -> Self {
        Reader {
            buf: FileBuf::new(source),
            tok: text::Tokenizer::new(),
            reg: Registry::new(),
            mode: Mode::Binary { blocks: None },
        }
    }

    /// Register a category of interest. Names are case-insensitive and
    /// carry the leading underscore (`_atom_site`). Registering the same
    /// name again replaces the earlier registration.
    pub fn register_category(
        &mut self,
        name: &str,
        handler: Box<dyn CategoryHandler>,
    ) -> CategoryHandle {
        self.reg.register_category(name, handler)
    }

    /// Register a keyword (column) of a category, returning its
    /// registration-order index for [`crate::Row::get`]. Text cells always
    /// arrive as strings; the declared type shapes binary delivery.
    pub fn register_keyword(
        &mut self,
        category: CategoryHandle,
        name: &str,
        cell_type: CellType,
    ) -> usize {
        self.reg.register_keyword(category, name, cell_type)
    }

    /// Called for category names present in the file but never registered.
    pub fn set_unknown_category_hook(&mut self, hook: UnknownCategoryHook) {
        self.reg.set_unknown_category_hook(hook);
    }

    /// Called for keywords of a registered category that were never
    /// registered.
    pub fn set_unknown_keyword_hook(&mut self, hook: UnknownKeywordHook) {
        self.reg.set_unknown_keyword_hook(hook);
    }

    /// Drop every registered category (running release hooks) and both
    /// unknown-name hooks.
    pub fn clear_categories(&mut self) {
        self.reg.clear();
    }

    /// 1-based number of the line last read in text mode; 0 in binary mode.
    pub fn line_number(&self) -> u32 {
        match self.mode {
            Mode::Text => self.tok.line_num,
            Mode::Binary { .. } => 0,
        }
    }

    /// Read one data block, delivering its rows to the registered handlers.
    /// Returns `true` while more blocks remain.
    pub fn read_block(&mut self) -> Result<bool, Error> {
        match &mut self.mode {
            Mode::Text => {
                let more = text::read_block(&mut self.buf, &mut self.tok, &mut self.reg)?;
                debug!(line = self.tok.line_num, more, "text block read");
                Ok(more)
            }
            Mode::Binary { blocks } => {
                let remaining = match *blocks {
                    Some(n) => n,
                    None => {
                        let n = binary::read_header(&mut self.buf)?;
                        *blocks = Some(n);
                        n
                    }
                };
                if remaining == 0 {
                    // Nothing left to read; end-of-block callbacks still
                    // fire, matching the text path at end of input.
                    self.reg.end_block()?;
                    return Ok(false);
                }
                binary::read_block(&mut self.buf, &mut self.reg)?;
                *blocks = Some(remaining - 1);
                debug!(remaining = remaining - 1, "binary block read");
                Ok(remaining > 1)
            }
        }
    }
}
