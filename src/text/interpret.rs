//! Text-mode block interpreter.
//!
//! Drives the `data_` / variable / `loop_` / save-frame state machine over
//! the token stream, routing values of registered keywords into the category
//! registry and ignoring everything else as cheaply as possible: the top
//! level reads with `ignore_multiline` so semicolon blocks attached to
//! uninteresting keywords are skipped without being buffered.

use std::io::Read;

use tracing::debug;

use crate::buffer::FileBuf;
use crate::category::Registry;
use crate::error::Error;

use super::tokenize::{Src, Token, Tokenizer};

/// Read one data block. Returns `true` if another block follows.
pub(crate) fn read_block<R: Read>(
    buf: &mut FileBuf<R>,
    tok: &mut Tokenizer,
    reg: &mut Registry,
) -> Result<bool, Error> {
    let mut ndata = 0;
    let mut in_save = false;
    while let Some(token) = tok.next(buf, true)? {
        match token {
            Token::Variable(a, b) => read_value(buf, tok, reg, (a, b))?,
            Token::DataBlock => {
                ndata += 1;
                if ndata > 1 {
                    // Leave the next block for the following read_block call.
                    tok.unget();
                    break;
                }
            }
            Token::Loop => read_loop(buf, tok, reg)?,
            Token::SaveFrame => {
                in_save = !in_save;
                if !in_save {
                    debug!(line = tok.line_num, "save frame closed");
                    reg.end_save_frame()?;
                }
            }
            // Stray values outside any construct, including the skipped
            // bodies of unregistered keywords.
            Token::Value(_) | Token::Omitted | Token::Unknown => {}
        }
    }
    reg.end_block()?;
    Ok(ndata > 1)
}

/// Split `_category.keyword` at the first period.
fn split_variable(name: &str, line: u32) -> Result<(&str, &str), Error> {
    match name.find('.') {
        Some(dot) => Ok((&name[..dot], &name[dot + 1..])),
        None => Err(Error::FileFormat(format!(
            "No period found in mmCIF variable name ({name}) at line {line}"
        ))),
    }
}

/// Handle a line that sets a single value, e.g. `_entry.id   1YTI`.
fn read_value<R: Read>(
    buf: &mut FileBuf<R>,
    tok: &mut Tokenizer,
    reg: &mut Registry,
    span: (usize, usize),
) -> Result<(), Error> {
    let line_num = tok.line_num;
    let target = {
        let name = tok.resolve(buf, Src::Line(span.0, span.1));
        let (cat_name, kw_name) = split_variable(name, line_num)?;
        match reg.find_category(cat_name) {
            None => {
                reg.notify_unknown_category(cat_name, line_num)?;
                None
            }
            Some(ci) => match reg.find_keyword(ci, kw_name) {
                None => {
                    reg.notify_unknown_keyword(cat_name, kw_name, line_num)?;
                    None
                }
                Some(ki) => Some((ci, ki)),
            },
        }
    };
    let Some((ci, ki)) = target else {
        // The value token is left in the stream; the top level skips it.
        return Ok(());
    };
    match tok.next(buf, false)? {
        Some(Token::Value(src)) => {
            let text = tok.resolve(buf, src);
            reg.set_str_copied(ci, ki, text);
            Ok(())
        }
        Some(Token::Omitted) => {
            reg.set_omitted(ci, ki);
            Ok(())
        }
        Some(Token::Unknown) => {
            reg.set_unknown(ci, ki);
            Ok(())
        }
        _ => Err(Error::FileFormat(format!(
            "No valid value found for {}.{} in file, line {}",
            reg.category_name(ci),
            reg.keyword_name(ci, ki),
            tok.line_num
        ))),
    }
}

/// Read the keyword list of a `loop_` construct. All keywords must belong
/// to one category; entries for unregistered keywords are `None` (their
/// values are consumed but discarded).
fn read_loop<R: Read>(
    buf: &mut FileBuf<R>,
    tok: &mut Tokenizer,
    reg: &mut Registry,
) -> Result<(), Error> {
    let mut category: Option<usize> = None;
    let mut first = true;
    let mut columns: Vec<Option<usize>> = Vec::new();

    loop {
        match tok.next(buf, false)? {
            Some(Token::Variable(a, b)) => {
                let line_num = tok.line_num;
                let name = tok.resolve(buf, Src::Line(a, b));
                let (cat_name, kw_name) = split_variable(name, line_num)?;
                let found = reg.find_category(cat_name);
                if first {
                    category = found;
                    first = false;
                    if found.is_none() {
                        reg.notify_unknown_category(cat_name, line_num)?;
                    }
                } else if category != found {
                    return Err(Error::FileFormat(format!(
                        "mmCIF files cannot contain multiple categories within \
                         a single loop at line {line_num}"
                    )));
                }
                let ki = match found {
                    Some(ci) => {
                        let ki = reg.find_keyword(ci, kw_name);
                        if ki.is_none() {
                            reg.notify_unknown_keyword(cat_name, kw_name, line_num)?;
                        }
                        ki
                    }
                    None => None,
                };
                columns.push(ki);
            }
            Some(Token::Value(_)) | Some(Token::Omitted) | Some(Token::Unknown) => {
                tok.unget();
                break;
            }
            Some(_) => {
                return Err(Error::FileFormat(format!(
                    "Was expecting a keyword or value for loop at line {}",
                    tok.line_num
                )));
            }
            None => break,
        }
    }

    match category {
        Some(ci) => read_loop_data(buf, tok, reg, ci, &columns),
        // Values of an unregistered loop are left to the top level, which
        // skips them (and any multiline bodies) cheaply.
        None => Ok(()),
    }
}

/// Pull `columns.len()` value tokens per row until the loop ends, firing the
/// row callback after each complete row.
fn read_loop_data<R: Read>(
    buf: &mut FileBuf<R>,
    tok: &mut Tokenizer,
    reg: &mut Registry,
    ci: usize,
    columns: &[Option<usize>],
) -> Result<(), Error> {
    loop {
        // When the whole row sits on the current line, token spans stay
        // valid until the callback fires and can be stored without copying.
        let one_line_row = tok.line_tokens_left() >= columns.len();
        for (i, column) in columns.iter().enumerate() {
            let token = tok.next(buf, false)?;
            match token {
                Some(Token::Value(src)) => {
                    if let Some(ki) = *column {
                        match src {
                            Src::Line(a, b) if one_line_row => {
                                reg.set_str_borrowed(ci, ki, a, b)
                            }
                            src => {
                                let text = tok.resolve(buf, src);
                                reg.set_str_copied(ci, ki, text);
                            }
                        }
                    }
                }
                Some(Token::Omitted) => {
                    if let Some(ki) = *column {
                        reg.set_omitted(ci, ki);
                    }
                }
                Some(Token::Unknown) => {
                    if let Some(ki) = *column {
                        reg.set_unknown(ci, ki);
                    }
                }
                other => {
                    if i == 0 {
                        // Clean end of the loop at a row boundary.
                        if other.is_some() {
                            tok.unget();
                        }
                        return Ok(());
                    }
                    return Err(Error::FileFormat(format!(
                        "Wrong number of data values in loop (should be an \
                         exact multiple of the number of keys) at line {}",
                        tok.line_num
                    )));
                }
            }
        }
        reg.fire_row(ci, buf.line())?;
    }
}
