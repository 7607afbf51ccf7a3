//! Binary-mode block driver.
//!
//! Walks the msgpack object tree one token at a time: the top-level map's
//! `dataBlocks` array, each block's `categories`, each category's columns.
//! Registered categories have their columns decoded and materialized into
//! rows through the shared registry; everything else is skipped in place
//! without buffering.

use std::io::Read;

use rmp::Marker;
use tracing::debug;

use crate::buffer::FileBuf;
use crate::category::{CellType, Registry};
use crate::error::Error;

use super::decode::{self, Decoded};
use super::encoding::{self, Encoding};
use super::msgpack;

/// An undecoded payload with its encoding chain.
struct Blob {
    data: Vec<u8>,
    chain: Vec<Encoding>,
}

struct RawColumn {
    name: String,
    data: Blob,
    mask: Option<Blob>,
}

/// Locate the `dataBlocks` array in the file header map and return its
/// length. Entries before it are skipped in place.
pub(crate) fn read_header<R: Read>(buf: &mut FileBuf<R>) -> Result<usize, Error> {
    let n = msgpack::read_map_len(buf)?;
    for _ in 0..n {
        if msgpack::expect_str(buf, b"dataBlocks")? {
            let blocks = msgpack::read_array_len(buf)?;
            debug!(blocks, "binary file header read");
            return Ok(blocks);
        }
        msgpack::skip_any(buf)?;
    }
    Err(Error::FileFormat(
        "binary file has no dataBlocks entry".into(),
    ))
}

/// Consume one data block, dispatching its categories and firing the
/// end-of-block callbacks.
pub(crate) fn read_block<R: Read>(buf: &mut FileBuf<R>, reg: &mut Registry) -> Result<(), Error> {
    let n = msgpack::read_map_len(buf)?;
    for _ in 0..n {
        if msgpack::expect_str(buf, b"categories")? {
            let ncat = msgpack::read_array_len(buf)?;
            for _ in 0..ncat {
                read_category(buf, reg)?;
            }
        } else {
            msgpack::skip_any(buf)?;
        }
    }
    reg.end_block()
}

fn read_category<R: Read>(buf: &mut FileBuf<R>, reg: &mut Registry) -> Result<(), Error> {
    let n = msgpack::read_map_len(buf)?;
    let mut name: Option<String> = None;
    let mut columns: Vec<RawColumn> = Vec::new();
    for _ in 0..n {
        let key = msgpack::read_str_owned(buf)?;
        match key.as_str() {
            "name" => name = Some(msgpack::read_str_owned(buf)?),
            "columns" => {
                // A category already known to be unregistered is skipped
                // wholesale, payloads included.
                if let Some(name) = name.as_deref() {
                    if reg.find_category(name).is_none() {
                        msgpack::skip_any(buf)?;
                        continue;
                    }
                }
                let ncol = msgpack::read_array_len(buf)?;
                columns.reserve(ncol);
                for _ in 0..ncol {
                    columns.push(read_column(buf)?);
                }
            }
            _ => msgpack::skip_any(buf)?, // rowCount and friends
        }
    }
    let name = name.ok_or_else(|| Error::FileFormat("category map missing name".into()))?;
    match reg.find_category(&name) {
        Some(ci) => emit_category(reg, ci, &name, columns),
        None => reg.notify_unknown_category(&name, 0),
    }
}

fn read_column<R: Read>(buf: &mut FileBuf<R>) -> Result<RawColumn, Error> {
    let n = msgpack::read_map_len(buf)?;
    let mut name: Option<String> = None;
    let mut data: Option<Blob> = None;
    let mut mask: Option<Blob> = None;
    for _ in 0..n {
        let key = msgpack::read_str_owned(buf)?;
        match key.as_str() {
            "name" => name = Some(msgpack::read_str_owned(buf)?),
            "data" => data = Some(read_blob(buf)?),
            "mask" => {
                if Marker::from_u8(buf.peek_byte()?) == Marker::Null {
                    msgpack::skip_scalar(buf)?;
                } else {
                    mask = Some(read_blob(buf)?);
                }
            }
            _ => msgpack::skip_any(buf)?,
        }
    }
    Ok(RawColumn {
        name: name.ok_or_else(|| Error::FileFormat("column map missing name".into()))?,
        data: data.ok_or_else(|| Error::FileFormat("column map missing data".into()))?,
        mask,
    })
}

fn read_blob<R: Read>(buf: &mut FileBuf<R>) -> Result<Blob, Error> {
    let n = msgpack::read_map_len(buf)?;
    let mut data: Option<Vec<u8>> = None;
    let mut chain: Option<Vec<Encoding>> = None;
    for _ in 0..n {
        let key = msgpack::read_str_owned(buf)?;
        match key.as_str() {
            "data" => data = Some(msgpack::read_bin_owned(buf)?),
            "encoding" => chain = Some(encoding::read_chain(buf)?),
            _ => msgpack::skip_any(buf)?,
        }
    }
    Ok(Blob {
        data: data.ok_or_else(|| Error::FileFormat("encoded data missing payload".into()))?,
        chain: chain
            .ok_or_else(|| Error::FileFormat("encoded data missing encoding list".into()))?,
    })
}

struct BoundColumn {
    ki: usize,
    data: Decoded,
    mask: Option<Vec<u8>>,
}

/// Decode the columns bound to registered keywords and fire the row
/// callback once per row, in file order.
fn emit_category(
    reg: &mut Registry,
    ci: usize,
    cat_name: &str,
    columns: Vec<RawColumn>,
) -> Result<(), Error> {
    let mut bound: Vec<BoundColumn> = Vec::new();
    for column in columns {
        match reg.find_keyword(ci, &column.name) {
            None => reg.notify_unknown_keyword(cat_name, &column.name, 0)?,
            Some(ki) => {
                let data = decode::run(column.data.data, &column.data.chain)?;
                let mask = match column.mask {
                    Some(blob) => Some(decode::mask(blob.data, &blob.chain)?),
                    None => None,
                };
                bound.push(BoundColumn { ki, data, mask });
            }
        }
    }
    let Some(first) = bound.first() else {
        return Ok(());
    };

    let nrows = first.data.len();
    for column in &bound {
        if column.data.len() != nrows {
            return Err(Error::FileFormat(format!(
                "column {} of category {cat_name} has {} rows, expected {nrows}",
                reg.keyword_name(ci, column.ki),
                column.data.len()
            )));
        }
        if let Some(mask) = &column.mask {
            if mask.len() != nrows {
                return Err(Error::FileFormat(format!(
                    "mask of column {} in category {cat_name} has {} entries, expected {nrows}",
                    reg.keyword_name(ci, column.ki),
                    mask.len()
                )));
            }
        }
    }

    debug!(
        category = cat_name,
        rows = nrows,
        columns = bound.len(),
        "emitting binary category"
    );
    for i in 0..nrows {
        for column in &bound {
            match column.mask.as_ref().map_or(0, |m| m[i]) {
                1 => reg.set_omitted(ci, column.ki),
                2 => reg.set_unknown(ci, column.ki),
                _ => set_cell(reg, ci, column.ki, &column.data, i)?,
            }
        }
        reg.fire_row(ci, b"")?;
    }
    Ok(())
}

enum NativeCell<'a> {
    Int(i32),
    Float(f64),
    Str(&'a str),
}

fn native_cell(data: &Decoded, i: usize) -> Result<NativeCell<'_>, Error> {
    Ok(match data {
        Decoded::I8(v) => NativeCell::Int(v[i] as i32),
        Decoded::U8(v) => NativeCell::Int(v[i] as i32),
        Decoded::I16(v) => NativeCell::Int(v[i] as i32),
        Decoded::U16(v) => NativeCell::Int(v[i] as i32),
        Decoded::I32(v) => NativeCell::Int(v[i]),
        Decoded::U32(v) => NativeCell::Int(v[i] as i32),
        Decoded::F32(v) => NativeCell::Float(v[i] as f64),
        Decoded::F64(v) => NativeCell::Float(v[i]),
        Decoded::Str(col) => NativeCell::Str(col.get(i)),
        Decoded::Raw(_) => {
            return Err(Error::FileFormat(
                "column decoded to raw bytes; its chain has no ByteArray stage".into(),
            ))
        }
    })
}

/// Store one decoded cell into its keyword slot, coerced to the declared
/// cell type.
fn set_cell(
    reg: &mut Registry,
    ci: usize,
    ki: usize,
    data: &Decoded,
    i: usize,
) -> Result<(), Error> {
    match (native_cell(data, i)?, reg.cell_type(ci, ki)) {
        (NativeCell::Int(v), CellType::Int) => reg.set_int(ci, ki, v),
        (NativeCell::Int(v), CellType::Float) => reg.set_float(ci, ki, v as f64),
        (NativeCell::Int(v), CellType::Str) => {
            let text = v.to_string();
            reg.set_str_copied(ci, ki, &text);
        }
        (NativeCell::Float(v), CellType::Float) => reg.set_float(ci, ki, v),
        (NativeCell::Float(v), CellType::Int) => reg.set_int(ci, ki, v as i32),
        (NativeCell::Float(v), CellType::Str) => {
            let text = v.to_string();
            reg.set_str_copied(ci, ki, &text);
        }
        (NativeCell::Str(s), CellType::Str) => reg.set_str_copied(ci, ki, s),
        (NativeCell::Str(s), CellType::Int) => {
            let v = s.trim().parse::<i32>().map_err(|_| {
                Error::FileFormat(format!("cannot read {s:?} as an integer cell"))
            })?;
            reg.set_int(ci, ki, v);
        }
        (NativeCell::Str(s), CellType::Float) => {
            let v = s.trim().parse::<f64>().map_err(|_| {
                Error::FileFormat(format!("cannot read {s:?} as a float cell"))
            })?;
            reg.set_float(ci, ki, v);
        }
    }
    Ok(())
}
