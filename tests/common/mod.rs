//! Shared test harness: a row-capturing handler plus msgpack builders for
//! composing BinaryCIF files by hand.
#![allow(dead_code)] // each test binary uses a different slice of this

use std::cell::RefCell;
use std::rc::Rc;

use cif_stream::{CategoryHandler, Cell, Error, Row};

#[derive(Default)]
pub struct Captured {
    pub rows: Vec<Vec<String>>,
    pub frames: usize,
    pub finalized: usize,
}

pub struct Recorder {
    ncols: usize,
    out: Rc<RefCell<Captured>>,
}

/// A handler that renders every cell of every row into strings.
pub fn recorder(ncols: usize) -> (Box<dyn CategoryHandler>, Rc<RefCell<Captured>>) {
    let out = Rc::new(RefCell::new(Captured::default()));
    (
        Box::new(Recorder {
            ncols,
            out: out.clone(),
        }),
        out,
    )
}

pub fn render(cell: Cell<'_>) -> String {
    match cell {
        Cell::Missing => "<missing>".into(),
        Cell::Omitted => "<omitted>".into(),
        Cell::Unknown => "<unknown>".into(),
        Cell::Str(s) => s.into(),
        Cell::Int(v) => format!("int:{v}"),
        Cell::Float(v) => format!("float:{v}"),
    }
}

impl CategoryHandler for Recorder {
    fn row(&mut self, row: &Row<'_>) -> Result<(), Error> {
        let cells = (0..self.ncols).map(|i| render(row.get(i))).collect();
        self.out.borrow_mut().rows.push(cells);
        Ok(())
    }

    fn end_save_frame(&mut self) -> Result<(), Error> {
        self.out.borrow_mut().frames += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), Error> {
        self.out.borrow_mut().finalized += 1;
        Ok(())
    }
}

/// Low-level msgpack emitters, enough to write BinaryCIF by hand.
pub mod mp {
    pub fn str(out: &mut Vec<u8>, s: &str) {
        let b = s.as_bytes();
        if b.len() < 32 {
            out.push(0xa0 | b.len() as u8);
        } else if b.len() < 256 {
            out.push(0xd9);
            out.push(b.len() as u8);
        } else {
            out.push(0xda);
            out.extend((b.len() as u16).to_be_bytes());
        }
        out.extend_from_slice(b);
    }

    pub fn map(out: &mut Vec<u8>, n: usize) {
        if n < 16 {
            out.push(0x80 | n as u8);
        } else {
            out.push(0xde);
            out.extend((n as u16).to_be_bytes());
        }
    }

    pub fn array(out: &mut Vec<u8>, n: usize) {
        if n < 16 {
            out.push(0x90 | n as u8);
        } else {
            out.push(0xdc);
            out.extend((n as u16).to_be_bytes());
        }
    }

    pub fn bin(out: &mut Vec<u8>, data: &[u8]) {
        if data.len() < 256 {
            out.push(0xc4);
            out.push(data.len() as u8);
        } else {
            out.push(0xc5);
            out.extend((data.len() as u16).to_be_bytes());
        }
        out.extend_from_slice(data);
    }

    pub fn int(out: &mut Vec<u8>, v: i64) {
        if (0..=127).contains(&v) {
            out.push(v as u8);
        } else if (-32..0).contains(&v) {
            out.push(v as i8 as u8);
        } else {
            out.push(0xd3);
            out.extend(v.to_be_bytes());
        }
    }

    pub fn bool(out: &mut Vec<u8>, v: bool) {
        out.push(if v { 0xc3 } else { 0xc2 });
    }

    pub fn nil(out: &mut Vec<u8>) {
        out.push(0xc0);
    }
}

/// Encoding maps, in the wire layout real writers emit.
pub mod enc {
    use super::mp;

    pub fn byte_array(type_code: i64) -> Vec<u8> {
        let mut out = Vec::new();
        mp::map(&mut out, 2);
        mp::str(&mut out, "kind");
        mp::str(&mut out, "ByteArray");
        mp::str(&mut out, "type");
        mp::int(&mut out, type_code);
        out
    }

    pub fn integer_packing(byte_count: i64, is_unsigned: bool, src_size: i64) -> Vec<u8> {
        let mut out = Vec::new();
        mp::map(&mut out, 4);
        mp::str(&mut out, "kind");
        mp::str(&mut out, "IntegerPacking");
        mp::str(&mut out, "byteCount");
        mp::int(&mut out, byte_count);
        mp::str(&mut out, "isUnsigned");
        mp::bool(&mut out, is_unsigned);
        mp::str(&mut out, "srcSize");
        mp::int(&mut out, src_size);
        out
    }

    pub fn delta(origin: i64) -> Vec<u8> {
        let mut out = Vec::new();
        mp::map(&mut out, 2);
        mp::str(&mut out, "kind");
        mp::str(&mut out, "Delta");
        mp::str(&mut out, "origin");
        mp::int(&mut out, origin);
        out
    }

    pub fn run_length() -> Vec<u8> {
        let mut out = Vec::new();
        mp::map(&mut out, 1);
        mp::str(&mut out, "kind");
        mp::str(&mut out, "RunLength");
        out
    }

    pub fn fixed_point(factor: i64) -> Vec<u8> {
        let mut out = Vec::new();
        mp::map(&mut out, 2);
        mp::str(&mut out, "kind");
        mp::str(&mut out, "FixedPoint");
        mp::str(&mut out, "factor");
        mp::int(&mut out, factor);
        out
    }

    pub fn string_array(
        string_data: &str,
        offsets_payload: &[u8],
        offset_encoding: &[Vec<u8>],
        data_encoding: &[Vec<u8>],
    ) -> Vec<u8> {
        let mut out = Vec::new();
        mp::map(&mut out, 5);
        mp::str(&mut out, "kind");
        mp::str(&mut out, "StringArray");
        mp::str(&mut out, "stringData");
        mp::str(&mut out, string_data);
        mp::str(&mut out, "offsets");
        mp::bin(&mut out, offsets_payload);
        mp::str(&mut out, "offsetEncoding");
        mp::array(&mut out, offset_encoding.len());
        for e in offset_encoding {
            out.extend_from_slice(e);
        }
        mp::str(&mut out, "dataEncoding");
        mp::array(&mut out, data_encoding.len());
        for e in data_encoding {
            out.extend_from_slice(e);
        }
        out
    }
}

/// Higher-level BinaryCIF assembly.
pub mod bcif {
    use super::mp;

    /// `{data: <payload>, encoding: [<wire-order encodings>]}`
    pub fn blob(payload: &[u8], encodings: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        mp::map(&mut out, 2);
        mp::str(&mut out, "data");
        mp::bin(&mut out, payload);
        mp::str(&mut out, "encoding");
        mp::array(&mut out, encodings.len());
        for e in encodings {
            out.extend_from_slice(e);
        }
        out
    }

    pub fn column(name: &str, data: &[u8], mask: Option<&[u8]>) -> Vec<u8> {
        let mut out = Vec::new();
        mp::map(&mut out, 3);
        mp::str(&mut out, "name");
        mp::str(&mut out, name);
        mp::str(&mut out, "data");
        out.extend_from_slice(data);
        mp::str(&mut out, "mask");
        match mask {
            Some(blob) => out.extend_from_slice(blob),
            None => mp::nil(&mut out),
        }
        out
    }

    pub fn category(name: &str, row_count: i64, columns: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        mp::map(&mut out, 3);
        mp::str(&mut out, "name");
        mp::str(&mut out, name);
        mp::str(&mut out, "rowCount");
        mp::int(&mut out, row_count);
        mp::str(&mut out, "columns");
        mp::array(&mut out, columns.len());
        for c in columns {
            out.extend_from_slice(c);
        }
        out
    }

    pub fn block(header: &str, categories: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        mp::map(&mut out, 2);
        mp::str(&mut out, "header");
        mp::str(&mut out, header);
        mp::str(&mut out, "categories");
        mp::array(&mut out, categories.len());
        for c in categories {
            out.extend_from_slice(c);
        }
        out
    }

    /// Whole file; `version` and `encoder` come before `dataBlocks` to
    /// exercise header skipping.
    pub fn file(blocks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        mp::map(&mut out, 3);
        mp::str(&mut out, "encoder");
        mp::str(&mut out, "hand-rolled test writer");
        mp::str(&mut out, "version");
        mp::str(&mut out, "0.3.0");
        mp::str(&mut out, "dataBlocks");
        mp::array(&mut out, blocks.len());
        for b in blocks {
            out.extend_from_slice(b);
        }
        out
    }

    /// Little-endian `i32` payload for ByteArray type 3.
    pub fn i32_payload(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }
}
