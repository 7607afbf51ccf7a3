//! Declarative encoding chains attached to BinaryCIF columns.
//!
//! Each column (and mask) carries an ordered list of transforms that were
//! applied during encoding. The parser stores the list in application order,
//! which is the order the decoder must run it, i.e. the reverse of the order
//! on the wire. Encodings form a closed set; an unrecognized `kind` is a
//! format error.

use std::io::Read;

use crate::buffer::FileBuf;
use crate::error::Error;

use super::msgpack;

/// Element type of a `ByteArray` stage, from the wire's numeric type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ByteType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ByteType {
    fn from_code(code: i64) -> Result<Self, Error> {
        Ok(match code {
            1 => ByteType::I8,
            2 => ByteType::I16,
            3 => ByteType::I32,
            4 => ByteType::U8,
            5 => ByteType::U16,
            6 => ByteType::U32,
            32 => ByteType::F32,
            33 => ByteType::F64,
            other => {
                return Err(Error::FileFormat(format!(
                    "unknown ByteArray type code {other}"
                )))
            }
        })
    }

    pub fn width(self) -> usize {
        match self {
            ByteType::I8 | ByteType::U8 => 1,
            ByteType::I16 | ByteType::U16 => 2,
            ByteType::I32 | ByteType::U32 | ByteType::F32 => 4,
            ByteType::F64 => 8,
        }
    }
}

/// One decode stage.
#[derive(Debug, Clone)]
pub(crate) enum Encoding {
    /// Reinterpret raw bytes as little-endian fixed-width values.
    ByteArray { ty: ByteType },
    /// Expand runs of saturated sentinel values into single `i32` sums. The
    /// sentinels come from the input element type, so no parameters are
    /// needed at decode time.
    IntegerPacking,
    /// Prefix-sum with the given initial value.
    Delta { origin: i32 },
    /// Expand `(value, count)` pairs into a flat vector.
    RunLength,
    /// Divide integers by a fixed factor into floats.
    FixedPoint { factor: i32 },
    /// Resolve per-row indices against offset-delimited string data.
    StringArray(Box<StringArray>),
}

#[derive(Debug, Clone)]
pub(crate) struct StringArray {
    /// Concatenation of all distinct strings.
    pub string_data: String,
    /// Raw payload of the substring boundaries, decoded via
    /// `offset_encoding`.
    pub offsets: Vec<u8>,
    pub offset_encoding: Vec<Encoding>,
    /// Chain for the column's own payload, producing the index vector.
    pub data_encoding: Vec<Encoding>,
}

/// Parse a column's `encoding` array into application order.
pub(crate) fn read_chain<R: Read>(buf: &mut FileBuf<R>) -> Result<Vec<Encoding>, Error> {
    let n = msgpack::read_array_len(buf)?;
    let mut chain = Vec::with_capacity(n);
    for _ in 0..n {
        chain.push(read_encoding(buf)?);
    }
    chain.reverse();
    Ok(chain)
}

/// Parse one encoding map. Fields arrive in wire order, so everything is
/// collected before `kind` picks the variant.
fn read_encoding<R: Read>(buf: &mut FileBuf<R>) -> Result<Encoding, Error> {
    let n = msgpack::read_map_len(buf)?;
    let mut kind: Option<String> = None;
    let mut ty: Option<i64> = None;
    let mut origin: i64 = 0;
    let mut factor: Option<i64> = None;
    let mut string_data: Option<String> = None;
    let mut offsets: Option<Vec<u8>> = None;
    let mut offset_encoding: Option<Vec<Encoding>> = None;
    let mut data_encoding: Option<Vec<Encoding>> = None;

    for _ in 0..n {
        let key = msgpack::read_str_owned(buf)?;
        match key.as_str() {
            "kind" => kind = Some(msgpack::read_str_owned(buf)?),
            "type" => ty = Some(msgpack::read_int(buf)?),
            "origin" => origin = msgpack::read_int(buf)?,
            "factor" => factor = Some(msgpack::read_int(buf)?),
            "stringData" => string_data = Some(msgpack::read_str_owned(buf)?),
            "offsets" => offsets = Some(msgpack::read_bin_owned(buf)?),
            "offsetEncoding" => offset_encoding = Some(read_chain(buf)?),
            "dataEncoding" => data_encoding = Some(read_chain(buf)?),
            // byteCount, srcSize, isUnsigned, srcType, …
            _ => msgpack::skip_any(buf)?,
        }
    }

    let kind = kind.ok_or_else(|| Error::FileFormat("encoding map missing kind".into()))?;
    let missing = |field: &str| Error::FileFormat(format!("{kind} encoding missing {field}"));
    match kind.as_str() {
        "ByteArray" => Ok(Encoding::ByteArray {
            ty: ByteType::from_code(ty.ok_or_else(|| missing("type"))?)?,
        }),
        "IntegerPacking" => Ok(Encoding::IntegerPacking),
        "Delta" => Ok(Encoding::Delta {
            origin: origin as i32,
        }),
        "RunLength" => Ok(Encoding::RunLength),
        "FixedPoint" => Ok(Encoding::FixedPoint {
            factor: factor.ok_or_else(|| missing("factor"))? as i32,
        }),
        "StringArray" => Ok(Encoding::StringArray(Box::new(StringArray {
            string_data: string_data.ok_or_else(|| missing("stringData"))?,
            offsets: offsets.ok_or_else(|| missing("offsets"))?,
            offset_encoding: offset_encoding.ok_or_else(|| missing("offsetEncoding"))?,
            data_encoding: data_encoding.ok_or_else(|| missing("dataEncoding"))?,
        }))),
        other => Err(Error::FileFormat(format!("unknown encoding kind: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn buf(bytes: Vec<u8>) -> FileBuf<Cursor<Vec<u8>>> {
        FileBuf::new(Cursor::new(bytes))
    }

    fn map(pairs: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![0x80 | pairs.len() as u8];
        for (key, value) in pairs {
            out.push(0xa0 | key.len() as u8);
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(value);
        }
        out
    }

    fn s(text: &str) -> Vec<u8> {
        let mut out = vec![0xa0 | text.len() as u8];
        out.extend_from_slice(text.as_bytes());
        out
    }

    #[test]
    fn chain_is_reversed_into_application_order() {
        // Wire order: [Delta, ByteArray] — decode must run ByteArray first.
        let mut bytes = vec![0x92];
        bytes.extend(map(&[("kind", s("Delta")), ("origin", vec![0x0a])]));
        bytes.extend(map(&[("kind", s("ByteArray")), ("type", vec![0x01])]));
        let chain = read_chain(&mut buf(bytes)).unwrap();
        assert!(matches!(chain[0], Encoding::ByteArray { ty: ByteType::I8 }));
        assert!(matches!(chain[1], Encoding::Delta { origin: 10 }));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut bytes = vec![0x91];
        bytes.extend(map(&[("kind", s("IntervalQuantization"))]));
        let err = read_chain(&mut buf(bytes)).unwrap_err();
        assert!(err.to_string().contains("unknown encoding kind"));
    }

    #[test]
    fn unknown_type_code_is_rejected() {
        let mut bytes = vec![0x91];
        bytes.extend(map(&[("kind", s("ByteArray")), ("type", vec![0x63])]));
        assert!(read_chain(&mut buf(bytes)).is_err());
    }

    #[test]
    fn delta_origin_defaults_to_zero() {
        let mut bytes = vec![0x91];
        bytes.extend(map(&[("kind", s("Delta"))]));
        let chain = read_chain(&mut buf(bytes)).unwrap();
        assert!(matches!(chain[0], Encoding::Delta { origin: 0 }));
    }

    #[test]
    fn unrecognized_fields_are_skipped() {
        let mut bytes = vec![0x91];
        bytes.extend(map(&[
            ("byteCount", vec![0x01]),
            ("isUnsigned", vec![0xc3]),
            ("srcSize", vec![0x04]),
            ("kind", s("IntegerPacking")),
        ]));
        let chain = read_chain(&mut buf(bytes)).unwrap();
        assert!(matches!(chain[0], Encoding::IntegerPacking));
    }
}
