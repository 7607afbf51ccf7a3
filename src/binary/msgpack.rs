//! Streaming reader for the msgpack subset used by BinaryCIF.
//!
//! BinaryCIF needs maps, arrays, integers up to 64 bits, UTF-8 strings, and
//! binary blobs. Values are pulled straight from the shared byte buffer one
//! marker at a time; nothing is materialized unless the caller asks for it,
//! and whole subtrees can be skipped in place.

use std::io::Read;

use rmp::Marker;

use crate::buffer::FileBuf;
use crate::error::Error;

fn marker<R: Read>(buf: &mut FileBuf<R>) -> Result<Marker, Error> {
    Ok(Marker::from_u8(buf.read_byte()?))
}

fn be_u16<R: Read>(buf: &mut FileBuf<R>) -> Result<u16, Error> {
    let b = buf.read_exact(2)?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32<R: Read>(buf: &mut FileBuf<R>) -> Result<u32, Error> {
    let b = buf.read_exact(4)?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn be_u64<R: Read>(buf: &mut FileBuf<R>) -> Result<u64, Error> {
    let b = buf.read_exact(8)?;
    Ok(u64::from_be_bytes([
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]))
}

/// Read a map header, returning the number of key/value pairs.
pub(crate) fn read_map_len<R: Read>(buf: &mut FileBuf<R>) -> Result<usize, Error> {
    match marker(buf)? {
        Marker::FixMap(n) => Ok(n as usize),
        Marker::Map16 => Ok(be_u16(buf)? as usize),
        Marker::Map32 => Ok(be_u32(buf)? as usize),
        m => Err(Error::FileFormat(format!(
            "expected msgpack map, found {m:?}"
        ))),
    }
}

/// Read an array header, returning the element count.
pub(crate) fn read_array_len<R: Read>(buf: &mut FileBuf<R>) -> Result<usize, Error> {
    match marker(buf)? {
        Marker::FixArray(n) => Ok(n as usize),
        Marker::Array16 => Ok(be_u16(buf)? as usize),
        Marker::Array32 => Ok(be_u32(buf)? as usize),
        m => Err(Error::FileFormat(format!(
            "expected msgpack array, found {m:?}"
        ))),
    }
}

/// Read a signed or unsigned integer of any width.
pub(crate) fn read_int<R: Read>(buf: &mut FileBuf<R>) -> Result<i64, Error> {
    match marker(buf)? {
        Marker::FixPos(v) => Ok(v as i64),
        Marker::FixNeg(v) => Ok(v as i64),
        Marker::U8 => Ok(buf.read_byte()? as i64),
        Marker::U16 => Ok(be_u16(buf)? as i64),
        Marker::U32 => Ok(be_u32(buf)? as i64),
        Marker::U64 => i64::try_from(be_u64(buf)?)
            .map_err(|_| Error::FileFormat("msgpack integer out of range".into())),
        Marker::I8 => Ok(buf.read_byte()? as i8 as i64),
        Marker::I16 => Ok(be_u16(buf)? as i16 as i64),
        Marker::I32 => Ok(be_u32(buf)? as i32 as i64),
        Marker::I64 => Ok(be_u64(buf)? as i64),
        m => Err(Error::FileFormat(format!(
            "expected msgpack integer, found {m:?}"
        ))),
    }
}

fn str_len<R: Read>(buf: &mut FileBuf<R>, m: Marker) -> Result<Option<usize>, Error> {
    Ok(match m {
        Marker::FixStr(n) => Some(n as usize),
        Marker::Str8 => Some(buf.read_byte()? as usize),
        Marker::Str16 => Some(be_u16(buf)? as usize),
        Marker::Str32 => Some(be_u32(buf)? as usize),
        _ => None,
    })
}

/// Read a string, returning its raw bytes. The slice is valid only until
/// the next read from `buf`.
pub(crate) fn read_str<'a, R: Read>(buf: &'a mut FileBuf<R>) -> Result<&'a [u8], Error> {
    let m = marker(buf)?;
    match str_len(buf, m)? {
        Some(n) => buf.read_exact(n),
        None => Err(Error::FileFormat(format!(
            "expected msgpack string, found {m:?}"
        ))),
    }
}

/// Read a string into owned, UTF-8-validated storage.
pub(crate) fn read_str_owned<R: Read>(buf: &mut FileBuf<R>) -> Result<String, Error> {
    let bytes = read_str(buf)?.to_vec();
    String::from_utf8(bytes)
        .map_err(|_| Error::FileFormat("invalid UTF-8 in msgpack string".into()))
}

/// Read a binary blob into owned storage.
pub(crate) fn read_bin_owned<R: Read>(buf: &mut FileBuf<R>) -> Result<Vec<u8>, Error> {
    let n = match marker(buf)? {
        Marker::Bin8 => buf.read_byte()? as usize,
        Marker::Bin16 => be_u16(buf)? as usize,
        Marker::Bin32 => be_u32(buf)? as usize,
        m => {
            return Err(Error::FileFormat(format!(
                "expected msgpack binary, found {m:?}"
            )))
        }
    };
    Ok(buf.read_exact(n)?.to_vec())
}

/// Read a string and compare it to `lit` without copying.
pub(crate) fn expect_str<R: Read>(buf: &mut FileBuf<R>, lit: &[u8]) -> Result<bool, Error> {
    Ok(read_str(buf)? == lit)
}

/// Skip one scalar value (nil, bool, number, string, or binary blob).
pub(crate) fn skip_scalar<R: Read>(buf: &mut FileBuf<R>) -> Result<(), Error> {
    let m = marker(buf)?;
    skip_after_marker(buf, m, false)
}

/// Recursively skip any value, including arrays and maps.
pub(crate) fn skip_any<R: Read>(buf: &mut FileBuf<R>) -> Result<(), Error> {
    let m = marker(buf)?;
    skip_after_marker(buf, m, true)
}

fn skip_after_marker<R: Read>(
    buf: &mut FileBuf<R>,
    m: Marker,
    recurse: bool,
) -> Result<(), Error> {
    match m {
        Marker::Null
        | Marker::True
        | Marker::False
        | Marker::FixPos(_)
        | Marker::FixNeg(_) => Ok(()),
        Marker::U8 | Marker::I8 => buf.read_exact(1).map(drop),
        Marker::U16 | Marker::I16 => buf.read_exact(2).map(drop),
        Marker::U32 | Marker::I32 | Marker::F32 => buf.read_exact(4).map(drop),
        Marker::U64 | Marker::I64 | Marker::F64 => buf.read_exact(8).map(drop),
        Marker::FixStr(n) => buf.read_exact(n as usize).map(drop),
        Marker::Str8 | Marker::Bin8 => {
            let n = buf.read_byte()? as usize;
            buf.read_exact(n).map(drop)
        }
        Marker::Str16 | Marker::Bin16 => {
            let n = be_u16(buf)? as usize;
            buf.read_exact(n).map(drop)
        }
        Marker::Str32 | Marker::Bin32 => {
            let n = be_u32(buf)? as usize;
            buf.read_exact(n).map(drop)
        }
        Marker::FixArray(n) => skip_elements(buf, n as usize, recurse),
        Marker::Array16 => {
            let n = be_u16(buf)? as usize;
            skip_elements(buf, n, recurse)
        }
        Marker::Array32 => {
            let n = be_u32(buf)? as usize;
            skip_elements(buf, n, recurse)
        }
        Marker::FixMap(n) => skip_elements(buf, n as usize * 2, recurse),
        Marker::Map16 => {
            let n = be_u16(buf)? as usize;
            skip_elements(buf, n * 2, recurse)
        }
        Marker::Map32 => {
            let n = be_u32(buf)? as usize;
            skip_elements(buf, n * 2, recurse)
        }
        m => Err(Error::FileFormat(format!(
            "unsupported msgpack marker {m:?}"
        ))),
    }
}

fn skip_elements<R: Read>(buf: &mut FileBuf<R>, n: usize, recurse: bool) -> Result<(), Error> {
    if !recurse {
        return Err(Error::FileFormat(
            "expected msgpack scalar, found container".into(),
        ));
    }
    for _ in 0..n {
        skip_any(buf)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn buf(bytes: &[u8]) -> FileBuf<Cursor<Vec<u8>>> {
        FileBuf::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn fix_headers() {
        assert_eq!(read_map_len(&mut buf(&[0x82])).unwrap(), 2);
        assert_eq!(read_array_len(&mut buf(&[0x93])).unwrap(), 3);
    }

    #[test]
    fn sized_headers() {
        assert_eq!(read_map_len(&mut buf(&[0xde, 0x01, 0x00])).unwrap(), 256);
        assert_eq!(
            read_array_len(&mut buf(&[0xdd, 0x00, 0x01, 0x00, 0x00])).unwrap(),
            65536
        );
    }

    #[test]
    fn integers_of_all_widths() {
        assert_eq!(read_int(&mut buf(&[0x07])).unwrap(), 7);
        assert_eq!(read_int(&mut buf(&[0xe0])).unwrap(), -32);
        assert_eq!(read_int(&mut buf(&[0xcc, 0xff])).unwrap(), 255);
        assert_eq!(read_int(&mut buf(&[0xd0, 0x80])).unwrap(), -128);
        assert_eq!(read_int(&mut buf(&[0xd1, 0xff, 0x00])).unwrap(), -256);
        assert_eq!(
            read_int(&mut buf(&[0xce, 0x00, 0x01, 0x00, 0x00])).unwrap(),
            65536
        );
        assert_eq!(
            read_int(&mut buf(&[0xd2, 0xff, 0xff, 0xff, 0xff])).unwrap(),
            -1
        );
    }

    #[test]
    fn strings_and_bins() {
        let mut b = buf(&[0xa5, b'h', b'e', b'l', b'l', b'o']);
        assert_eq!(read_str_owned(&mut b).unwrap(), "hello");
        let mut b = buf(&[0xc4, 0x03, 1, 2, 3]);
        assert_eq!(read_bin_owned(&mut b).unwrap(), vec![1, 2, 3]);
        let mut b = buf(&[0xd9, 0x02, b'o', b'k']);
        assert_eq!(read_str_owned(&mut b).unwrap(), "ok");
    }

    #[test]
    fn expect_str_compares() {
        assert!(expect_str(&mut buf(&[0xa2, b'o', b'k']), b"ok").unwrap());
        assert!(!expect_str(&mut buf(&[0xa2, b'o', b'k']), b"no").unwrap());
    }

    #[test]
    fn skip_any_crosses_nested_containers() {
        // {"a": [1, "xy"], "b": nil} followed by the int 9
        let bytes = [
            0x82, 0xa1, b'a', 0x92, 0x01, 0xa2, b'x', b'y', 0xa1, b'b', 0xc0, 0x09,
        ];
        let mut b = buf(&bytes);
        skip_any(&mut b).unwrap();
        assert_eq!(read_int(&mut b).unwrap(), 9);
    }

    #[test]
    fn skip_scalar_rejects_containers() {
        assert!(skip_scalar(&mut buf(&[0x91, 0x01])).is_err());
        assert!(skip_scalar(&mut buf(&[0xca, 0, 0, 0, 0])).is_ok());
    }

    #[test]
    fn wrong_marker_is_a_format_error() {
        assert!(matches!(
            read_map_len(&mut buf(&[0x91])),
            Err(Error::FileFormat(_))
        ));
        assert!(matches!(
            read_str(&mut buf(&[0x01])),
            Err(Error::FileFormat(_))
        ));
    }
}
