//! Decoder pipeline over typed column vectors.
//!
//! A column starts as the raw bytes of its `data` blob and is pushed through
//! its encoding chain in application order, ending as an integer, float, or
//! string vector. Masks run through the same pipeline and are coerced to the
//! canonical `u8` presence vector.

use tracing::trace;

use crate::error::Error;

use super::encoding::{ByteType, Encoding, StringArray};

/// A column vector at some stage of decoding.
#[derive(Debug)]
pub(crate) enum Decoded {
    Raw(Vec<u8>),
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Str(StrColumn),
}

/// Decoded string column: shared character data plus per-row spans.
#[derive(Debug)]
pub(crate) struct StrColumn {
    data: String,
    cells: Vec<(u32, u32)>,
}

impl StrColumn {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, i: usize) -> &str {
        let (a, b) = self.cells[i];
        &self.data[a as usize..b as usize]
    }
}

impl Decoded {
    /// Number of logical elements.
    pub fn len(&self) -> usize {
        match self {
            Decoded::Raw(v) => v.len(),
            Decoded::I8(v) => v.len(),
            Decoded::U8(v) => v.len(),
            Decoded::I16(v) => v.len(),
            Decoded::U16(v) => v.len(),
            Decoded::I32(v) => v.len(),
            Decoded::U32(v) => v.len(),
            Decoded::F32(v) => v.len(),
            Decoded::F64(v) => v.len(),
            Decoded::Str(s) => s.len(),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Decoded::Raw(_) => "raw bytes",
            Decoded::I8(_) => "int8",
            Decoded::U8(_) => "uint8",
            Decoded::I16(_) => "int16",
            Decoded::U16(_) => "uint16",
            Decoded::I32(_) => "int32",
            Decoded::U32(_) => "uint32",
            Decoded::F32(_) => "float32",
            Decoded::F64(_) => "float64",
            Decoded::Str(_) => "strings",
        }
    }

    /// Widen any integer variant to `i32`.
    fn into_i32(self, stage: &str) -> Result<Vec<i32>, Error> {
        Ok(match self {
            Decoded::I8(v) => v.into_iter().map(|x| x as i32).collect(),
            Decoded::U8(v) => v.into_iter().map(|x| x as i32).collect(),
            Decoded::I16(v) => v.into_iter().map(|x| x as i32).collect(),
            Decoded::U16(v) => v.into_iter().map(|x| x as i32).collect(),
            Decoded::I32(v) => v,
            Decoded::U32(v) => v.into_iter().map(|x| x as i32).collect(),
            other => {
                return Err(Error::FileFormat(format!(
                    "{stage} expects an integer array, found {}",
                    other.kind_name()
                )))
            }
        })
    }
}

/// Run an encoding chain (application order) over a raw payload.
pub(crate) fn run(data: Vec<u8>, chain: &[Encoding]) -> Result<Decoded, Error> {
    let mut current = Decoded::Raw(data);
    for encoding in chain {
        current = apply(current, encoding)?;
        trace!(
            stage = stage_name(encoding),
            len = current.len(),
            "decoded stage"
        );
    }
    Ok(current)
}

/// Decode a mask chain to the canonical `u8` presence vector
/// (`0` present, `1` omitted, `2` unknown).
pub(crate) fn mask(data: Vec<u8>, chain: &[Encoding]) -> Result<Vec<u8>, Error> {
    match run(data, chain)? {
        Decoded::U8(v) => Ok(v),
        Decoded::Raw(v) => Ok(v),
        other => Ok(other
            .into_i32("mask")?
            .into_iter()
            .map(|x| x as u8)
            .collect()),
    }
}

fn stage_name(encoding: &Encoding) -> &'static str {
    match encoding {
        Encoding::ByteArray { .. } => "ByteArray",
        Encoding::IntegerPacking => "IntegerPacking",
        Encoding::Delta { .. } => "Delta",
        Encoding::RunLength => "RunLength",
        Encoding::FixedPoint { .. } => "FixedPoint",
        Encoding::StringArray(_) => "StringArray",
    }
}

fn apply(input: Decoded, encoding: &Encoding) -> Result<Decoded, Error> {
    match encoding {
        Encoding::ByteArray { ty } => byte_array(input, *ty),
        Encoding::IntegerPacking => integer_packing(input),
        Encoding::Delta { origin } => delta(input, *origin),
        Encoding::RunLength => run_length(input),
        Encoding::FixedPoint { factor } => fixed_point(input, *factor),
        Encoding::StringArray(sa) => string_array(input, sa),
    }
}

/// Reinterpret raw bytes as a little-endian typed vector.
fn byte_array(input: Decoded, ty: ByteType) -> Result<Decoded, Error> {
    let bytes = match input {
        Decoded::Raw(b) => b,
        other => {
            return Err(Error::FileFormat(format!(
                "ByteArray expects raw bytes, found {}",
                other.kind_name()
            )))
        }
    };
    let width = ty.width();
    if bytes.len() % width != 0 {
        return Err(Error::FileFormat(format!(
            "ByteArray payload of {} bytes is not a multiple of element width {width}",
            bytes.len()
        )));
    }
    Ok(match ty {
        ByteType::I8 => Decoded::I8(bytes.iter().map(|&b| b as i8).collect()),
        ByteType::U8 => Decoded::U8(bytes),
        ByteType::I16 => Decoded::I16(
            bytes
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        ByteType::U16 => Decoded::U16(
            bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        ByteType::I32 => Decoded::I32(
            bytes
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        ByteType::U32 => Decoded::U32(
            bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        ByteType::F32 => Decoded::F32(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        ByteType::F64 => Decoded::F64(
            bytes
                .chunks_exact(8)
                .map(|c| {
                    f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                })
                .collect(),
        ),
    })
}

/// Expand runs of saturated sentinel values into single `i32` sums. The
/// sentinels are the type's extremes (both for signed, the max for
/// unsigned); each run ends at the first non-sentinel element. A trailing
/// run with no terminator emits nothing.
fn integer_packing(input: Decoded) -> Result<Decoded, Error> {
    fn unpack<T: Copy>(values: &[T], upper: i32, lower: i32, widen: fn(T) -> i32) -> Vec<i32> {
        let mut out = Vec::new();
        let mut sum: i32 = 0;
        for &raw in values {
            let v = widen(raw);
            if v == upper || v == lower {
                sum = sum.wrapping_add(v);
            } else {
                out.push(sum.wrapping_add(v));
                sum = 0;
            }
        }
        out
    }
    Ok(Decoded::I32(match input {
        Decoded::I8(v) => unpack(&v, i8::MAX as i32, i8::MIN as i32, |x: i8| x as i32),
        Decoded::U8(v) => unpack(&v, u8::MAX as i32, i32::MIN, |x: u8| x as i32),
        Decoded::I16(v) => unpack(&v, i16::MAX as i32, i16::MIN as i32, |x: i16| x as i32),
        Decoded::U16(v) => unpack(&v, u16::MAX as i32, i32::MIN, |x: u16| x as i32),
        other => {
            return Err(Error::FileFormat(format!(
                "IntegerPacking expects a packed integer array, found {}",
                other.kind_name()
            )))
        }
    }))
}

/// In-place prefix-sum starting at `origin`.
fn delta(input: Decoded, origin: i32) -> Result<Decoded, Error> {
    let mut v = input.into_i32("Delta")?;
    let mut acc = origin;
    for x in &mut v {
        acc = acc.wrapping_add(*x);
        *x = acc;
    }
    Ok(Decoded::I32(v))
}

/// Expand alternating `(value, count)` pairs into a flat vector.
fn run_length(input: Decoded) -> Result<Decoded, Error> {
    let v = input.into_i32("RunLength")?;
    if v.len() % 2 != 0 {
        return Err(Error::FileFormat(
            "RunLength input length must be even".into(),
        ));
    }
    let mut out = Vec::new();
    for pair in v.chunks_exact(2) {
        let count = usize::try_from(pair[1]).map_err(|_| {
            Error::FileFormat(format!("RunLength repeat count {} is negative", pair[1]))
        })?;
        out.extend(std::iter::repeat(pair[0]).take(count));
    }
    Ok(Decoded::I32(out))
}

/// Divide each integer by `factor` into `f64`.
fn fixed_point(input: Decoded, factor: i32) -> Result<Decoded, Error> {
    if factor == 0 {
        return Err(Error::FileFormat("FixedPoint factor must be nonzero".into()));
    }
    let v = input.into_i32("FixedPoint")?;
    let f = factor as f64;
    Ok(Decoded::F64(v.into_iter().map(|x| x as f64 / f).collect()))
}

/// Resolve per-row indices against offset-delimited string data. The raw
/// column payload is first decoded through the embedded `dataEncoding`
/// chain; the offsets through `offsetEncoding`.
fn string_array(input: Decoded, sa: &StringArray) -> Result<Decoded, Error> {
    let indices = match input {
        Decoded::Raw(bytes) => run(bytes, &sa.data_encoding)?.into_i32("StringArray indices")?,
        other => other.into_i32("StringArray indices")?,
    };
    let offsets = run(sa.offsets.clone(), &sa.offset_encoding)?.into_i32("StringArray offsets")?;

    let limit = sa.string_data.len();
    let mut spans = Vec::with_capacity(offsets.len().saturating_sub(1));
    for w in offsets.windows(2) {
        let (start, end) = (w[0], w[1]);
        if start < 0 || end < start || end as usize > limit {
            return Err(Error::FileFormat(format!(
                "StringArray offset pair ({start}, {end}) out of bounds for {limit} bytes"
            )));
        }
        let (start, end) = (start as usize, end as usize);
        if !sa.string_data.is_char_boundary(start) || !sa.string_data.is_char_boundary(end) {
            return Err(Error::FileFormat(
                "StringArray offset splits a UTF-8 character".into(),
            ));
        }
        spans.push((start as u32, end as u32));
    }

    let mut cells = Vec::with_capacity(indices.len());
    for idx in indices {
        let span = usize::try_from(idx)
            .ok()
            .and_then(|i| spans.get(i).copied())
            .ok_or_else(|| {
                Error::FileFormat(format!(
                    "StringArray index {idx} out of range for {} strings",
                    spans.len()
                ))
            })?;
        cells.push(span);
    }
    Ok(Decoded::Str(StrColumn {
        data: sa.string_data.clone(),
        cells,
    }))
}
