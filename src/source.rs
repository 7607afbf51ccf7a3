//! Pull-source adapters.
//!
//! Any [`Read`] implementor is a pull source. [`MaybeGzip`] sniffs the
//! two-byte gzip magic and inflates transparently, so callers can hand the
//! reader a `.cif`, `.cif.gz`, `.bcif`, or `.bcif.gz` stream without caring
//! which they have.

use std::io::{self, Read};

use flate2::read::GzDecoder;

type Replay<R> = io::Chain<io::Cursor<Vec<u8>>, R>;

enum Inner<R: Read> {
    Plain(Replay<R>),
    Gzip(GzDecoder<Replay<R>>),
}

/// A source that inflates gzip-compressed input and passes everything else
/// through untouched.
pub struct MaybeGzip<R: Read>(Inner<R>);

impl<R: Read> MaybeGzip<R> {
    /// Sniff the magic bytes of `src` and pick the matching path.
    pub fn new(mut src: R) -> io::Result<Self> {
        let mut magic = Vec::with_capacity(2);
        let mut byte = [0u8; 1];
        while magic.len() < 2 {
            match src.read(&mut byte)? {
                0 => break,
                _ => magic.push(byte[0]),
            }
        }
        let gzipped = magic == [0x1f, 0x8b];
        let replay = io::Cursor::new(magic).chain(src);
        Ok(MaybeGzip(if gzipped {
            Inner::Gzip(GzDecoder::new(replay))
        } else {
            Inner::Plain(replay)
        }))
    }
}

impl<R: Read> Read for MaybeGzip<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        match &mut self.0 {
            Inner::Plain(r) => r.read(dst),
            Inner::Gzip(r) => r.read(dst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn read_all(src: impl Read) -> Vec<u8> {
        let mut out = Vec::new();
        MaybeGzip::new(src).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn plain_input_passes_through() {
        assert_eq!(read_all(&b"data_x\n_entry.id 1YTI\n"[..]), b"data_x\n_entry.id 1YTI\n");
    }

    #[test]
    fn gzipped_input_is_inflated() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"data_x\n_entry.id 1YTI\n").unwrap();
        let compressed = enc.finish().unwrap();
        assert_eq!(read_all(&compressed[..]), b"data_x\n_entry.id 1YTI\n");
    }

    #[test]
    fn short_input_is_not_mistaken_for_gzip() {
        assert_eq!(read_all(&b"#"[..]), b"#");
        assert_eq!(read_all(&b""[..]), b"");
    }
}
