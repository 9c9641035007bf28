//! Bit-level reading of NAL unit headers.
//!
//! Only a handful of leading bits of each NAL unit are ever inspected, so the
//! reader is a thin bounds-checked wrapper over a big-endian `bitstream-io`
//! reader on a byte slice.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

#[derive(Debug)]
pub struct HeaderReader<'a> {
    bs: BitReader<io::Cursor<&'a [u8]>, BigEndian>,
    len_bits: u64,
}

impl<'a> HeaderReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self {
            bs: BitReader::new(io::Cursor::new(buf)),
            len_bits: (buf.len() as u64) << 3,
        }
    }

    #[inline(always)]
    pub fn flag(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn bits<U: UnsignedInteger>(&mut self, n: u32) -> io::Result<U> {
        if n as u64 > self.remaining()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("bits({}): out of bounds at bit {}", n, self.position()?),
            ));
        }

        self.bs.read_unsigned_var(n)
    }

    #[inline(always)]
    pub fn skip(&mut self, n: u32) -> io::Result<()> {
        if n as u64 > self.remaining()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "skip: out of bounds bits",
            ));
        }

        self.bs.skip(n)
    }

    #[inline(always)]
    pub fn remaining(&mut self) -> io::Result<u64> {
        self.bs
            .position_in_bits()
            .map(|pos| self.len_bits.saturating_sub(pos))
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

#[test]
fn read_header_fields() -> io::Result<()> {
    // layer 5, type 15 (SPS), temporal_id_plus1 1
    let mut reader = HeaderReader::from_slice(&[0x05, 0x79]);
    assert!(!reader.flag()?);
    reader.skip(1)?;
    assert_eq!(reader.bits::<u8>(6)?, 5);
    assert_eq!(reader.bits::<u8>(5)?, 15);
    assert_eq!(reader.bits::<u8>(3)?, 1);
    assert_eq!(reader.remaining()?, 0);
    assert!(reader.bits::<u8>(1).is_err());
    Ok(())
}
