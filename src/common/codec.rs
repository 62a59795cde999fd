//! Endian-aware byte codec.
//!
//! [`ByteWriter`] and [`ByteReader`] serialize the primitive values used by
//! every on-disk structure (bucket index blocks, shape descriptors, table
//! descriptors, reference tables, saved syntax trees). The byte order is a
//! property of the file being written, not of the machine.

use crate::common::config::Endian;
use crate::common::{Error, Result};

macro_rules! endian_bytes {
    ($name:ident, $read:ident, $ty:ty, $n:expr) => {
        /// Write a value into the front of `buf`.
        #[inline]
        pub fn $name(endian: Endian, buf: &mut [u8], value: $ty) {
            let bytes = match endian {
                Endian::Little => value.to_le_bytes(),
                Endian::Big => value.to_be_bytes(),
            };
            buf[..$n].copy_from_slice(&bytes);
        }

        /// Read a value from the front of `buf`.
        #[inline]
        pub fn $read(endian: Endian, buf: &[u8]) -> $ty {
            let mut bytes = [0u8; $n];
            bytes.copy_from_slice(&buf[..$n]);
            match endian {
                Endian::Little => <$ty>::from_le_bytes(bytes),
                Endian::Big => <$ty>::from_be_bytes(bytes),
            }
        }
    };
}

endian_bytes!(write_u16, read_u16, u16, 2);
endian_bytes!(write_u32, read_u32, u32, 4);
endian_bytes!(write_u64, read_u64, u64, 8);
endian_bytes!(write_i16, read_i16, i16, 2);
endian_bytes!(write_i32, read_i32, i32, 4);
endian_bytes!(write_i64, read_i64, i64, 8);
endian_bytes!(write_f32, read_f32, f32, 4);
endian_bytes!(write_f64, read_f64, f64, 8);

/// Growable output buffer with a fixed byte order.
#[derive(Debug, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
    endian: Endian,
}

impl ByteWriter {
    pub fn new(endian: Endian) -> Self {
        Self {
            buf: Vec::new(),
            endian,
        }
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn put_u32(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        write_u32(self.endian, &mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    pub fn put_u64(&mut self, value: u64) {
        let mut bytes = [0u8; 8];
        write_u64(self.endian, &mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    pub fn put_i32(&mut self, value: i32) {
        let mut bytes = [0u8; 4];
        write_i32(self.endian, &mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    pub fn put_i64(&mut self, value: i64) {
        let mut bytes = [0u8; 8];
        write_i64(self.endian, &mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    pub fn put_f64(&mut self, value: f64) {
        let mut bytes = [0u8; 8];
        write_f64(self.endian, &mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    /// Length-prefixed UTF-8 string.
    pub fn put_str(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Length-prefixed byte string.
    pub fn put_blob(&mut self, value: &[u8]) {
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value);
    }

    /// Raw bytes without a length prefix.
    pub fn put_raw(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a byte slice with a fixed byte order.
///
/// Every getter fails with [`Error::StorageInternal`] instead of panicking
/// when the input is truncated.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
        }
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::internal(format!(
                "truncated input: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(read_u32(self.endian, self.take(4)?))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(read_u64(self.endian, self.take(8)?))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(read_i32(self.endian, self.take(4)?))
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        Ok(read_i64(self.endian, self.take(8)?))
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        Ok(read_f64(self.endian, self.take(8)?))
    }

    pub fn get_str(&mut self) -> Result<String> {
        let len = self.get_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::internal(format!("invalid UTF-8 in stored string: {e}")))
    }

    pub fn get_blob(&mut self) -> Result<Vec<u8>> {
        let len = self.get_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn get_raw(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_helpers_respect_endian() {
        let mut buf = [0u8; 4];
        write_u32(Endian::Big, &mut buf, 0x01020304);
        assert_eq!(buf, [1, 2, 3, 4]);
        write_u32(Endian::Little, &mut buf, 0x01020304);
        assert_eq!(buf, [4, 3, 2, 1]);
        assert_eq!(read_u32(Endian::Little, &buf), 0x01020304);
    }

    #[test]
    fn test_writer_reader_roundtrip() {
        for endian in [Endian::Little, Endian::Big] {
            let mut w = ByteWriter::new(endian);
            w.put_u8(7);
            w.put_bool(true);
            w.put_u32(123_456);
            w.put_u64(u64::MAX - 1);
            w.put_i64(-42);
            w.put_f64(2.5);
            w.put_str("tabledb");
            let bytes = w.into_inner();

            let mut r = ByteReader::new(&bytes, endian);
            assert_eq!(r.get_u8().unwrap(), 7);
            assert!(r.get_bool().unwrap());
            assert_eq!(r.get_u32().unwrap(), 123_456);
            assert_eq!(r.get_u64().unwrap(), u64::MAX - 1);
            assert_eq!(r.get_i64().unwrap(), -42);
            assert_eq!(r.get_f64().unwrap(), 2.5);
            assert_eq!(r.get_str().unwrap(), "tabledb");
            assert_eq!(r.remaining(), 0);
        }
    }

    #[test]
    fn test_truncated_input_is_error() {
        let mut r = ByteReader::new(&[1, 2], Endian::Little);
        let err = r.get_u32().unwrap_err();
        assert!(matches!(err, Error::StorageInternal(_)));
    }
}
