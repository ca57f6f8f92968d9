//! Buffered blocking reader for fundamental wire types.
//!
//! Reads are served from an internal buffer. When a read asks for more bytes
//! than are buffered, the reader pulls from the underlying stream in chunks of
//! [`MIN_CHUNK`] to [`MAX_CHUNK`] bytes until the request can be satisfied.
//! Lengths come from the peer, so memory only grows with bytes that actually
//! arrive.

use std::io::{self, Read};

use bytes::{Buf, BytesMut};

use crate::error::{BridgeError, Result};

/// Smallest receive issued against the underlying stream.
pub const MIN_CHUNK: usize = 1024;

/// Largest receive issued against the underlying stream.
pub const MAX_CHUNK: usize = 64 * 1024;

pub struct ChannelReader<R> {
    inner: R,
    buf: BytesMut,
    scratch: Vec<u8>,
    eof: bool,
}

impl<R: Read> ChannelReader<R> {
    /// Reader over `inner` with an empty buffer.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MIN_CHUNK),
            scratch: Vec::new(),
            eof: false,
        }
    }

    /// Bytes currently buffered and not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True once the underlying stream is exhausted and nothing is buffered.
    pub fn is_eof(&mut self) -> bool {
        if !self.buf.is_empty() {
            return false;
        }
        if self.eof {
            return true;
        }
        self.replenish(1).is_err()
    }

    /// Underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Underlying stream; buffered bytes are discarded.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn replenish(&mut self, needed: usize) -> Result<()> {
        while self.buf.len() < needed {
            if self.eof {
                return Err(BridgeError::EndOfStream {
                    needed,
                    available: self.buf.len(),
                });
            }

            let amount = (needed - self.buf.len()).clamp(MIN_CHUNK, MAX_CHUNK);
            self.scratch.resize(amount, 0);

            let read = match self.inner.read(&mut self.scratch[..amount]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if read == 0 {
                self.eof = true;
                continue;
            }

            tracing::trace!(read, needed, buffered = self.buf.len(), "Replenished channel buffer");
            self.buf.extend_from_slice(&self.scratch[..read]);
        }
        Ok(())
    }

    fn ensure(&mut self, n: usize) -> Result<()> {
        if self.buf.len() < n {
            self.replenish(n)?;
        }
        Ok(())
    }

    fn resolve_len(&mut self, len: Option<usize>) -> Result<usize> {
        match len {
            Some(n) => Ok(n),
            None => {
                let n = self.read_i32()?;
                usize::try_from(n).map_err(|_| BridgeError::malformed(format!("negative length {n}")))
            }
        }
    }

    fn sized(&mut self, count: usize, width: usize) -> Result<()> {
        let total = count
            .checked_mul(width)
            .ok_or_else(|| BridgeError::malformed(format!("array of {count} elements overflows")))?;
        self.ensure(total)
    }

    /// Single unsigned byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Byte as a boolean; any nonzero value is true.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    /// Little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    /// Little-endian `i16`.
    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.buf.get_i16_le())
    }

    /// Little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32_le())
    }

    /// Little-endian `i64`.
    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.buf.get_i64_le())
    }

    /// Little-endian IEEE 754 double.
    pub fn read_f64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.buf.get_f64_le())
    }

    /// Length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.resolve_len(None)?;
        self.ensure(len)?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec())
            .map_err(|e| BridgeError::malformed(format!("string is not valid UTF-8: {e}")))
    }

    /// Raw bytes; `len` of `None` reads a 4-byte length prefix first.
    pub fn read_bytes(&mut self, len: Option<usize>) -> Result<Vec<u8>> {
        let len = self.resolve_len(len)?;
        self.ensure(len)?;
        Ok(self.buf.split_to(len).to_vec())
    }

    /// Booleans, one byte each; `None` reads the count prefix first.
    pub fn read_bool_array(&mut self, len: Option<usize>) -> Result<Vec<bool>> {
        let len = self.resolve_len(len)?;
        self.sized(len, 1)?;
        Ok((0..len).map(|_| self.buf.get_u8() != 0).collect())
    }

    /// `i32` values; `None` reads the count prefix first.
    pub fn read_i32_array(&mut self, len: Option<usize>) -> Result<Vec<i32>> {
        let len = self.resolve_len(len)?;
        self.sized(len, 4)?;
        Ok((0..len).map(|_| self.buf.get_i32_le()).collect())
    }

    /// `i64` values; `None` reads the count prefix first.
    pub fn read_i64_array(&mut self, len: Option<usize>) -> Result<Vec<i64>> {
        let len = self.resolve_len(len)?;
        self.sized(len, 8)?;
        Ok((0..len).map(|_| self.buf.get_i64_le()).collect())
    }

    /// Doubles; `None` reads the count prefix first.
    pub fn read_f64_array(&mut self, len: Option<usize>) -> Result<Vec<f64>> {
        let len = self.resolve_len(len)?;
        self.sized(len, 8)?;
        Ok((0..len).map(|_| self.buf.get_f64_le()).collect())
    }

    /// Length-prefixed strings; `None` reads the count prefix first.
    pub fn read_string_array(&mut self, len: Option<usize>) -> Result<Vec<String>> {
        let len = self.resolve_len(len)?;
        (0..len).map(|_| self.read_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most `step` bytes per read call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
        calls: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            let n = self.step.min(out.len()).min(self.data.len() - self.pos);
            out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn le_bytes() -> Vec<u8> {
        let mut v = Vec::new();
        v.push(0xab);
        v.extend_from_slice(&0xd00du16.to_le_bytes());
        v.extend_from_slice(&(-5i32).to_le_bytes());
        v.extend_from_slice(&(1i64 << 40).to_le_bytes());
        v.extend_from_slice(&2.5f64.to_le_bytes());
        v.extend_from_slice(&3i32.to_le_bytes());
        v.extend_from_slice(&("héllo".len() as i32).to_le_bytes());
        v.extend_from_slice("héllo".as_bytes());
        v
    }

    #[test]
    fn reads_scalars_little_endian() {
        let bytes = le_bytes();
        let mut reader = ChannelReader::new(bytes.as_slice());

        assert_eq!(reader.read_byte().unwrap(), 0xab);
        assert_eq!(reader.read_u16().unwrap(), 0xd00d);
        assert_eq!(reader.read_i32().unwrap(), -5);
        assert_eq!(reader.read_i64().unwrap(), 1 << 40);
        assert_eq!(reader.read_f64().unwrap(), 2.5);
        assert_eq!(reader.read_i32().unwrap(), 3);
        assert_eq!(reader.read_string().unwrap(), "héllo");
        assert!(reader.is_eof());
    }

    #[test]
    fn replenishes_across_short_reads() {
        let mut data = Vec::new();
        data.extend_from_slice(&4i32.to_le_bytes());
        for v in [1.0f64, 2.0, 3.0, 4.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let mut source = Trickle {
            data,
            pos: 0,
            step: 3,
            calls: 0,
        };
        let mut reader = ChannelReader::new(&mut source);

        assert_eq!(reader.read_f64_array(None).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        drop(reader);
        assert!(source.calls > 1);
    }

    #[test]
    fn explicit_length_skips_prefix() {
        let mut data = Vec::new();
        data.extend_from_slice(&7i32.to_le_bytes());
        data.extend_from_slice(&9i32.to_le_bytes());
        let mut reader = ChannelReader::new(data.as_slice());

        assert_eq!(reader.read_i32_array(Some(2)).unwrap(), vec![7, 9]);
    }

    #[test]
    fn exhausted_stream_is_end_of_stream() {
        let data = [1u8, 2];
        let mut reader = ChannelReader::new(&data[..]);

        match reader.read_i32() {
            Err(BridgeError::EndOfStream { needed, available }) => {
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("expected end of stream, got {other:?}"),
        }
    }

    #[test]
    fn oversized_length_does_not_preallocate() {
        let mut data = Vec::new();
        data.extend_from_slice(&50_000_000i32.to_le_bytes());
        data.extend_from_slice(&1.5f64.to_le_bytes()[..4]);
        let mut reader = ChannelReader::new(data.as_slice());

        match reader.read_f64_array(None) {
            Err(BridgeError::EndOfStream { needed, available }) => {
                assert_eq!(needed, 400_000_000);
                assert_eq!(available, 4);
            }
            other => panic!("expected end of stream, got {other:?}"),
        }
        assert!(reader.scratch.capacity() <= MAX_CHUNK);
        assert!(reader.buf.capacity() <= MAX_CHUNK);
    }

    #[test]
    fn large_payload_arrives_in_bounded_chunks() {
        let count = 3 * MAX_CHUNK / 8;
        let mut data = Vec::new();
        data.extend_from_slice(&(count as i32).to_le_bytes());
        for i in 0..count {
            data.extend_from_slice(&(i as f64).to_le_bytes());
        }
        let mut reader = ChannelReader::new(data.as_slice());

        let values = reader.read_f64_array(None).unwrap();
        assert_eq!(values.len(), count);
        assert_eq!(values[count - 1], (count - 1) as f64);
        assert!(reader.scratch.len() <= MAX_CHUNK);
    }

    #[test]
    fn negative_length_is_malformed() {
        let data = (-1i32).to_le_bytes();
        let mut reader = ChannelReader::new(&data[..]);

        assert!(matches!(reader.read_string(), Err(BridgeError::Malformed(_))));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let mut data = Vec::new();
        data.extend_from_slice(&2i32.to_le_bytes());
        data.extend_from_slice(&[0xff, 0xfe]);
        let mut reader = ChannelReader::new(data.as_slice());

        assert!(matches!(reader.read_string(), Err(BridgeError::Malformed(_))));
    }
}
