//! Buffered writer for fundamental wire types.
//!
//! Fields accumulate in memory; nothing reaches the underlying stream until
//! [`ChannelWriter::flush`] is called after a complete message.

use std::io::Write;

use bytes::{BufMut, BytesMut};

use crate::error::{BridgeError, Result};

pub struct ChannelWriter<W> {
    inner: W,
    buf: BytesMut,
}

impl<W: Write> ChannelWriter<W> {
    /// Writer over `inner` with an empty message buffer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(1024),
        }
    }

    /// Bytes written but not yet flushed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Underlying stream; unflushed bytes are discarded.
    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_byte(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(u8::from(v));
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.put_u16_le(v);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.put_i16_le(v);
    }

    /// Little-endian `i32`.
    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32_le(v);
    }

    /// Little-endian `i64`.
    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64_le(v);
    }

    /// Little-endian IEEE 754 double.
    pub fn write_f64(&mut self, v: f64) {
        self.buf.put_f64_le(v);
    }

    /// Writes a 4-byte element count.
    pub fn write_len(&mut self, what: &'static str, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| BridgeError::TooLong { what, len })?;
        self.write_i32(len);
        Ok(())
    }

    /// Length-prefixed UTF-8 string.
    pub fn write_string(&mut self, v: &str) -> Result<()> {
        self.write_len("string", v.len())?;
        self.buf.put_slice(v.as_bytes());
        Ok(())
    }

    /// Raw bytes, preceded by a length prefix when `with_len` is set.
    pub fn write_bytes(&mut self, v: &[u8], with_len: bool) -> Result<()> {
        if with_len {
            self.write_len("byte array", v.len())?;
        }
        self.buf.put_slice(v);
        Ok(())
    }

    /// Count prefix, then one byte per boolean.
    pub fn write_bool_array(&mut self, v: &[bool]) -> Result<()> {
        self.write_len("bool array", v.len())?;
        v.iter().for_each(|b| self.write_bool(*b));
        Ok(())
    }

    /// Count prefix, then the values.
    pub fn write_i32_array(&mut self, v: &[i32]) -> Result<()> {
        self.write_len("int32 array", v.len())?;
        v.iter().for_each(|x| self.write_i32(*x));
        Ok(())
    }

    /// Count prefix, then the values.
    pub fn write_i64_array(&mut self, v: &[i64]) -> Result<()> {
        self.write_len("int64 array", v.len())?;
        v.iter().for_each(|x| self.write_i64(*x));
        Ok(())
    }

    /// Float64 values, preceded by a length prefix when `with_len` is set.
    pub fn write_f64_array(&mut self, v: &[f64], with_len: bool) -> Result<()> {
        if with_len {
            self.write_len("float64 array", v.len())?;
        }
        v.iter().for_each(|x| self.write_f64(*x));
        Ok(())
    }

    /// Count prefix, then each string length-prefixed.
    pub fn write_string_array(&mut self, v: &[String]) -> Result<()> {
        self.write_len("string array", v.len())?;
        for s in v {
            self.write_string(s)?;
        }
        Ok(())
    }

    /// Push buffered bytes to the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            tracing::trace!(bytes = self.buf.len(), "Flushing channel buffer");
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        self.inner.flush()?;
        Ok(())
    }

    /// Drop anything not yet flushed.
    pub fn close(&mut self) {
        if !self.buf.is_empty() {
            tracing::debug!(bytes = self.buf.len(), "Discarding unflushed channel bytes on close");
        }
        self.buf.clear();
    }
}
