//! Little-endian primitives for the raw persisted layouts.
//!
//! Matrices and trees are written field by field with explicit widths so
//! the byte layout does not depend on struct layout or platform. Reads
//! surface a short stream as [`DeserializeError::Truncated`] naming the
//! section being read.

use std::io::{self, Read, Write};

use super::native::DeserializeError;

/// Upper bound on speculative preallocation driven by counts read from a
/// stream. Larger sequences still load, growing as elements arrive.
pub(crate) const PREALLOC_LIMIT: usize = 1 << 16;

/// Little-endian writers for any [`Write`].
pub trait WriteLe: Write {
    #[inline]
    fn write_le_u8(&mut self, v: u8) -> io::Result<()> {
        self.write_all(&[v])
    }

    #[inline]
    fn write_le_u32(&mut self, v: u32) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    #[inline]
    fn write_le_i32(&mut self, v: i32) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    #[inline]
    fn write_le_u64(&mut self, v: u64) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    #[inline]
    fn write_le_f32(&mut self, v: f32) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    /// Write a `usize` as `u64`.
    #[inline]
    fn write_le_len(&mut self, v: usize) -> io::Result<()> {
        self.write_le_u64(v as u64)
    }
}

impl<W: Write + ?Sized> WriteLe for W {}

/// Little-endian readers for any [`Read`].
pub trait ReadLe: Read {
    fn read_le_array<const N: usize>(
        &mut self,
        section: &'static str,
    ) -> Result<[u8; N], DeserializeError> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)
            .map_err(|e| DeserializeError::from_read(e, section))?;
        Ok(buf)
    }

    #[inline]
    fn read_le_u8(&mut self, section: &'static str) -> Result<u8, DeserializeError> {
        Ok(self.read_le_array::<1>(section)?[0])
    }

    #[inline]
    fn read_le_u32(&mut self, section: &'static str) -> Result<u32, DeserializeError> {
        Ok(u32::from_le_bytes(self.read_le_array(section)?))
    }

    #[inline]
    fn read_le_i32(&mut self, section: &'static str) -> Result<i32, DeserializeError> {
        Ok(i32::from_le_bytes(self.read_le_array(section)?))
    }

    #[inline]
    fn read_le_u64(&mut self, section: &'static str) -> Result<u64, DeserializeError> {
        Ok(u64::from_le_bytes(self.read_le_array(section)?))
    }

    #[inline]
    fn read_le_f32(&mut self, section: &'static str) -> Result<f32, DeserializeError> {
        Ok(f32::from_le_bytes(self.read_le_array(section)?))
    }

    /// Read a `u64` length or offset that must fit in `usize`.
    fn read_le_len(&mut self, section: &'static str) -> Result<usize, DeserializeError> {
        let v = self.read_le_u64(section)?;
        usize::try_from(v)
            .map_err(|_| DeserializeError::Corrupt(format!("{section}: length {v} overflows")))
    }

    /// Read `count` elements with `read_one`.
    fn read_le_vec<T>(
        &mut self,
        count: usize,
        mut read_one: impl FnMut(&mut Self) -> Result<T, DeserializeError>,
    ) -> Result<Vec<T>, DeserializeError> {
        let mut out = Vec::with_capacity(count.min(PREALLOC_LIMIT));
        for _ in 0..count {
            out.push(read_one(self)?);
        }
        Ok(out)
    }
}

impl<R: Read + ?Sized> ReadLe for R {}
