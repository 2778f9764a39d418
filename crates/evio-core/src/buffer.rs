//! Byte-Ordered Buffer
//!
//! A contiguous byte region with a byte order, a capacity, and independently
//! settable read position and limit. This is the one abstraction every other
//! layer reads and writes through: headers are decoded from it, events are
//! copied out of it, and the scanner indexes straight into it.
//!
//! ## Cursor model
//!
//! ```text
//! 0 <= mark <= position <= limit <= capacity
//! ```
//!
//! Relative accessors (`get_u32`, `put_u32`, ...) read or write at `position`
//! and advance it. Absolute accessors (`get_u32_at`, `put_u32_at`, ...) leave
//! the cursor alone. Reads are bounded by `limit`, writes by `capacity`;
//! either overrun fails with `Error::OutOfBounds` instead of panicking.
//!
//! ## Byte order
//!
//! The order may be switched at any time with `set_order`; numeric accessors
//! honor the order current at call time. Header decoding relies on this:
//! reading a magic word in the wrong order is how a reader discovers it must
//! flip the buffer.
//!
//! ## Views
//!
//! `slice()` and `duplicate()` hand out `ByteSlice` values: non-owning,
//! read-only views over the same storage with their own independent cursor.
//! The buffer is the sole owner of its bytes; a view is valid for the
//! buffer's borrow and never copies.

use crate::error::{Error, Result};
use crate::order::ByteOrder;

/// Growable-capacity positioned buffer with runtime byte order.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
    limit: usize,
    mark: Option<usize>,
    order: ByteOrder,
}

impl ByteBuffer {
    /// Allocate a zero-filled buffer. Position starts at 0, limit at capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            position: 0,
            limit: capacity,
            mark: None,
            order: ByteOrder::native(),
        }
    }

    /// Wrap an existing byte vector. Limit is set to its full length.
    pub fn wrap(data: Vec<u8>) -> Self {
        let limit = data.len();
        Self {
            data,
            position: 0,
            limit,
            mark: None,
            order: ByteOrder::native(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.limit {
            return Err(Error::OutOfBounds {
                pos,
                len: 0,
                bound: self.limit,
            });
        }
        if let Some(m) = self.mark {
            if m > pos {
                self.mark = None;
            }
        }
        self.position = pos;
        Ok(())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) -> Result<()> {
        if limit > self.data.len() {
            return Err(Error::OutOfBounds {
                pos: limit,
                len: 0,
                bound: self.data.len(),
            });
        }
        self.limit = limit;
        if self.position > limit {
            self.position = limit;
        }
        if let Some(m) = self.mark {
            if m > limit {
                self.mark = None;
            }
        }
        Ok(())
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.limit
    }

    /// Limit becomes the current position, position rewinds to 0.
    /// The standard write-then-read transition.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
        self.mark = None;
    }

    /// Position back to 0, limit untouched.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.mark = None;
    }

    /// Position 0, limit to capacity. Contents are untouched.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.data.len();
        self.mark = None;
    }

    pub fn mark(&mut self) {
        self.mark = Some(self.position);
    }

    pub fn reset(&mut self) -> Result<()> {
        match self.mark {
            Some(m) => {
                self.position = m;
                Ok(())
            }
            None => Err(Error::OutOfBounds {
                pos: 0,
                len: 0,
                bound: 0,
            }),
        }
    }

    /// Move the unread bytes `[position, limit)` to the front of the buffer,
    /// leaving the cursor ready for more writes.
    pub fn compact(&mut self) {
        let len = self.remaining();
        self.data.copy_within(self.position..self.limit, 0);
        self.position = len;
        self.limit = self.data.len();
        self.mark = None;
    }

    fn check_read(&self, pos: usize, len: usize) -> Result<()> {
        if pos + len > self.limit {
            return Err(Error::OutOfBounds {
                pos,
                len,
                bound: self.limit,
            });
        }
        Ok(())
    }

    fn check_write(&self, pos: usize, len: usize) -> Result<()> {
        if pos + len > self.data.len() {
            return Err(Error::OutOfBounds {
                pos,
                len,
                bound: self.data.len(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Absolute accessors
    // ------------------------------------------------------------------

    pub fn get_u8_at(&self, pos: usize) -> Result<u8> {
        self.check_read(pos, 1)?;
        Ok(self.data[pos])
    }

    pub fn get_u16_at(&self, pos: usize) -> Result<u16> {
        self.check_read(pos, 2)?;
        Ok(self.order.read_u16(&self.data[pos..]))
    }

    pub fn get_u32_at(&self, pos: usize) -> Result<u32> {
        self.check_read(pos, 4)?;
        Ok(self.order.read_u32(&self.data[pos..]))
    }

    pub fn get_u64_at(&self, pos: usize) -> Result<u64> {
        self.check_read(pos, 8)?;
        Ok(self.order.read_u64(&self.data[pos..]))
    }

    pub fn get_i8_at(&self, pos: usize) -> Result<i8> {
        Ok(self.get_u8_at(pos)? as i8)
    }

    pub fn get_i16_at(&self, pos: usize) -> Result<i16> {
        Ok(self.get_u16_at(pos)? as i16)
    }

    pub fn get_i32_at(&self, pos: usize) -> Result<i32> {
        Ok(self.get_u32_at(pos)? as i32)
    }

    pub fn get_i64_at(&self, pos: usize) -> Result<i64> {
        Ok(self.get_u64_at(pos)? as i64)
    }

    pub fn get_f32_at(&self, pos: usize) -> Result<f32> {
        Ok(f32::from_bits(self.get_u32_at(pos)?))
    }

    pub fn get_f64_at(&self, pos: usize) -> Result<f64> {
        Ok(f64::from_bits(self.get_u64_at(pos)?))
    }

    pub fn get_bytes_at(&self, pos: usize, dst: &mut [u8]) -> Result<()> {
        self.check_read(pos, dst.len())?;
        dst.copy_from_slice(&self.data[pos..pos + dst.len()]);
        Ok(())
    }

    pub fn put_u8_at(&mut self, pos: usize, v: u8) -> Result<()> {
        self.check_write(pos, 1)?;
        self.data[pos] = v;
        Ok(())
    }

    pub fn put_u16_at(&mut self, pos: usize, v: u16) -> Result<()> {
        self.check_write(pos, 2)?;
        self.order.write_u16(&mut self.data[pos..], v);
        Ok(())
    }

    pub fn put_u32_at(&mut self, pos: usize, v: u32) -> Result<()> {
        self.check_write(pos, 4)?;
        self.order.write_u32(&mut self.data[pos..], v);
        Ok(())
    }

    pub fn put_u64_at(&mut self, pos: usize, v: u64) -> Result<()> {
        self.check_write(pos, 8)?;
        self.order.write_u64(&mut self.data[pos..], v);
        Ok(())
    }

    pub fn put_i16_at(&mut self, pos: usize, v: i16) -> Result<()> {
        self.put_u16_at(pos, v as u16)
    }

    pub fn put_i32_at(&mut self, pos: usize, v: i32) -> Result<()> {
        self.put_u32_at(pos, v as u32)
    }

    pub fn put_i64_at(&mut self, pos: usize, v: i64) -> Result<()> {
        self.put_u64_at(pos, v as u64)
    }

    pub fn put_f32_at(&mut self, pos: usize, v: f32) -> Result<()> {
        self.put_u32_at(pos, v.to_bits())
    }

    pub fn put_f64_at(&mut self, pos: usize, v: f64) -> Result<()> {
        self.put_u64_at(pos, v.to_bits())
    }

    pub fn put_bytes_at(&mut self, pos: usize, src: &[u8]) -> Result<()> {
        self.check_write(pos, src.len())?;
        self.data[pos..pos + src.len()].copy_from_slice(src);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Relative accessors
    // ------------------------------------------------------------------

    pub fn get_u8(&mut self) -> Result<u8> {
        let v = self.get_u8_at(self.position)?;
        self.position += 1;
        Ok(v)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let v = self.get_u16_at(self.position)?;
        self.position += 2;
        Ok(v)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let v = self.get_u32_at(self.position)?;
        self.position += 4;
        Ok(v)
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let v = self.get_u64_at(self.position)?;
        self.position += 8;
        Ok(v)
    }

    pub fn get_i8(&mut self) -> Result<i8> {
        Ok(self.get_u8()? as i8)
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        Ok(self.get_u16()? as i16)
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(self.get_u32()? as i32)
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        Ok(self.get_u64()? as i64)
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.get_u32()?))
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.get_u64()?))
    }

    pub fn get_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.get_bytes_at(self.position, dst)?;
        self.position += dst.len();
        Ok(())
    }

    pub fn put_u8(&mut self, v: u8) -> Result<()> {
        self.put_u8_at(self.position, v)?;
        self.position += 1;
        Ok(())
    }

    pub fn put_u16(&mut self, v: u16) -> Result<()> {
        self.put_u16_at(self.position, v)?;
        self.position += 2;
        Ok(())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<()> {
        self.put_u32_at(self.position, v)?;
        self.position += 4;
        Ok(())
    }

    pub fn put_u64(&mut self, v: u64) -> Result<()> {
        self.put_u64_at(self.position, v)?;
        self.position += 8;
        Ok(())
    }

    pub fn put_i16(&mut self, v: i16) -> Result<()> {
        self.put_u16(v as u16)
    }

    pub fn put_i32(&mut self, v: i32) -> Result<()> {
        self.put_u32(v as u32)
    }

    pub fn put_i64(&mut self, v: i64) -> Result<()> {
        self.put_u64(v as u64)
    }

    pub fn put_f32(&mut self, v: f32) -> Result<()> {
        self.put_u32(v.to_bits())
    }

    pub fn put_f64(&mut self, v: f64) -> Result<()> {
        self.put_u64(v.to_bits())
    }

    pub fn put_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.put_bytes_at(self.position, src)?;
        self.position += src.len();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Views and raw access
    // ------------------------------------------------------------------

    /// Read-only view of `[position, limit)` with an independent cursor.
    pub fn slice(&self) -> ByteSlice<'_> {
        ByteSlice {
            data: &self.data[self.position..self.limit],
            position: 0,
            order: self.order,
        }
    }

    /// Read-only view of the whole storage, cursor copied from this buffer.
    pub fn duplicate(&self) -> ByteSlice<'_> {
        ByteSlice {
            data: &self.data[..self.limit],
            position: self.position,
            order: self.order,
        }
    }

    /// The full backing storage, ignoring position and limit.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the full backing storage. Used by the in-place
    /// swapper and by structural mutation, which shift bytes underneath
    /// the cursor.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes between position and limit.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// Non-owning read-only view into a `ByteBuffer`'s storage.
///
/// Carries its own position and byte order; creating or consuming one never
/// copies the underlying bytes.
#[derive(Debug, Clone)]
pub struct ByteSlice<'a> {
    data: &'a [u8],
    position: usize,
    order: ByteOrder,
}

impl<'a> ByteSlice<'a> {
    pub fn wrap(data: &'a [u8], order: ByteOrder) -> Self {
        Self {
            data,
            position: 0,
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::OutOfBounds {
                pos,
                len: 0,
                bound: self.data.len(),
            });
        }
        self.position = pos;
        Ok(())
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn check(&self, pos: usize, len: usize) -> Result<()> {
        if pos + len > self.data.len() {
            return Err(Error::OutOfBounds {
                pos,
                len,
                bound: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn get_u32_at(&self, pos: usize) -> Result<u32> {
        self.check(pos, 4)?;
        Ok(self.order.read_u32(&self.data[pos..]))
    }

    pub fn get_u64_at(&self, pos: usize) -> Result<u64> {
        self.check(pos, 8)?;
        Ok(self.order.read_u64(&self.data[pos..]))
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.check(self.position, 1)?;
        let v = self.data[self.position];
        self.position += 1;
        Ok(v)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let v = self.get_u32_at(self.position)?;
        self.position += 4;
        Ok(v)
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let v = self.get_u64_at(self.position)?;
        self.position += 8;
        Ok(v)
    }

    pub fn get_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.check(self.position, dst.len())?;
        dst.copy_from_slice(&self.data[self.position..self.position + dst.len()]);
        self.position += dst.len();
        Ok(())
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }
}
