//! Runtime-selectable byte order.
//!
//! Every EVIO file or buffer carries its own endianness, discovered at read
//! time from the magic word, so primitive access has to be parameterized at
//! run time rather than by a type-level `byteorder` marker. `ByteOrder` is
//! that runtime switch; each accessor dispatches to the matching `byteorder`
//! implementation.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Byte order of the machine running this code.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }

    /// The opposite byte order.
    pub fn swapped(self) -> Self {
        match self {
            ByteOrder::LittleEndian => ByteOrder::BigEndian,
            ByteOrder::BigEndian => ByteOrder::LittleEndian,
        }
    }

    pub fn is_little_endian(self) -> bool {
        self == ByteOrder::LittleEndian
    }

    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => LittleEndian::read_u16(buf),
            ByteOrder::BigEndian => BigEndian::read_u16(buf),
        }
    }

    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => LittleEndian::read_u32(buf),
            ByteOrder::BigEndian => BigEndian::read_u32(buf),
        }
    }

    pub fn read_u64(self, buf: &[u8]) -> u64 {
        match self {
            ByteOrder::LittleEndian => LittleEndian::read_u64(buf),
            ByteOrder::BigEndian => BigEndian::read_u64(buf),
        }
    }

    pub fn read_i16(self, buf: &[u8]) -> i16 {
        self.read_u16(buf) as i16
    }

    pub fn read_i32(self, buf: &[u8]) -> i32 {
        self.read_u32(buf) as i32
    }

    pub fn read_i64(self, buf: &[u8]) -> i64 {
        self.read_u64(buf) as i64
    }

    pub fn read_f32(self, buf: &[u8]) -> f32 {
        f32::from_bits(self.read_u32(buf))
    }

    pub fn read_f64(self, buf: &[u8]) -> f64 {
        f64::from_bits(self.read_u64(buf))
    }

    pub fn write_u16(self, buf: &mut [u8], v: u16) {
        match self {
            ByteOrder::LittleEndian => LittleEndian::write_u16(buf, v),
            ByteOrder::BigEndian => BigEndian::write_u16(buf, v),
        }
    }

    pub fn write_u32(self, buf: &mut [u8], v: u32) {
        match self {
            ByteOrder::LittleEndian => LittleEndian::write_u32(buf, v),
            ByteOrder::BigEndian => BigEndian::write_u32(buf, v),
        }
    }

    pub fn write_u64(self, buf: &mut [u8], v: u64) {
        match self {
            ByteOrder::LittleEndian => LittleEndian::write_u64(buf, v),
            ByteOrder::BigEndian => BigEndian::write_u64(buf, v),
        }
    }

    pub fn write_i16(self, buf: &mut [u8], v: i16) {
        self.write_u16(buf, v as u16)
    }

    pub fn write_i32(self, buf: &mut [u8], v: i32) {
        self.write_u32(buf, v as u32)
    }

    pub fn write_i64(self, buf: &mut [u8], v: i64) {
        self.write_u64(buf, v as u64)
    }

    pub fn write_f32(self, buf: &mut [u8], v: f32) {
        self.write_u32(buf, v.to_bits())
    }

    pub fn write_f64(self, buf: &mut [u8], v: f64) {
        self.write_u64(buf, v.to_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapped() {
        assert_eq!(ByteOrder::LittleEndian.swapped(), ByteOrder::BigEndian);
        assert_eq!(ByteOrder::BigEndian.swapped(), ByteOrder::LittleEndian);
        assert_eq!(ByteOrder::native().swapped().swapped(), ByteOrder::native());
    }

    #[test]
    fn test_read_write_u32() {
        let mut buf = [0u8; 4];
        ByteOrder::LittleEndian.write_u32(&mut buf, 0xC0DA_0100);
        assert_eq!(buf, [0x00, 0x01, 0xDA, 0xC0]);
        assert_eq!(ByteOrder::LittleEndian.read_u32(&buf), 0xC0DA_0100);
        // Same bytes read in the opposite order give the byte-reversed value
        assert_eq!(ByteOrder::BigEndian.read_u32(&buf), 0x0001_DAC0);
    }

    #[test]
    fn test_read_write_u64_is_one_quantity() {
        let mut buf = [0u8; 8];
        ByteOrder::BigEndian.write_u64(&mut buf, 0x0102_0304_0506_0708);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            ByteOrder::LittleEndian.read_u64(&buf),
            0x0807_0605_0403_0201
        );
    }

    #[test]
    fn test_floats() {
        let mut buf = [0u8; 8];
        ByteOrder::LittleEndian.write_f64(&mut buf, 2.5);
        assert_eq!(ByteOrder::LittleEndian.read_f64(&buf), 2.5);
        ByteOrder::BigEndian.write_f32(&mut buf[..4], -1.25);
        assert_eq!(ByteOrder::BigEndian.read_f32(&buf[..4]), -1.25);
    }
}
