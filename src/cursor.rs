//! Bounds-checked, endian-aware reader over an in-memory byte source

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{ConvertError, Result};

/// Byte order declared by a TIFF header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// "II"
    Little,
    /// "MM"
    Big,
}

/// Cursor over a borrowed byte slice.
///
/// Every read is checked against the end of the source and fails with
/// [`ConvertError::TruncatedInput`] instead of panicking. Slices returned
/// by the cursor borrow from the source, so no pixel data is copied.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    order: Endianness,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8], order: Endianness) -> Self {
        ByteCursor {
            data,
            pos: 0,
            order,
        }
    }

    pub fn order(&self) -> Endianness {
        self.order
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Move to an absolute offset; the offset may equal the source length
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.data.len() as u64 {
            return Err(ConvertError::TruncatedInput { offset, needed: 0 });
        }
        self.pos = offset as usize;
        Ok(())
    }

    /// Borrow `len` bytes at an absolute offset without moving the cursor
    pub fn slice_at(&self, offset: u64, len: u64) -> Result<&'a [u8]> {
        let end = offset.checked_add(len);
        match end {
            Some(end) if end <= self.data.len() as u64 => {
                Ok(&self.data[offset as usize..end as usize])
            }
            _ => Err(ConvertError::TruncatedInput {
                offset,
                needed: len,
            }),
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self.slice_at(self.pos as u64, len as u64)?;
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(match self.order {
            Endianness::Little => LittleEndian::read_u16(bytes),
            Endianness::Big => BigEndian::read_u16(bytes),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(match self.order {
            Endianness::Little => LittleEndian::read_u32(bytes),
            Endianness::Big => BigEndian::read_u32(bytes),
        })
    }

    /// Decode a u16 from a slice using this cursor's byte order
    pub fn u16_from(&self, bytes: &[u8]) -> u16 {
        match self.order {
            Endianness::Little => LittleEndian::read_u16(bytes),
            Endianness::Big => BigEndian::read_u16(bytes),
        }
    }

    /// Decode a u32 from a slice using this cursor's byte order
    pub fn u32_from(&self, bytes: &[u8]) -> u32 {
        match self.order {
            Endianness::Little => LittleEndian::read_u32(bytes),
            Endianness::Big => BigEndian::read_u32(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_respect_byte_order() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let mut le = ByteCursor::new(&data, Endianness::Little);
        assert_eq!(le.read_u16().unwrap(), 0x3412);
        assert_eq!(le.position(), 2);

        let mut be = ByteCursor::new(&data, Endianness::Big);
        assert_eq!(be.read_u32().unwrap(), 0x12345678);
        assert_eq!(be.remaining(), 0);
    }

    #[test]
    fn test_read_past_end_fails() {
        let data = [1, 2, 3];
        let mut cursor = ByteCursor::new(&data, Endianness::Little);
        cursor.seek(2).unwrap();
        let err = cursor.read_u16().unwrap_err();
        assert!(matches!(
            err,
            ConvertError::TruncatedInput {
                offset: 2,
                needed: 2
            }
        ));
        // Failed reads leave the position untouched
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_slice_at_overflow_is_truncation() {
        let data = [0u8; 8];
        let cursor = ByteCursor::new(&data, Endianness::Big);
        assert_eq!(cursor.slice_at(4, 4).unwrap().len(), 4);
        assert!(cursor.slice_at(u64::MAX, 2).is_err());
        assert!(cursor.slice_at(6, 3).is_err());
    }

    #[test]
    fn test_seek_bounds() {
        let data = [0u8; 4];
        let mut cursor = ByteCursor::new(&data, Endianness::Little);
        assert!(cursor.seek(4).is_ok());
        assert!(cursor.seek(5).is_err());
    }
}
