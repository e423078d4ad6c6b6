//! Buffered ROM image access
//!
//! Provides:
//! - A fully in-memory view of the scanned image with its mapping base
//! - Typed little-endian primitive reads (bounds-checked)
//! - Permissive and strict resolution of stored pointer words
//! - Offset-scoped readers for walking records at arbitrary positions

use byteorder::{ByteOrder, LE};

use crate::{Error, Result};

/// Default mapping base for GBA cartridge ROM.
pub const GBA_ROM_BASE: u32 = 0x0800_0000;

/// A ROM image buffered in memory, together with the address its first
/// byte is mapped at. Stored pointer words hold mapped addresses, not
/// file offsets; all resolution goes through this type.
#[derive(Debug, Clone)]
pub struct RomImage {
    data: Vec<u8>,
    base: u32,
}

impl RomImage {
    pub fn new(data: Vec<u8>, base: u32) -> Self {
        Self { data, base }
    }

    /// Image length in bytes.
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Mapping base address.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Mapped address of an image offset.
    pub fn addr(&self, offset: u32) -> u32 {
        self.base.wrapping_add(offset)
    }

    /// Permissive pointer rule: a stored word maps into the image iff
    /// `base <= word < base + len`. Returns the image offset, or None
    /// for anything else (including null). Never fails.
    pub fn resolve(&self, word: u32) -> Option<u32> {
        let rel = word.checked_sub(self.base)?;
        (rel < self.len()).then_some(rel)
    }

    /// Strict pointer rule: as [`resolve`](Self::resolve), but a word
    /// that does not map into the image is a structural error.
    pub fn require(&self, word: u32) -> Result<u32> {
        self.resolve(word).ok_or(Error::BadPointer { value: word })
    }

    /// Bounds-checked byte slice at an image offset.
    pub fn bytes(&self, offset: u32, len: u32) -> Result<&[u8]> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.len())
            .ok_or(Error::OutOfRange {
                offset,
                len,
                size: self.len(),
            })?;
        Ok(&self.data[offset as usize..end as usize])
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Forward-only reader positioned inside a [`RomImage`].
///
/// Record parsers create one per record with [`Reader::at`]; nested
/// records jump by creating a fresh reader at the resolved offset and
/// returning, so the caller's position is never disturbed.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    image: &'a RomImage,
    pos: u32,
}

impl<'a> Reader<'a> {
    pub fn at(image: &'a RomImage, offset: u32) -> Self {
        Self { image, pos: offset }
    }

    /// Current image offset.
    pub fn pos(&self) -> u32 {
        self.pos
    }

    pub fn image(&self) -> &'a RomImage {
        self.image
    }

    fn take(&mut self, len: u32) -> Result<&'a [u8]> {
        let bytes = self.image.bytes(self.pos, len)?;
        self.pos += len;
        Ok(bytes)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(LE::read_u16(self.take(2)?))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(LE::read_i16(self.take(2)?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(LE::read_u32(self.take(4)?))
    }

    /// Raw byte run starting at the current position.
    pub fn blob(&mut self, len: u32) -> Result<&'a [u8]> {
        self.take(len)
    }
}
