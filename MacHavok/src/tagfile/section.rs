//! Tagfile section framing
//!
//! Each section starts with a big-endian word holding its total size (header
//! included) in the low 30 bits and a leaf flag in bit 30, followed by the
//! four-character tag. Containers hold child sections back to back.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

/// Size of a section header (size word + tag).
pub const HEADER_SIZE: usize = 8;
/// Bit set on sections whose payload is data rather than child sections.
pub const LEAF_FLAG: u32 = 0x4000_0000;
const SIZE_MASK: u32 = 0x3FFF_FFFF;

/// Location of one section within the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub tag: [u8; 4],
    pub is_leaf: bool,
    /// Offset of the payload (just past the header).
    pub start: usize,
    /// Offset one past the last payload byte.
    pub end: usize,
}

impl Section {
    /// Parse the section header at `offset`.
    pub fn read(data: &[u8], offset: usize) -> Result<Self> {
        let header = data
            .get(offset..offset + HEADER_SIZE)
            .ok_or_else(|| Error::malformed("truncated section header", offset))?;
        let word = BigEndian::read_u32(&header[..4]);
        let size = (word & SIZE_MASK) as usize;
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&header[4..]);

        if size < HEADER_SIZE || offset + size > data.len() {
            return Err(Error::malformed(
                format!("section {} claims {size} bytes", String::from_utf8_lossy(&tag)),
                offset,
            ));
        }
        Ok(Self {
            tag,
            is_leaf: word & LEAF_FLAG != 0,
            start: offset + HEADER_SIZE,
            end: offset + size,
        })
    }

    #[must_use]
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }

    /// Payload bytes.
    #[must_use]
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end]
    }

    /// Direct children of a container section.
    pub fn children(&self, data: &[u8]) -> Result<Vec<Section>> {
        let mut children = Vec::new();
        let mut offset = self.start;
        while offset < self.end {
            let child = Self::read(&data[..self.end], offset)?;
            offset = child.end;
            children.push(child);
        }
        Ok(children)
    }

    /// The child with `tag`, failing with `MalformedHeader` when absent.
    pub fn child(&self, data: &[u8], tag: &[u8; 4]) -> Result<Section> {
        self.children(data)?
            .into_iter()
            .find(|c| &c.tag == tag)
            .ok_or_else(|| {
                Error::malformed(
                    format!("missing {} section inside {}", String::from_utf8_lossy(tag), self.name()),
                    self.start,
                )
            })
    }
}

/// Appends nested sections to a buffer, patching sizes as they close.
#[derive(Debug, Default)]
pub struct SectionWriter {
    out: Vec<u8>,
    open: Vec<usize>,
}

impl SectionWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a container section.
    pub fn begin(&mut self, tag: &[u8; 4]) {
        self.open.push(self.out.len());
        self.write_header(0, tag);
    }

    /// Close the innermost container section.
    pub fn end(&mut self) -> Result<()> {
        let start = self
            .open
            .pop()
            .ok_or_else(|| Error::InvalidFormat("section end without begin".to_string()))?;
        let size = Self::checked_size(self.out.len() - start)?;
        BigEndian::write_u32(&mut self.out[start..start + 4], size);
        Ok(())
    }

    /// Write a complete leaf section.
    pub fn leaf(&mut self, tag: &[u8; 4], payload: &[u8]) -> Result<()> {
        let size = Self::checked_size(HEADER_SIZE + payload.len())?;
        self.write_header(LEAF_FLAG | size, tag);
        self.out.extend_from_slice(payload);
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.open.is_empty() {
            return Err(Error::InvalidFormat(format!("{} sections left open", self.open.len())));
        }
        Ok(self.out)
    }

    fn write_header(&mut self, word: u32, tag: &[u8; 4]) {
        // Vec<u8> writes cannot fail.
        let _ = self.out.write_u32::<BigEndian>(word);
        self.out.extend_from_slice(tag);
    }

    fn checked_size(size: usize) -> Result<u32> {
        u32::try_from(size)
            .ok()
            .filter(|s| *s <= SIZE_MASK)
            .ok_or_else(|| Error::InvalidFormat(format!("section of {size} bytes is too large")))
    }
}
