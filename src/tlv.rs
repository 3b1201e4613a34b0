//! Backward BER-TLV encoder (ISO 7816-4 §7.4.3).
//!
//! Writes into the caller's buffer from the end toward the beginning, so a
//! nested structure learns its length by subtraction once its children are
//! in place. Handlers run the encoder twice: a dry run (no buffer) to size
//! the output, then a real run over an exactly-sized slice.

use alloc::vec::Vec;

use crate::error::UicardError;

pub struct TlvEncoder<'a> {
    /// None on a dry run; length bookkeeping still happens.
    buf: Option<&'a mut [u8]>,
    /// Next write goes to buf[cursor - n .. cursor].
    cursor: usize,
    /// Bytes emitted in the innermost open scope.
    written: usize,
    /// Saved `written` of each enclosing scope.
    scopes: Vec<usize>,
}

impl<'a> TlvEncoder<'a> {
    /// Dry run: counts bytes, writes nothing, never underflows.
    pub fn dry() -> TlvEncoder<'static> {
        TlvEncoder {
            buf: None,
            cursor: 0,
            written: 0,
            scopes: Vec::new(),
        }
    }

    /// Real run over a buffer the dry run sized.
    pub fn new(buf: &'a mut [u8]) -> Self {
        let cursor = buf.len();
        Self {
            buf: Some(buf),
            cursor,
            written: 0,
            scopes: Vec::new(),
        }
    }

    /// Opens a nested structure. Every `begin` needs a matching `end`.
    pub fn begin(&mut self) {
        self.scopes.push(self.written);
        self.written = 0;
    }

    /// Closes the innermost structure, promoting its extent into the parent.
    pub fn end(&mut self) -> Result<(), UicardError> {
        let parent = self.scopes.pop().ok_or(UicardError::BadParameters)?;
        self.written += parent;
        Ok(())
    }

    /// Prepends raw value bytes.
    pub fn data(&mut self, bytes: &[u8]) -> Result<(), UicardError> {
        self.put(bytes)?;
        Ok(())
    }

    /// Prepends the length of the current scope (definite short or long
    /// form) followed by the tag byte.
    pub fn hdr(&mut self, tag: u8) -> Result<(), UicardError> {
        let len = self.written;
        if len < 0x80 {
            self.put(&[len as u8])?;
        } else if len <= 0xFF {
            self.put(&[0x81, len as u8])?;
        } else if len <= 0xFFFF {
            self.put(&[0x82, (len >> 8) as u8, len as u8])?;
        } else {
            return Err(UicardError::BadParameters);
        }
        self.put(&[tag])?;
        Ok(())
    }

    /// Total bytes emitted so far (all scopes).
    pub fn len(&self) -> usize {
        self.written + self.scopes.iter().sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), UicardError> {
        if let Some(buf) = self.buf.as_deref_mut() {
            if self.cursor < bytes.len() {
                return Err(UicardError::BufferTooShort);
            }
            self.cursor -= bytes.len();
            buf[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
        }
        self.written += bytes.len();
        Ok(())
    }
}
