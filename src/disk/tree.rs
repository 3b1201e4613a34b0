// src/disk/tree.rs
//
// A tree is one contiguous byte image rooted at an MF or ADF header. Files
// are never referenced by pointer: a File is a by-value snapshot of a parsed
// header plus the tree-relative offsets needed to reach its payload, so
// mutating or reloading a tree simply invalidates old snapshots instead of
// dangling.

use alloc::vec::Vec;

use crate::error::UicardError;
use crate::header::{FileHdr, FileSpec, ItemKind};
use crate::lut::Lut;

/// Cursor stack bound for the depth-first walk; nesting is capped at
/// MF/ADF -> DF -> EF.
pub const WALK_DEPTH_MAX: usize = 3;

/// Snapshot of one file in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct File {
    pub hdr: FileHdr,
    /// Tree-relative offset of the item header.
    pub offset: u32,
    /// Tree-relative offset of the first payload byte.
    pub data_off: u32,
    /// Payload length: item size minus the kind-specific header.
    pub data_len: u32,
}

impl File {
    pub fn kind(&self) -> ItemKind {
        self.hdr.item.kind
    }

    pub fn is_folder(&self) -> bool {
        self.kind().is_folder()
    }

    /// Tree-relative offset of the parent's header, or None on a root.
    pub fn parent_offset(&self) -> Option<u32> {
        if self.hdr.item.offset_prel == 0 {
            None
        } else {
            Some(self.offset - self.hdr.item.offset_prel)
        }
    }

    /// Number of fixed-size records, zero for non-record files.
    pub fn record_count(&self) -> u32 {
        match self.hdr.spec {
            FileSpec::Record { rcrd_size } => self.data_len / u32::from(rcrd_size),
            _ => 0,
        }
    }
}

/// One tree of the forest: the raw image buffer plus the per-tree SID
/// lookup table (SFI -> tree-relative offset).
#[derive(Debug, Clone)]
pub struct Tree {
    buf: Vec<u8>,
    pub(crate) sid_lut: Lut<u8, u32>,
}

impl Tree {
    pub(crate) fn from_buf(buf: Vec<u8>) -> Self {
        Self {
            buf,
            sid_lut: Lut::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// The root file (offset 0). Always an MF or ADF on a loaded disk.
    pub fn root(&self) -> Result<File, UicardError> {
        self.file_at(0)
    }

    /// Decodes the file header at a tree-relative offset and derives the
    /// payload extent.
    pub fn file_at(&self, offset: u32) -> Result<File, UicardError> {
        let start = offset as usize;
        if start >= self.buf.len() {
            return Err(UicardError::IncompleteImage);
        }
        let hdr = FileHdr::from_bytes(&self.buf[start..])?;
        let size = hdr.item.size as usize;
        if start + size > self.buf.len() {
            return Err(UicardError::BrokenContainment);
        }
        let hdr_len = hdr.hdr_len();
        Ok(File {
            hdr,
            offset,
            data_off: offset + hdr_len as u32,
            data_len: (size - hdr_len) as u32,
        })
    }

    /// The payload bytes of a snapshot taken from this tree.
    pub fn data(&self, file: &File) -> &[u8] {
        let start = file.data_off as usize;
        &self.buf[start..start + file.data_len as usize]
    }

    /// Record slice of a linear-fixed or cyclic EF.
    pub fn record(&self, file: &File, idx: u32) -> Result<&[u8], UicardError> {
        let rcrd_size = match file.hdr.spec {
            FileSpec::Record { rcrd_size } => u32::from(rcrd_size),
            _ => return Err(UicardError::BadParameters),
        };
        if idx >= file.record_count() {
            return Err(UicardError::NotFound);
        }
        let data = self.data(file);
        let start = (idx * rcrd_size) as usize;
        Ok(&data[start..start + rcrd_size as usize])
    }

    /// The tree's SFI table, keys ascending.
    pub fn sid_lut(&self) -> &Lut<u8, u32> {
        &self.sid_lut
    }

    /// Resolves an SFI through the tree's SID lookup table.
    pub fn lookup_sid(&self, sid: u8) -> Result<File, UicardError> {
        let offset = self.sid_lut.get(&sid).ok_or(UicardError::NotFound)?;
        self.file_at(offset)
    }

    /// Depth-first walk over every file, root included. A bounded stack of
    /// byte cursors replaces recursion; each visited folder pushes a cursor
    /// just past its header, each EF advances the current cursor by its
    /// full size. Non-file item types abort the walk.
    pub fn walk<F>(&self, mut visit: F) -> Result<(), UicardError>
    where
        F: FnMut(&Tree, &File) -> Result<(), UicardError>,
    {
        let root = self.root()?;
        if root.hdr.item.size as usize != self.buf.len() {
            return Err(UicardError::BrokenContainment);
        }

        // (cursor, end) per scope; scope 0 spans the whole tree and visits
        // only the root.
        let mut stack = [(0u32, 0u32); WALK_DEPTH_MAX];
        stack[0] = (0, self.buf.len() as u32);
        let mut depth = 1usize;

        while depth > 0 {
            let (cursor, end) = stack[depth - 1];
            if cursor >= end {
                depth -= 1;
                continue;
            }
            let file = self.file_at(cursor)?;
            let size = file.hdr.item.size;
            if size == 0 || cursor + size > end {
                return Err(UicardError::BrokenContainment);
            }
            visit(self, &file)?;
            stack[depth - 1].0 = cursor + size;
            if file.is_folder() {
                if depth == WALK_DEPTH_MAX {
                    return Err(UicardError::NestingTooDeep);
                }
                stack[depth] = (file.data_off, cursor + size);
                depth += 1;
            }
        }
        Ok(())
    }

    /// Rebuilds the SID table: clear, walk, insert every file with a
    /// non-zero SFI. Left empty if the walk fails.
    pub(crate) fn rebuild_sid_lut(&mut self) -> Result<(), UicardError> {
        let mut lut = Lut::new();
        let result = self.walk(|_, file| {
            if file.hdr.sid != 0 {
                lut.insert(file.hdr.sid, file.offset);
            }
            Ok(())
        });
        match result {
            Ok(()) => {
                self.sid_lut = lut;
                Ok(())
            }
            Err(e) => {
                self.sid_lut = Lut::new();
                Err(e)
            }
        }
    }

    /// Direct children of a folder, in image order.
    pub fn children(&self, folder: &File) -> Result<Vec<File>, UicardError> {
        if !folder.is_folder() {
            return Err(UicardError::BadParameters);
        }
        let mut out = Vec::new();
        let mut cursor = folder.data_off;
        let end = folder.offset + folder.hdr.item.size;
        while cursor < end {
            let child = self.file_at(cursor)?;
            if child.hdr.item.size == 0 || cursor + child.hdr.item.size > end {
                return Err(UicardError::BrokenContainment);
            }
            out.push(child);
            cursor += child.hdr.item.size;
        }
        Ok(out)
    }
}
