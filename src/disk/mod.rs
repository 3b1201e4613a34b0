//! The file-system store: a forest of trees loaded from (or saved to) the
//! binary disk image, indexed by the disk-wide FID lookup table.

mod tree;

pub use tree::{File, Tree, WALK_DEPTH_MAX};

use alloc::vec::Vec;

use log::{debug, warn};

use crate::error::UicardError;
use crate::header::{ItemHdr, ItemKind, ITEM_HDR_LEN, MAGIC};
use crate::lut::Lut;

/// The tree index travels as one byte in the FID table.
pub const TREES_MAX: usize = 255;

/// Value side of the FID table: tree-relative offset + tree index.
pub type IdEntry = (u32, u8);

#[derive(Debug, Clone)]
pub struct Disk {
    trees: Vec<Tree>,
    /// FID (big-endian bytes, so byte order is numeric order) -> location.
    pub(crate) id_lut: Lut<[u8; 2], IdEntry>,
}

impl Disk {
    /// Parses a complete image: magic, then one exact-size buffer per tree.
    /// The first tree must be an MF, every later one an ADF; anything else
    /// is fatal and no disk is returned.
    pub fn from_bytes(image: &[u8]) -> Result<Self, UicardError> {
        if image.len() < MAGIC.len() {
            return Err(UicardError::IncompleteImage);
        }
        if image[..MAGIC.len()] != MAGIC {
            return Err(UicardError::InvalidMagic);
        }

        let mut trees = Vec::new();
        let mut cursor = MAGIC.len();
        while cursor < image.len() {
            let rest = &image[cursor..];
            let hdr = ItemHdr::from_bytes(rest)?;
            let expected = if trees.is_empty() {
                ItemKind::Mf
            } else {
                ItemKind::Adf
            };
            if hdr.kind != expected {
                warn!(
                    "tree {} has root type {:?}, expected {:?}",
                    trees.len(),
                    hdr.kind,
                    expected
                );
                return Err(UicardError::MisplacedRoot(hdr.kind));
            }
            let size = hdr.size as usize;
            if size < ITEM_HDR_LEN || rest.len() < size {
                return Err(UicardError::IncompleteImage);
            }
            if trees.len() == TREES_MAX {
                return Err(UicardError::TooManyTrees);
            }
            let mut buf = Vec::with_capacity(size);
            buf.extend_from_slice(&rest[..size]);
            trees.push(Tree::from_buf(buf));
            cursor += size;
        }
        if trees.is_empty() {
            return Err(UicardError::IncompleteImage);
        }

        let mut disk = Self {
            trees,
            id_lut: Lut::new(),
        };
        disk.rebuild_luts()?;
        debug!(
            "loaded disk: {} tree(s), {} FID entries",
            disk.trees.len(),
            disk.id_lut.len()
        );
        Ok(disk)
    }

    /// Pure dump: magic followed by each tree's raw buffer in forest order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let total: usize = MAGIC.len() + self.trees.iter().map(Tree::len).sum::<usize>();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&MAGIC);
        for tree in &self.trees {
            out.extend_from_slice(tree.as_bytes());
        }
        out
    }

    /// Reads an image file from disk.
    #[cfg(feature = "std")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, UicardError> {
        let image = std::fs::read(path)?;
        Self::from_bytes(&image)
    }

    /// Writes the image file.
    #[cfg(feature = "std")]
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), UicardError> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Assembles a disk from pre-built tree buffers (the JSON ingest path).
    /// Applies the same root-type validation and LUT rebuilds as an image
    /// load.
    pub(crate) fn from_tree_bufs(bufs: Vec<Vec<u8>>) -> Result<Self, UicardError> {
        if bufs.is_empty() {
            return Err(UicardError::IncompleteImage);
        }
        if bufs.len() > TREES_MAX {
            return Err(UicardError::TooManyTrees);
        }
        let mut trees = Vec::with_capacity(bufs.len());
        for (i, buf) in bufs.into_iter().enumerate() {
            let hdr = ItemHdr::from_bytes(&buf)?;
            let expected = if i == 0 { ItemKind::Mf } else { ItemKind::Adf };
            if hdr.kind != expected {
                return Err(UicardError::MisplacedRoot(hdr.kind));
            }
            if hdr.size as usize != buf.len() {
                return Err(UicardError::BrokenContainment);
            }
            trees.push(Tree::from_buf(buf));
        }
        let mut disk = Self {
            trees,
            id_lut: Lut::new(),
        };
        disk.rebuild_luts()?;
        Ok(disk)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Random access by forest index.
    pub fn tree(&self, idx: u8) -> Option<&Tree> {
        self.trees.get(idx as usize)
    }

    /// Forest iteration, head (MF tree) first, with the 8-bit index each
    /// tree occupies in FID entries.
    pub fn trees(&self) -> impl Iterator<Item = (u8, &Tree)> {
        self.trees.iter().enumerate().map(|(i, t)| (i as u8, t))
    }

    /// Rebuilds every per-tree SID table and the disk-wide FID table.
    /// On failure all tables are left cleared, never partial.
    pub(crate) fn rebuild_luts(&mut self) -> Result<(), UicardError> {
        for tree in &mut self.trees {
            tree.rebuild_sid_lut()?;
        }

        let mut lut = Lut::new();
        for (idx, tree) in self.trees.iter().enumerate() {
            let result = tree.walk(|_, file| {
                if file.hdr.id != 0 {
                    lut.insert(file.hdr.id.to_be_bytes(), (file.offset, idx as u8));
                }
                Ok(())
            });
            if let Err(e) = result {
                self.id_lut = Lut::new();
                return Err(e);
            }
        }
        self.id_lut = lut;
        Ok(())
    }

    /// The disk-wide FID table, keys in ascending big-endian order.
    pub fn id_lut(&self) -> &Lut<[u8; 2], IdEntry> {
        &self.id_lut
    }

    /// Disk-wide FID resolution: returns the tree index and a header
    /// snapshot.
    pub fn lookup_id(&self, fid: u16) -> Result<(u8, File), UicardError> {
        let (offset, tree_idx) = self
            .id_lut
            .get(&fid.to_be_bytes())
            .ok_or(UicardError::NotFound)?;
        let tree = self.tree(tree_idx).ok_or(UicardError::NotFound)?;
        let file = tree.file_at(offset)?;
        Ok((tree_idx, file))
    }
}
