//! Virtual-application selection state (ISO 7816-4 §7.2.2).
//!
//! Tracks current tree / ADF / DF / EF / file / record and advances on
//! SELECT-family operations. Every operation either commits a whole new
//! selection tuple or leaves the state untouched.

use log::debug;

use crate::disk::{Disk, File};
use crate::error::UicardError;
use crate::header::{FileSpec, ItemKind, AID_LEN, RID_LEN};

/// FID of the master file.
pub const FID_MF: u16 = 0x3F00;

#[derive(Debug, Clone, Copy, Default)]
pub struct Va {
    /// Forest index of the current tree.
    pub tree: Option<u8>,
    /// Root of the current application (the MF counts as one).
    pub adf: Option<File>,
    pub df: Option<File>,
    pub ef: Option<File>,
    /// Whatever was selected last, folder or EF.
    pub file: Option<File>,
    /// Current record index within `ef`.
    pub record: Option<u32>,
}

impl Va {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Card reset: clear everything, then select the MF.
    pub fn reset(&mut self, disk: &Disk) -> Result<(), UicardError> {
        self.clear();
        self.select_file_id(disk, FID_MF)
    }

    /// Selects the first ADF whose RID matches and whose PIX starts with
    /// the given partial PIX. `aid` is RID plus 0..=11 PIX bytes.
    pub fn select_adf(&mut self, disk: &Disk, aid: &[u8]) -> Result<(), UicardError> {
        if aid.len() < RID_LEN || aid.len() > AID_LEN {
            return Err(UicardError::BadParameters);
        }
        let (rid_sel, pix_sel) = aid.split_at(RID_LEN);
        for (idx, tree) in disk.trees() {
            let root = tree.root()?;
            if let FileSpec::Adf { rid, pix } = root.hdr.spec {
                if rid == rid_sel && pix[..pix_sel.len()] == *pix_sel {
                    debug!("select_adf: matched tree {}", idx);
                    return self.commit(disk, idx, root);
                }
            }
        }
        Err(UicardError::NotFound)
    }

    /// Disk-wide selection by file identifier.
    pub fn select_file_id(&mut self, disk: &Disk, fid: u16) -> Result<(), UicardError> {
        let (tree_idx, file) = disk.lookup_id(fid)?;
        self.commit(disk, tree_idx, file)
    }

    /// Selection by short file identifier within the current tree.
    pub fn select_file_sid(&mut self, disk: &Disk, sid: u8) -> Result<(), UicardError> {
        let tree_idx = self.tree.ok_or(UicardError::NotFound)?;
        let tree = disk.tree(tree_idx).ok_or(UicardError::NotFound)?;
        let file = tree.lookup_sid(sid)?;
        self.commit(disk, tree_idx, file)
    }

    /// Makes a record of the current EF current. Requires a record-oriented
    /// EF with at least one record; the index must be in range.
    pub fn select_record_idx(&mut self, _disk: &Disk, idx: u32) -> Result<(), UicardError> {
        let ef = self.ef.as_ref().ok_or(UicardError::BadParameters)?;
        if !ef.kind().is_record_ef() || ef.record_count() == 0 {
            return Err(UicardError::BadParameters);
        }
        if idx >= ef.record_count() {
            return Err(UicardError::NotFound);
        }
        self.record = Some(idx);
        Ok(())
    }

    /// Selection by DF name. Declared by ISO 7816-4, deliberately not
    /// implemented here.
    pub fn select_file_dfname(&mut self, _disk: &Disk, _name: &[u8]) -> Result<(), UicardError> {
        Err(UicardError::NotImplemented)
    }

    /// Selection by path (from the MF or from the current DF). Declared,
    /// deliberately not implemented.
    pub fn select_file_path(
        &mut self,
        _disk: &Disk,
        _path: &[u8],
        _from_mf: bool,
    ) -> Result<(), UicardError> {
        Err(UicardError::NotImplemented)
    }

    /// Data-object selection. Declared, deliberately not implemented.
    pub fn select_data_offset(&mut self, _disk: &Disk, _offset: u32) -> Result<(), UicardError> {
        Err(UicardError::NotImplemented)
    }

    /// Applies the file-type selection rules to a resolved file. All reads
    /// happen before any field is mutated.
    ///
    /// EF selection rebinds `df` to the EF's parent on every channel,
    /// including SFI. ISO 7816-4 keeps the current DF unchanged for
    /// SFI-addressed reads; this emulator intentionally does not.
    fn commit(&mut self, disk: &Disk, tree_idx: u8, file: File) -> Result<(), UicardError> {
        let kind = file.kind();
        let next = match kind {
            ItemKind::Mf | ItemKind::Adf => Va {
                tree: Some(tree_idx),
                adf: Some(file),
                df: Some(file),
                ef: None,
                file: Some(file),
                record: None,
            },
            ItemKind::Df => {
                let root = disk
                    .tree(tree_idx)
                    .ok_or(UicardError::NotFound)?
                    .root()?;
                Va {
                    tree: Some(tree_idx),
                    adf: Some(root),
                    df: Some(file),
                    ef: None,
                    file: Some(file),
                    record: None,
                }
            }
            k if k.is_ef() => {
                let tree = disk.tree(tree_idx).ok_or(UicardError::NotFound)?;
                let root = tree.root()?;
                let parent_off = file.parent_offset().ok_or(UicardError::BrokenContainment)?;
                let parent = tree.file_at(parent_off)?;
                Va {
                    tree: Some(tree_idx),
                    adf: Some(root),
                    df: Some(parent),
                    ef: Some(file),
                    file: Some(file),
                    record: None,
                }
            }
            other => return Err(UicardError::InvalidItemKind(other.as_u8())),
        };
        *self = next;
        Ok(())
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::json;

    fn test_disk() -> Disk {
        json::disk_from_str(
            r#"{
              "disk": [
                {
                  "type": "file_mf", "id": "3F00", "name": "MF",
                  "contents": [
                    {
                      "type": "file_df", "id": "7FFF", "name": "DF",
                      "contents": [
                        {
                          "type": "file_ef_transparent", "id": "6F07",
                          "sid": "07", "name": "EFimsi",
                          "contents": { "type": "hex", "contents": "0102030405" }
                        }
                      ]
                    }
                  ]
                },
                {
                  "type": "file_adf", "id": "7F01", "name": "ADFusim",
                  "aid": "A000000087100200",
                  "contents": [
                    {
                      "type": "file_ef_linear-fixed", "id": "6F3B", "sid": "04",
                      "name": "EFrec", "rcrd_size": 3,
                      "contents": [ { "type": "hex", "contents": "AABB" } ]
                    }
                  ]
                }
              ]
            }"#,
        )
        .expect("test disk")
    }

    #[test]
    fn reset_selects_the_mf() {
        let disk = test_disk();
        let mut va = Va::new();
        va.reset(&disk).unwrap();
        assert_eq!(va.tree, Some(0));
        let df = va.df.expect("df after reset");
        assert_eq!(df.hdr.id, FID_MF);
        assert_eq!(df.kind(), ItemKind::Mf);
        assert!(va.ef.is_none());
    }

    #[test]
    fn selecting_an_ef_rebinds_df_to_its_parent() {
        let disk = test_disk();
        let mut va = Va::new();
        va.reset(&disk).unwrap();
        va.select_file_id(&disk, 0x6F07).unwrap();
        assert_eq!(va.ef.unwrap().hdr.id, 0x6F07);
        assert_eq!(va.df.unwrap().hdr.id, 0x7FFF, "df follows the EF's parent");
        assert_eq!(va.adf.unwrap().hdr.id, FID_MF);
    }

    #[test]
    fn sid_selection_is_scoped_to_the_current_tree() {
        let disk = test_disk();
        let mut va = Va::new();
        va.reset(&disk).unwrap();
        // SFI 0x04 lives in the ADF tree, not under the MF.
        assert_eq!(
            va.select_file_sid(&disk, 0x04),
            Err(UicardError::NotFound)
        );
        va.select_adf(&disk, &[0xA0, 0x00, 0x00, 0x00, 0x87])
            .unwrap();
        assert_eq!(va.tree, Some(1));
        va.select_file_sid(&disk, 0x04).unwrap();
        assert_eq!(va.ef.unwrap().hdr.id, 0x6F3B);
    }

    #[test]
    fn adf_selection_matches_partial_pix() {
        let disk = test_disk();
        let mut va = Va::new();
        va.reset(&disk).unwrap();
        let full = [
            0xA0, 0x00, 0x00, 0x00, 0x87, 0x10, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ];
        va.select_adf(&disk, &full[..7]).unwrap();
        assert_eq!(va.adf.unwrap().hdr.id, 0x7F01);
        assert_eq!(
            va.select_adf(&disk, &[0xA0, 0x00, 0x00, 0x00, 0x88]),
            Err(UicardError::NotFound)
        );
    }

    #[test]
    fn record_selection_validates_the_index() {
        let disk = test_disk();
        let mut va = Va::new();
        va.reset(&disk).unwrap();
        assert_eq!(
            va.select_record_idx(&disk, 0),
            Err(UicardError::BadParameters),
            "no current EF"
        );
        va.select_adf(&disk, &[0xA0, 0x00, 0x00, 0x00, 0x87])
            .unwrap();
        va.select_file_sid(&disk, 0x04).unwrap();
        va.select_record_idx(&disk, 0).unwrap();
        assert_eq!(va.record, Some(0));
        assert_eq!(va.select_record_idx(&disk, 1), Err(UicardError::NotFound));
    }

    #[test]
    fn stubs_answer_not_implemented() {
        let disk = test_disk();
        let mut va = Va::new();
        assert_eq!(
            va.select_file_dfname(&disk, b"name"),
            Err(UicardError::NotImplemented)
        );
        assert_eq!(
            va.select_file_path(&disk, &[0x7F, 0xFF], true),
            Err(UicardError::NotImplemented)
        );
        assert_eq!(
            va.select_data_offset(&disk, 0),
            Err(UicardError::NotImplemented)
        );
    }
}
