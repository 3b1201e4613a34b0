// src/header.rs
use crate::error::UicardError;
use byteorder::{ByteOrder, LittleEndian};

/// The 8-byte magic prefix of a disk image ("UICCDSK" + NUL).
pub const MAGIC: [u8; 8] = [0x55, 0x49, 0x43, 0x43, 0x44, 0x53, 0x4b, 0x00];

/// Packed item header: size(4 LE) + lcs(1) + type(1) + offset_prel(4 LE).
pub const ITEM_HDR_LEN: usize = 10;
/// Item header + id(2 LE) + sid(1) + name(16 + NUL).
pub const FILE_HDR_LEN: usize = ITEM_HDR_LEN + 20;
/// File header + rid(5) + pix(11), present on ADF roots only.
pub const ADF_HDR_LEN: usize = FILE_HDR_LEN + 16;
/// File header + rcrd_size(1), present on linear-fixed and cyclic EFs.
pub const RECORD_EF_HDR_LEN: usize = FILE_HDR_LEN + 1;

pub const NAME_LEN: usize = 16;
pub const RID_LEN: usize = 5;
pub const PIX_LEN: usize = 11;
pub const AID_LEN: usize = RID_LEN + PIX_LEN;

/// Life-cycle status, ISO 7816-4 coding. Wire format is u8; this byte is
/// also what FCP tag 0x8A reports.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lcs {
    OperationalDeactivated = 0x04,
    OperationalActivated = 0x05,
    Terminated = 0x0C,
}

impl Lcs {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl core::convert::TryFrom<u8> for Lcs {
    type Error = UicardError;
    fn try_from(byte: u8) -> Result<Self, UicardError> {
        match byte {
            0x04 => Ok(Lcs::OperationalDeactivated),
            0x05 => Ok(Lcs::OperationalActivated),
            0x0C => Ok(Lcs::Terminated),
            other => Err(UicardError::InvalidLcs(other)),
        }
    }
}

/// Item type tag. File kinds (MF..cyclic EF) appear in the image; the leaf
/// kinds (BER-TLV DO, hex, ascii) only name payload sources in JSON disk
/// descriptions.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Invalid = 0x00,
    Mf = 0x01,
    Adf = 0x02,
    Df = 0x03,
    EfTransparent = 0x04,
    EfLinearFixed = 0x05,
    EfCyclic = 0x06,
    BerTlvDo = 0x07,
    Hex = 0x08,
    Ascii = 0x09,
}

impl ItemKind {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn is_folder(self) -> bool {
        matches!(self, ItemKind::Mf | ItemKind::Adf | ItemKind::Df)
    }

    pub const fn is_ef(self) -> bool {
        matches!(
            self,
            ItemKind::EfTransparent | ItemKind::EfLinearFixed | ItemKind::EfCyclic
        )
    }

    pub const fn is_record_ef(self) -> bool {
        matches!(self, ItemKind::EfLinearFixed | ItemKind::EfCyclic)
    }

    /// Header length of this kind when it appears as a file in the image,
    /// or None for the non-file kinds.
    pub const fn file_hdr_len(self) -> Option<usize> {
        match self {
            ItemKind::Mf | ItemKind::Df | ItemKind::EfTransparent => Some(FILE_HDR_LEN),
            ItemKind::Adf => Some(ADF_HDR_LEN),
            ItemKind::EfLinearFixed | ItemKind::EfCyclic => Some(RECORD_EF_HDR_LEN),
            _ => None,
        }
    }
}

impl core::convert::TryFrom<u8> for ItemKind {
    type Error = UicardError;
    fn try_from(byte: u8) -> Result<Self, UicardError> {
        match byte {
            0x00 => Ok(ItemKind::Invalid),
            0x01 => Ok(ItemKind::Mf),
            0x02 => Ok(ItemKind::Adf),
            0x03 => Ok(ItemKind::Df),
            0x04 => Ok(ItemKind::EfTransparent),
            0x05 => Ok(ItemKind::EfLinearFixed),
            0x06 => Ok(ItemKind::EfCyclic),
            0x07 => Ok(ItemKind::BerTlvDo),
            0x08 => Ok(ItemKind::Hex),
            0x09 => Ok(ItemKind::Ascii),
            other => Err(UicardError::InvalidItemKind(other)),
        }
    }
}

/// The packed header every item starts with.
/// This is an internal Rust representation. It is NOT `repr(C)` because the
/// wire format (packed) does not match native alignment rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHdr {
    /// Total item length in bytes, header inclusive.
    pub size: u32,
    pub lcs: Lcs,
    pub kind: ItemKind,
    /// Offset from the parent item's header to this header; 0 on tree roots.
    pub offset_prel: u32,
}

impl ItemHdr {
    /// Zero-allocation parse of the first ITEM_HDR_LEN bytes of a slice.
    /// Fields are read manually so layout never depends on the architecture.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UicardError> {
        if bytes.len() < ITEM_HDR_LEN {
            return Err(UicardError::IncompleteImage);
        }
        let size = LittleEndian::read_u32(&bytes[0..4]);
        let lcs = Lcs::try_from(bytes[4])?;
        let kind = ItemKind::try_from(bytes[5])?;
        let offset_prel = LittleEndian::read_u32(&bytes[6..10]);
        Ok(Self {
            size,
            lcs,
            kind,
            offset_prel,
        })
    }

    /// Serializes the header to an ITEM_HDR_LEN-byte array.
    pub fn to_bytes(&self) -> [u8; ITEM_HDR_LEN] {
        let mut buf = [0u8; ITEM_HDR_LEN];
        LittleEndian::write_u32(&mut buf[0..4], self.size);
        buf[4] = self.lcs.as_u8();
        buf[5] = self.kind.as_u8();
        LittleEndian::write_u32(&mut buf[6..10], self.offset_prel);
        buf
    }
}

/// Per-kind file header tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSpec {
    /// MF or DF: no extra fields.
    Folder,
    /// ADF root: application identifier split as RID + PIX.
    Adf { rid: [u8; RID_LEN], pix: [u8; PIX_LEN] },
    /// Transparent EF: opaque byte payload.
    Transparent,
    /// Linear-fixed or cyclic EF: payload is records of this fixed size.
    Record { rcrd_size: u8 },
}

/// Decoded header of a file item (MF, ADF, DF, or any EF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHdr {
    pub item: ItemHdr,
    /// 16-bit file identifier; 0 means absent.
    pub id: u16,
    /// Short file identifier; 0 means absent.
    pub sid: u8,
    /// Null-padded name. The image stores one extra NUL terminator byte.
    pub name: [u8; NAME_LEN],
    pub spec: FileSpec,
}

impl FileHdr {
    /// Parses the file header at the start of `bytes`. Rejects item kinds
    /// that cannot appear as files in the image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UicardError> {
        let item = ItemHdr::from_bytes(bytes)?;
        let hdr_len = item
            .kind
            .file_hdr_len()
            .ok_or(UicardError::InvalidItemKind(item.kind.as_u8()))?;
        if bytes.len() < hdr_len || (item.size as usize) < hdr_len {
            return Err(UicardError::IncompleteImage);
        }

        let id = LittleEndian::read_u16(&bytes[10..12]);
        let sid = bytes[12];
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&bytes[13..13 + NAME_LEN]);
        // bytes[29] is the NUL terminator; nothing to keep from it.

        let spec = match item.kind {
            ItemKind::Mf | ItemKind::Df => FileSpec::Folder,
            ItemKind::Adf => {
                let mut rid = [0u8; RID_LEN];
                let mut pix = [0u8; PIX_LEN];
                rid.copy_from_slice(&bytes[FILE_HDR_LEN..FILE_HDR_LEN + RID_LEN]);
                pix.copy_from_slice(&bytes[FILE_HDR_LEN + RID_LEN..ADF_HDR_LEN]);
                FileSpec::Adf { rid, pix }
            }
            ItemKind::EfTransparent => FileSpec::Transparent,
            ItemKind::EfLinearFixed | ItemKind::EfCyclic => {
                let rcrd_size = bytes[FILE_HDR_LEN];
                if rcrd_size == 0 {
                    return Err(UicardError::BadParameters);
                }
                FileSpec::Record { rcrd_size }
            }
            _ => return Err(UicardError::InvalidItemKind(item.kind.as_u8())),
        };

        Ok(Self {
            item,
            id,
            sid,
            name,
            spec,
        })
    }

    /// Header length of this file, determined by its kind.
    pub fn hdr_len(&self) -> usize {
        match self.spec {
            FileSpec::Folder | FileSpec::Transparent => FILE_HDR_LEN,
            FileSpec::Adf { .. } => ADF_HDR_LEN,
            FileSpec::Record { .. } => RECORD_EF_HDR_LEN,
        }
    }

    /// Appends the wire form of this header to `out`. The counterpart of
    /// `from_bytes`, used when assembling an image.
    pub fn write(&self, out: &mut alloc::vec::Vec<u8>) {
        out.extend_from_slice(&self.item.to_bytes());
        let mut id_buf = [0u8; 2];
        LittleEndian::write_u16(&mut id_buf, self.id);
        out.extend_from_slice(&id_buf);
        out.push(self.sid);
        out.extend_from_slice(&self.name);
        out.push(0x00); // NUL terminator
        match self.spec {
            FileSpec::Folder | FileSpec::Transparent => {}
            FileSpec::Adf { rid, pix } => {
                out.extend_from_slice(&rid);
                out.extend_from_slice(&pix);
            }
            FileSpec::Record { rcrd_size } => out.push(rcrd_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn sample_hdr(kind: ItemKind, spec: FileSpec) -> FileHdr {
        let mut name = [0u8; NAME_LEN];
        name[..2].copy_from_slice(b"EF");
        FileHdr {
            item: ItemHdr {
                size: 64,
                lcs: Lcs::OperationalActivated,
                kind,
                offset_prel: 30,
            },
            id: 0x6F07,
            sid: 0x07,
            name,
            spec,
        }
    }

    #[test]
    fn item_hdr_round_trips_little_endian() {
        let hdr = ItemHdr {
            size: 0x0102_0304,
            lcs: Lcs::Terminated,
            kind: ItemKind::Df,
            offset_prel: 0x0A0B_0C0D,
        };
        let bytes = hdr.to_bytes();
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01], "size is LE");
        assert_eq!(bytes[4], 0x0C);
        assert_eq!(bytes[5], 0x03);
        assert_eq!(&bytes[6..10], &[0x0D, 0x0C, 0x0B, 0x0A], "offset_prel is LE");
        assert_eq!(ItemHdr::from_bytes(&bytes).unwrap(), hdr);
    }

    #[test]
    fn file_hdr_round_trips_each_kind() {
        let cases = [
            sample_hdr(ItemKind::EfTransparent, FileSpec::Transparent),
            sample_hdr(ItemKind::Df, FileSpec::Folder),
            sample_hdr(
                ItemKind::EfLinearFixed,
                FileSpec::Record { rcrd_size: 4 },
            ),
            sample_hdr(
                ItemKind::Adf,
                FileSpec::Adf {
                    rid: [0xA0, 0x00, 0x00, 0x00, 0x87],
                    pix: [0x10, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0],
                },
            ),
        ];
        for hdr in cases {
            let mut wire = Vec::new();
            hdr.write(&mut wire);
            assert_eq!(wire.len(), hdr.hdr_len());
            let parsed = FileHdr::from_bytes(&wire).expect("parse back");
            assert_eq!(parsed, hdr);
        }
    }

    #[test]
    fn file_hdr_rejects_non_file_kinds() {
        let item = ItemHdr {
            size: 40,
            lcs: Lcs::OperationalActivated,
            kind: ItemKind::Hex,
            offset_prel: 0,
        };
        let mut wire = Vec::new();
        wire.extend_from_slice(&item.to_bytes());
        wire.resize(40, 0);
        assert_eq!(
            FileHdr::from_bytes(&wire),
            Err(UicardError::InvalidItemKind(ItemKind::Hex.as_u8()))
        );
    }

    #[test]
    fn zero_record_size_is_rejected() {
        let hdr = sample_hdr(ItemKind::EfLinearFixed, FileSpec::Record { rcrd_size: 4 });
        let mut wire = Vec::new();
        hdr.write(&mut wire);
        let last = wire.len() - 1;
        wire[last] = 0;
        assert_eq!(FileHdr::from_bytes(&wire), Err(UicardError::BadParameters));
    }
}
