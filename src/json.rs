//! JSON disk descriptions: ingest a human-authored description into a
//! binary image, and emit a description back from a mounted disk.
//!
//! The description is one `"disk"` array of tree roots, the first an MF and
//! every later one an ADF. Folder contents nest file objects; transparent
//! EFs carry a single payload leaf; record EFs carry one leaf per record.
//! Payload leaves (`hex`, `ascii`, `dato_ber-tlv`) contribute raw bytes
//! only and never appear as standalone files in the image.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::disk::{Disk, File, Tree};
use crate::error::UicardError;
use crate::header::{
    FileHdr, FileSpec, ItemHdr, ItemKind, Lcs, AID_LEN, NAME_LEN, PIX_LEN, RID_LEN,
};

const LCS_ACTIVATED: &str = "operational-activated";
const LCS_DEACTIVATED: &str = "operational-deactivated";
const LCS_TERMINATED: &str = "terminated";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskDoc {
    pub disk: Vec<ItemDoc>,
}

/// One item of the description. The tag string dispatches the per-type
/// parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ItemDoc {
    #[serde(rename = "file_mf")]
    Mf {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sid: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lcs: Option<String>,
        contents: Vec<ItemDoc>,
    },
    #[serde(rename = "file_adf")]
    Adf {
        /// RID plus up to 11 PIX bytes, as 10..=32 hex chars.
        aid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sid: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lcs: Option<String>,
        contents: Vec<ItemDoc>,
    },
    #[serde(rename = "file_df")]
    Df {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sid: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lcs: Option<String>,
        contents: Vec<ItemDoc>,
    },
    #[serde(rename = "file_ef_transparent")]
    EfTransparent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sid: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lcs: Option<String>,
        contents: Box<ItemDoc>,
    },
    #[serde(rename = "file_ef_linear-fixed")]
    EfLinearFixed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sid: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lcs: Option<String>,
        rcrd_size: u8,
        contents: Vec<ItemDoc>,
    },
    #[serde(rename = "file_ef_cyclic")]
    EfCyclic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sid: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lcs: Option<String>,
        rcrd_size: u8,
        contents: Vec<ItemDoc>,
    },
    #[serde(rename = "dato_ber-tlv")]
    BerTlvDo { contents: String },
    #[serde(rename = "hex")]
    Hex { contents: String },
    #[serde(rename = "ascii")]
    Ascii { contents: String },
}

// -----------------------------------------------------------------------------
// Ingest: description -> disk
// -----------------------------------------------------------------------------

pub fn disk_from_str(json: &str) -> Result<Disk, UicardError> {
    let doc: DiskDoc =
        serde_json::from_str(json).map_err(|_| UicardError::BadDescription("malformed JSON"))?;
    disk_from_doc(&doc)
}

pub fn disk_from_doc(doc: &DiskDoc) -> Result<Disk, UicardError> {
    if doc.disk.is_empty() {
        return Err(UicardError::BadDescription("disk array is empty"));
    }
    let mut bufs = Vec::with_capacity(doc.disk.len());
    for (i, item) in doc.disk.iter().enumerate() {
        match (i, item) {
            (0, ItemDoc::Mf { .. }) => {}
            (0, _) => return Err(UicardError::BadDescription("first tree must be a file_mf")),
            (_, ItemDoc::Adf { .. }) => {}
            (_, _) => return Err(UicardError::BadDescription("later trees must be file_adf")),
        }
        bufs.push(emit_file(item, 0)?);
    }
    debug!("ingested {} tree(s) from description", bufs.len());
    Disk::from_tree_bufs(bufs)
}

/// Serializes one file item, `offset_prel` bytes below its parent's header.
fn emit_file(item: &ItemDoc, offset_prel: u32) -> Result<Vec<u8>, UicardError> {
    match item {
        ItemDoc::Mf {
            id,
            sid,
            name,
            lcs,
            contents,
        } => emit_folder(ItemKind::Mf, id, sid, name, lcs, None, contents, offset_prel),
        ItemDoc::Adf {
            aid,
            id,
            sid,
            name,
            lcs,
            contents,
        } => emit_folder(
            ItemKind::Adf,
            id,
            sid,
            name,
            lcs,
            Some(aid.as_str()),
            contents,
            offset_prel,
        ),
        ItemDoc::Df {
            id,
            sid,
            name,
            lcs,
            contents,
        } => emit_folder(ItemKind::Df, id, sid, name, lcs, None, contents, offset_prel),
        ItemDoc::EfTransparent {
            id,
            sid,
            name,
            lcs,
            contents,
        } => {
            let body = leaf_bytes(contents)?;
            assemble(
                ItemKind::EfTransparent,
                id,
                sid,
                name,
                lcs,
                FileSpec::Transparent,
                body,
                offset_prel,
            )
        }
        ItemDoc::EfLinearFixed {
            id,
            sid,
            name,
            lcs,
            rcrd_size,
            contents,
        } => emit_record_ef(
            ItemKind::EfLinearFixed,
            id,
            sid,
            name,
            lcs,
            *rcrd_size,
            contents,
            offset_prel,
        ),
        ItemDoc::EfCyclic {
            id,
            sid,
            name,
            lcs,
            rcrd_size,
            contents,
        } => emit_record_ef(
            ItemKind::EfCyclic,
            id,
            sid,
            name,
            lcs,
            *rcrd_size,
            contents,
            offset_prel,
        ),
        _ => Err(UicardError::BadDescription(
            "payload leaf cannot stand alone as a file",
        )),
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_folder(
    kind: ItemKind,
    id: &Option<String>,
    sid: &Option<String>,
    name: &str,
    lcs: &Option<String>,
    aid: Option<&str>,
    contents: &[ItemDoc],
    offset_prel: u32,
) -> Result<Vec<u8>, UicardError> {
    let hdr_len = kind.file_hdr_len().ok_or(UicardError::BadParameters)?;
    let mut body = Vec::new();
    for child in contents {
        match child {
            ItemDoc::Df { .. }
            | ItemDoc::EfTransparent { .. }
            | ItemDoc::EfLinearFixed { .. }
            | ItemDoc::EfCyclic { .. } => {}
            _ => {
                return Err(UicardError::BadDescription(
                    "folders may only contain DFs and EFs",
                ))
            }
        }
        let prel = (hdr_len + body.len()) as u32;
        let bytes = emit_file(child, prel)?;
        body.extend_from_slice(&bytes);
    }
    let spec = match aid {
        Some(a) => parse_aid(a)?,
        None => FileSpec::Folder,
    };
    assemble(kind, id, sid, name, lcs, spec, body, offset_prel)
}

#[allow(clippy::too_many_arguments)]
fn emit_record_ef(
    kind: ItemKind,
    id: &Option<String>,
    sid: &Option<String>,
    name: &str,
    lcs: &Option<String>,
    rcrd_size: u8,
    contents: &[ItemDoc],
    offset_prel: u32,
) -> Result<Vec<u8>, UicardError> {
    if rcrd_size == 0 {
        return Err(UicardError::BadDescription("rcrd_size must be nonzero"));
    }
    let mut body = Vec::new();
    for record in contents {
        let bytes = leaf_bytes(record)?;
        if bytes.len() > usize::from(rcrd_size) {
            return Err(UicardError::BadDescription("record longer than rcrd_size"));
        }
        body.extend_from_slice(&bytes);
        // Short records are padded out to the fixed size.
        body.resize(body.len() + usize::from(rcrd_size) - bytes.len(), 0xFF);
    }
    assemble(
        kind,
        id,
        sid,
        name,
        lcs,
        FileSpec::Record { rcrd_size },
        body,
        offset_prel,
    )
}

/// Raw payload bytes of a hex / ascii / BER-TLV leaf.
fn leaf_bytes(item: &ItemDoc) -> Result<Vec<u8>, UicardError> {
    match item {
        ItemDoc::Hex { contents } | ItemDoc::BerTlvDo { contents } => {
            hex::decode(contents).map_err(|_| UicardError::BadDescription("invalid hex contents"))
        }
        ItemDoc::Ascii { contents } => Ok(contents.as_bytes().to_vec()),
        _ => Err(UicardError::BadDescription(
            "expected a hex, ascii, or dato_ber-tlv leaf",
        )),
    }
}

#[allow(clippy::too_many_arguments)]
fn assemble(
    kind: ItemKind,
    id: &Option<String>,
    sid: &Option<String>,
    name: &str,
    lcs: &Option<String>,
    spec: FileSpec,
    body: Vec<u8>,
    offset_prel: u32,
) -> Result<Vec<u8>, UicardError> {
    let hdr_len = kind.file_hdr_len().ok_or(UicardError::BadParameters)?;
    let size = u32::try_from(hdr_len + body.len())
        .map_err(|_| UicardError::BadDescription("tree exceeds the image size limit"))?;
    let hdr = FileHdr {
        item: ItemHdr {
            size,
            lcs: parse_lcs(lcs)?,
            kind,
            offset_prel,
        },
        id: parse_id(id)?,
        sid: parse_sid(sid)?,
        name: parse_name(name)?,
        spec,
    };
    let mut out = Vec::with_capacity(size as usize);
    hdr.write(&mut out);
    out.extend_from_slice(&body);
    Ok(out)
}

fn parse_id(id: &Option<String>) -> Result<u16, UicardError> {
    match id {
        None => Ok(0),
        Some(s) if s.len() == 4 => {
            u16::from_str_radix(s, 16).map_err(|_| UicardError::BadDescription("id is not hex"))
        }
        Some(_) => Err(UicardError::BadDescription("id must be 4 hex chars")),
    }
}

fn parse_sid(sid: &Option<String>) -> Result<u8, UicardError> {
    match sid {
        None => Ok(0),
        Some(s) if s.len() == 2 => {
            u8::from_str_radix(s, 16).map_err(|_| UicardError::BadDescription("sid is not hex"))
        }
        Some(_) => Err(UicardError::BadDescription("sid must be 2 hex chars")),
    }
}

fn parse_name(name: &str) -> Result<[u8; NAME_LEN], UicardError> {
    let bytes = name.as_bytes();
    if bytes.len() > NAME_LEN {
        return Err(UicardError::BadDescription("name longer than 16 bytes"));
    }
    let mut out = [0u8; NAME_LEN];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

fn parse_lcs(lcs: &Option<String>) -> Result<Lcs, UicardError> {
    match lcs.as_deref() {
        None | Some(LCS_ACTIVATED) => Ok(Lcs::OperationalActivated),
        Some(LCS_DEACTIVATED) => Ok(Lcs::OperationalDeactivated),
        Some(LCS_TERMINATED) => Ok(Lcs::Terminated),
        Some(_) => Err(UicardError::BadDescription("unknown lcs")),
    }
}

fn parse_aid(aid: &str) -> Result<FileSpec, UicardError> {
    let bytes =
        hex::decode(aid).map_err(|_| UicardError::BadDescription("aid is not hex"))?;
    if bytes.len() < RID_LEN || bytes.len() > AID_LEN {
        return Err(UicardError::BadDescription("aid must be 5..=16 bytes"));
    }
    let mut rid = [0u8; RID_LEN];
    rid.copy_from_slice(&bytes[..RID_LEN]);
    let mut pix = [0u8; PIX_LEN];
    pix[..bytes.len() - RID_LEN].copy_from_slice(&bytes[RID_LEN..]);
    Ok(FileSpec::Adf { rid, pix })
}

// -----------------------------------------------------------------------------
// Emit: disk -> description
// -----------------------------------------------------------------------------

pub fn doc_from_disk(disk: &Disk) -> Result<DiskDoc, UicardError> {
    let mut items = Vec::new();
    for (_, tree) in disk.trees() {
        let root = tree.root()?;
        items.push(doc_item(tree, &root)?);
    }
    Ok(DiskDoc { disk: items })
}

/// Convenience wrapper over `doc_from_disk` + pretty serialization.
pub fn disk_to_string(disk: &Disk) -> Result<String, UicardError> {
    let doc = doc_from_disk(disk)?;
    serde_json::to_string_pretty(&doc).map_err(|_| UicardError::BadParameters)
}

fn doc_item(tree: &Tree, file: &File) -> Result<ItemDoc, UicardError> {
    let id = (file.hdr.id != 0).then(|| format!("{:04X}", file.hdr.id));
    let sid = (file.hdr.sid != 0).then(|| format!("{:02X}", file.hdr.sid));
    let name = name_to_string(&file.hdr.name)?;
    // The default state is left implicit.
    let lcs = match file.hdr.item.lcs {
        Lcs::OperationalActivated => None,
        Lcs::OperationalDeactivated => Some(LCS_DEACTIVATED.to_string()),
        Lcs::Terminated => Some(LCS_TERMINATED.to_string()),
    };

    match file.hdr.spec {
        FileSpec::Folder | FileSpec::Adf { .. } => {
            let mut contents = Vec::new();
            for child in tree.children(file)? {
                contents.push(doc_item(tree, &child)?);
            }
            match file.hdr.spec {
                FileSpec::Adf { rid, pix } => {
                    let mut aid_bytes = Vec::with_capacity(AID_LEN);
                    aid_bytes.extend_from_slice(&rid);
                    aid_bytes.extend_from_slice(&pix);
                    Ok(ItemDoc::Adf {
                        aid: hex::encode_upper(aid_bytes),
                        id,
                        sid,
                        name,
                        lcs,
                        contents,
                    })
                }
                _ if file.kind() == ItemKind::Mf => Ok(ItemDoc::Mf {
                    id,
                    sid,
                    name,
                    lcs,
                    contents,
                }),
                _ => Ok(ItemDoc::Df {
                    id,
                    sid,
                    name,
                    lcs,
                    contents,
                }),
            }
        }
        FileSpec::Transparent => Ok(ItemDoc::EfTransparent {
            id,
            sid,
            name,
            lcs,
            contents: Box::new(ItemDoc::Hex {
                contents: hex::encode_upper(tree.data(file)),
            }),
        }),
        FileSpec::Record { rcrd_size } => {
            let contents = tree
                .data(file)
                .chunks(usize::from(rcrd_size))
                .map(|record| ItemDoc::Hex {
                    contents: hex::encode_upper(record),
                })
                .collect();
            match file.kind() {
                ItemKind::EfCyclic => Ok(ItemDoc::EfCyclic {
                    id,
                    sid,
                    name,
                    lcs,
                    rcrd_size,
                    contents,
                }),
                _ => Ok(ItemDoc::EfLinearFixed {
                    id,
                    sid,
                    name,
                    lcs,
                    rcrd_size,
                    contents,
                }),
            }
        }
    }
}

fn name_to_string(name: &[u8; NAME_LEN]) -> Result<String, UicardError> {
    let end = name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
    core::str::from_utf8(&name[..end])
        .map(ToString::to_string)
        .map_err(|_| UicardError::BadParameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_records_are_padded_with_ff() {
        let disk = disk_from_str(
            r#"{
              "disk": [
                { "type": "file_mf", "id": "3F00", "name": "MF", "contents": [
                  { "type": "file_ef_linear-fixed", "id": "6F3B", "name": "EF",
                    "rcrd_size": 4,
                    "contents": [
                      { "type": "hex", "contents": "AABB" },
                      { "type": "ascii", "contents": "hi" }
                    ] }
                ] }
              ]
            }"#,
        )
        .expect("disk");
        let (tree_idx, file) = disk.lookup_id(0x6F3B).unwrap();
        let tree = disk.tree(tree_idx).unwrap();
        assert_eq!(file.record_count(), 2);
        assert_eq!(tree.record(&file, 0).unwrap(), &[0xAA, 0xBB, 0xFF, 0xFF]);
        assert_eq!(tree.record(&file, 1).unwrap(), b"hi\xFF\xFF");
        assert_eq!(tree.record(&file, 2), Err(UicardError::NotFound));
    }

    #[test]
    fn first_tree_must_be_an_mf() {
        let err = disk_from_str(
            r#"{ "disk": [ { "type": "file_df", "name": "DF", "contents": [] } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, UicardError::BadDescription(_)));
    }

    #[test]
    fn oversized_record_is_rejected() {
        let err = disk_from_str(
            r#"{
              "disk": [
                { "type": "file_mf", "name": "MF", "contents": [
                  { "type": "file_ef_linear-fixed", "name": "EF", "rcrd_size": 1,
                    "contents": [ { "type": "hex", "contents": "AABB" } ] }
                ] }
              ]
            }"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            UicardError::BadDescription("record longer than rcrd_size")
        );
    }

    #[test]
    fn id_strings_must_be_four_hex_chars() {
        let err = disk_from_str(
            r#"{ "disk": [ { "type": "file_mf", "id": "3F0", "name": "MF", "contents": [] } ] }"#,
        )
        .unwrap_err();
        assert_eq!(err, UicardError::BadDescription("id must be 4 hex chars"));
    }

    #[test]
    fn nested_dfs_beyond_the_depth_bound_fail() {
        let err = disk_from_str(
            r#"{
              "disk": [
                { "type": "file_mf", "name": "MF", "contents": [
                  { "type": "file_df", "name": "DF1", "contents": [
                    { "type": "file_df", "name": "DF2", "contents": [] }
                  ] }
                ] }
              ]
            }"#,
        )
        .unwrap_err();
        assert_eq!(err, UicardError::NestingTooDeep);
    }
}
