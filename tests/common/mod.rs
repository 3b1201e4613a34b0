//! Shared test fixtures: reference disks and a minimal TLV scanner.
#![allow(dead_code)]

use uicard::{json, Card, Disk};

/// The minimal reference disk: MF 3F00 > DF 7FFF > transparent EF 6F07
/// (SFI 0x07, data 01 02 03 04 05).
pub const REFERENCE_DISK: &str = r#"{
  "disk": [
    {
      "type": "file_mf", "id": "3F00", "name": "MF",
      "contents": [
        {
          "type": "file_df", "id": "7FFF", "name": "DF",
          "contents": [
            {
              "type": "file_ef_transparent", "id": "6F07", "sid": "07",
              "name": "EFimsi",
              "contents": { "type": "hex", "contents": "0102030405" }
            }
          ]
        }
      ]
    }
  ]
}"#;

/// A richer disk: the reference layout plus a linear-fixed EF and an ADF
/// tree with its own transparent EF.
pub const EXTENDED_DISK: &str = r#"{
  "disk": [
    {
      "type": "file_mf", "id": "3F00", "name": "MF",
      "contents": [
        {
          "type": "file_df", "id": "7FFF", "name": "DF",
          "contents": [
            {
              "type": "file_ef_transparent", "id": "6F07", "sid": "07",
              "name": "EFimsi",
              "contents": { "type": "hex", "contents": "0102030405" }
            },
            {
              "type": "file_ef_linear-fixed", "id": "6F3B", "sid": "04",
              "name": "EFfplmn", "rcrd_size": 3,
              "contents": [
                { "type": "hex", "contents": "AABBCC" },
                { "type": "hex", "contents": "DD" }
              ]
            }
          ]
        }
      ]
    },
    {
      "type": "file_adf", "id": "7F01", "name": "ADFusim",
      "aid": "A0000000871002FF33FF018900000100",
      "contents": [
        {
          "type": "file_ef_transparent", "id": "6F05", "sid": "02",
          "name": "EFli",
          "contents": { "type": "ascii", "contents": "en" }
        }
      ]
    }
  ]
}"#;

pub fn reference_disk() -> Disk {
    json::disk_from_str(REFERENCE_DISK).expect("reference disk must ingest")
}

pub fn extended_disk() -> Disk {
    json::disk_from_str(EXTENDED_DISK).expect("extended disk must ingest")
}

pub fn reference_card() -> Card {
    Card::new(reference_disk()).expect("card mounts the reference disk")
}

pub fn extended_card() -> Card {
    Card::new(extended_disk()).expect("card mounts the extended disk")
}

/// Splits an R-APDU into (data, sw).
pub fn split_rapdu(rapdu: &[u8]) -> (&[u8], u16) {
    assert!(rapdu.len() >= 2, "R-APDU must carry SW1 SW2");
    let (data, sw) = rapdu.split_at(rapdu.len() - 2);
    (data, u16::from(sw[0]) << 8 | u16::from(sw[1]))
}

/// Finds a DO inside a single-byte-tag template and returns its value.
pub fn find_do<'a>(template: &'a [u8], tag: u8) -> Option<&'a [u8]> {
    let (_, content, _) = read_tlv(template)?;
    let mut rest = content;
    while !rest.is_empty() {
        let (t, value, used) = read_tlv(rest)?;
        if t == tag {
            return Some(value);
        }
        rest = &rest[used..];
    }
    None
}

/// Reads one TLV at the head of `bytes`: (tag, value, bytes consumed).
/// Understands the definite short and 0x81/0x82 length forms our encoder
/// emits.
pub fn read_tlv(bytes: &[u8]) -> Option<(u8, &[u8], usize)> {
    let tag = *bytes.first()?;
    let first_len = *bytes.get(1)?;
    let (len, hdr) = if first_len < 0x80 {
        (usize::from(first_len), 2)
    } else if first_len == 0x81 {
        (usize::from(*bytes.get(2)?), 3)
    } else if first_len == 0x82 {
        (
            usize::from(*bytes.get(2)?) << 8 | usize::from(*bytes.get(3)?),
            4,
        )
    } else {
        return None;
    };
    bytes
        .get(hdr..hdr + len)
        .map(|value| (tag, value, hdr + len))
}
