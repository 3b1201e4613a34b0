// src/apdu/handlers.rs
//
// Interindustry command handlers. Per the dispatcher contract these never
// fail outward: every internal error becomes a status word, and the card
// keeps answering no matter which file-system invariant just broke.

use alloc::vec::Vec;

use log::trace;

use crate::apdu::{
    sw, Command, Reply, ResBuffer, Response, INS_READ_BINARY_ODD, INS_READ_RECORD_ODD,
};
use crate::disk::{Disk, File};
use crate::error::UicardError;
use crate::header::{FileSpec, ItemKind};
use crate::tlv::TlvEncoder;
use crate::va::Va;

// BER-TLV tags of the SELECT response templates and their DOs.
const TAG_FCP: u8 = 0x62;
const TAG_FMD: u8 = 0x64;
const TAG_FCI: u8 = 0x6F;
const TAG_DATA_SIZE: u8 = 0x80;
const TAG_FILE_DESCRIPTOR: u8 = 0x82;
const TAG_FILE_ID: u8 = 0x83;
const TAG_DF_NAME: u8 = 0x84;
const TAG_SFI: u8 = 0x88;
const TAG_LCS: u8 = 0x8A;

/// Data-coding byte reported in the file-descriptor DO.
const CODING_BYTE: u8 = 0x21;

/// SELECT response content requested through P2 bits [3:2].
const RESPONSE_FCI: u8 = 0b00;
const RESPONSE_FCP: u8 = 0b01;
const RESPONSE_FMD: u8 = 0b10;
const RESPONSE_ABSENT: u8 = 0b11;

enum SelectMethod {
    FidOrAid,
    DfName,
    PathFromMf,
    PathFromDf,
}

/// SELECT (INS 0xA4).
pub(crate) fn select(
    disk: &Disk,
    va: &mut Va,
    res: &mut ResBuffer,
    cmd: &Command,
    procedure_count: u32,
) -> Reply {
    // Data-carrying command: request the body first.
    if procedure_count == 0 && cmd.p3 > 0 {
        return Reply::Ack { len: cmd.p3 };
    }
    if procedure_count > 0 && cmd.data.len() != cmd.p3 as usize {
        return Reply::status(sw::wrong_length(0x02));
    }
    if cmd.p2 & 0xF0 != 0 {
        return Reply::status(sw::INCORRECT_P1P2);
    }

    let method = match cmd.p1 {
        0x00 => SelectMethod::FidOrAid,
        // Child/parent navigation.
        0x01..=0x03 => return Reply::status(sw::FUNC_NOT_SUPPORTED),
        0x04 => SelectMethod::DfName,
        0x08 => SelectMethod::PathFromMf,
        0x09 => SelectMethod::PathFromDf,
        // Data-object selection and every RFU value.
        0x10 | 0x13 => return Reply::status(sw::WRONG_P1P2),
        _ => return Reply::status(sw::WRONG_P1P2),
    };

    // Occurrence bits [1:0]: only "first" is honored.
    if cmd.p2 & 0x03 != 0 {
        return Reply::status(sw::FUNC_NOT_SUPPORTED);
    }
    let response_kind = (cmd.p2 >> 2) & 0x03;

    let selected = match method {
        SelectMethod::FidOrAid => match cmd.data.len() {
            2 => {
                let fid = u16::from_be_bytes([cmd.data[0], cmd.data[1]]);
                trace!("select: fid {:04X}", fid);
                va.select_file_id(disk, fid)
            }
            5..=16 => va.select_adf(disk, &cmd.data),
            _ => return Reply::status(sw::wrong_length(0x00)),
        },
        SelectMethod::DfName => va.select_file_dfname(disk, &cmd.data),
        SelectMethod::PathFromMf => va.select_file_path(disk, &cmd.data, true),
        SelectMethod::PathFromDf => va.select_file_path(disk, &cmd.data, false),
    };
    if let Err(e) = selected {
        return Reply::status(match e {
            UicardError::NotFound => sw::FILE_NOT_FOUND,
            UicardError::NotImplemented => sw::FUNC_NOT_SUPPORTED,
            _ => sw::UNKNOWN,
        });
    }

    if response_kind == RESPONSE_ABSENT {
        return Reply::status(sw::OK);
    }
    let file = match va.ef.or(va.df) {
        Some(f) => f,
        None => return Reply::status(sw::UNKNOWN),
    };
    match encode_select_response(res, &file, response_kind) {
        Ok(len) => Reply::status(sw::bytes_available(len as u8)),
        Err(_) => Reply::status(sw::UNKNOWN),
    }
}

/// Two-pass encode of the requested template into the response buffer;
/// returns the encoded length.
fn encode_select_response(
    res: &mut ResBuffer,
    file: &File,
    response_kind: u8,
) -> Result<usize, UicardError> {
    let mut dry = TlvEncoder::dry();
    encode_templates(&mut dry, file, response_kind)?;
    let len = dry.len();
    if len > 0xFF {
        // SW2 must carry the full length.
        return Err(UicardError::BufferTooShort);
    }
    let slot = res.stage(len)?;
    let mut enc = TlvEncoder::new(slot);
    encode_templates(&mut enc, file, response_kind)?;
    Ok(len)
}

fn encode_templates(
    enc: &mut TlvEncoder<'_>,
    file: &File,
    response_kind: u8,
) -> Result<(), UicardError> {
    match response_kind {
        RESPONSE_FCI => {
            // Backward writer: FMD goes in first so FCP precedes it on the
            // wire.
            enc.begin();
            encode_fmd(enc)?;
            encode_fcp(enc, file)?;
            enc.hdr(TAG_FCI)?;
            enc.end()
        }
        RESPONSE_FCP => encode_fcp(enc, file),
        RESPONSE_FMD => encode_fmd(enc),
        _ => Err(UicardError::BadParameters),
    }
}

fn encode_fcp(enc: &mut TlvEncoder<'_>, file: &File) -> Result<(), UicardError> {
    enc.begin();
    // Emitted back to front; the descriptor DO lands last on the wire.
    enc.begin();
    enc.data(&[descriptor_byte(file), CODING_BYTE])?;
    enc.hdr(TAG_FILE_DESCRIPTOR)?;
    enc.end()?;
    if file.hdr.id != 0 {
        enc.begin();
        enc.data(&file.hdr.id.to_be_bytes())?;
        enc.hdr(TAG_FILE_ID)?;
        enc.end()?;
    }
    enc.begin();
    enc.data(&[file.hdr.item.lcs.as_u8()])?;
    enc.hdr(TAG_LCS)?;
    enc.end()?;
    enc.begin();
    enc.data(&file.data_len.to_be_bytes())?;
    enc.hdr(TAG_DATA_SIZE)?;
    enc.end()?;
    if file.is_folder() {
        enc.begin();
        enc.data(&file.hdr.name)?;
        enc.hdr(TAG_DF_NAME)?;
        enc.end()?;
    } else if file.hdr.sid != 0 {
        enc.begin();
        enc.data(&[file.hdr.sid])?;
        enc.hdr(TAG_SFI)?;
        enc.end()?;
    }
    enc.hdr(TAG_FCP)?;
    enc.end()
}

/// FMD template; this card stores no management data.
fn encode_fmd(enc: &mut TlvEncoder<'_>) -> Result<(), UicardError> {
    enc.begin();
    enc.hdr(TAG_FMD)?;
    enc.end()
}

fn descriptor_byte(file: &File) -> u8 {
    match file.kind() {
        ItemKind::EfTransparent => 0x01,
        ItemKind::EfLinearFixed => 0x02,
        ItemKind::EfCyclic => 0x06,
        // Folders: shareable DF.
        _ => 0x38,
    }
}

/// READ BINARY (INS 0xB0; 0xB1 is rejected).
pub(crate) fn read_binary(disk: &Disk, va: &mut Va, cmd: &Command, procedure_count: u32) -> Reply {
    if cmd.ins == INS_READ_BINARY_ODD {
        return Reply::status(sw::INS_NOT_SUPPORTED);
    }
    if procedure_count == 0 {
        return Reply::Ack { len: 0 };
    }
    if !cmd.data.is_empty() {
        return Reply::status(sw::wrong_length(0x02));
    }
    let ne = cmd.ne();

    let sfi_mode = cmd.p1 & 0x80 != 0;
    let (tree_idx, file, offset) = if sfi_mode {
        if cmd.p1 & 0x60 != 0 {
            return Reply::status(sw::INCORRECT_P1P2);
        }
        let sfi = cmd.p1 & 0x1F;
        let tree_idx = match va.tree {
            Some(t) => t,
            None => return Reply::status(sw::NO_CURRENT_EF),
        };
        let tree = match disk.tree(tree_idx) {
            Some(t) => t,
            None => return Reply::status(sw::UNKNOWN),
        };
        let file = match tree.lookup_sid(sfi) {
            Ok(f) => f,
            Err(UicardError::NotFound) => return Reply::status(sw::FILE_NOT_FOUND),
            Err(_) => return Reply::status(sw::UNKNOWN),
        };
        (tree_idx, file, u32::from(cmd.p2))
    } else {
        let file = match va.ef {
            Some(f) => f,
            None => return Reply::status(sw::NO_CURRENT_EF),
        };
        let tree_idx = match va.tree {
            Some(t) => t,
            None => return Reply::status(sw::NO_CURRENT_EF),
        };
        let offset = (u32::from(cmd.p1 & 0x7F) << 8) | u32::from(cmd.p2);
        (tree_idx, file, offset)
    };

    if file.kind() != ItemKind::EfTransparent {
        return Reply::status(sw::INCOMPATIBLE_FILE);
    }
    if offset >= file.data_len {
        return Reply::status(sw::OUT_OF_RANGE);
    }
    let avail = (file.data_len - offset) as usize;
    let n = ne.min(avail);
    let out: Vec<u8> = match disk.tree(tree_idx) {
        Some(tree) => tree.data(&file)[offset as usize..offset as usize + n].to_vec(),
        None => return Reply::status(sw::UNKNOWN),
    };

    if sfi_mode && va.select_file_sid(disk, cmd.p1 & 0x1F).is_err() {
        return Reply::status(sw::UNKNOWN);
    }

    let status = if n < ne { sw::EOF } else { sw::OK };
    Reply::Done(Response::with_data(status, out))
}

/// READ RECORD (INS 0xB2; 0xB3 is rejected).
pub(crate) fn read_record(disk: &Disk, va: &mut Va, cmd: &Command, procedure_count: u32) -> Reply {
    if cmd.ins == INS_READ_RECORD_ODD {
        return Reply::status(sw::INS_NOT_SUPPORTED);
    }
    if procedure_count == 0 {
        return Reply::Ack { len: 0 };
    }
    if !cmd.data.is_empty() {
        return Reply::status(sw::wrong_length(0x02));
    }
    let ne = cmd.ne();

    // P2 bit 2 selects record-number addressing; record-ID addressing is
    // not supported.
    if cmd.p2 & 0x04 == 0 {
        return Reply::status(sw::FUNC_NOT_SUPPORTED);
    }
    match cmd.p2 & 0x03 {
        0b00 => {} // the P1 record only
        0b01 | 0b10 => return Reply::status(sw::FUNC_NOT_SUPPORTED),
        _ => return Reply::status(sw::INCORRECT_P1P2),
    }
    if cmd.p1 == 0x00 || cmd.p1 == 0xFF {
        return Reply::status(sw::INCORRECT_P1P2);
    }
    let target = cmd.p2 >> 3;
    if target == 0x1F {
        // "Many records in many EFs".
        return Reply::status(sw::FUNC_NOT_SUPPORTED);
    }
    let idx = u32::from(cmd.p1) - 1;

    let (file, sfi) = if target == 0 {
        match va.ef {
            Some(f) => (f, None),
            None => return Reply::status(sw::NO_CURRENT_EF),
        }
    } else {
        let tree_idx = match va.tree {
            Some(t) => t,
            None => return Reply::status(sw::NO_CURRENT_EF),
        };
        let tree = match disk.tree(tree_idx) {
            Some(t) => t,
            None => return Reply::status(sw::UNKNOWN),
        };
        match tree.lookup_sid(target) {
            Ok(f) => (f, Some(target)),
            Err(UicardError::NotFound) => return Reply::status(sw::FILE_NOT_FOUND),
            Err(_) => return Reply::status(sw::UNKNOWN),
        }
    };

    let rcrd_size = match file.hdr.spec {
        FileSpec::Record { rcrd_size } => rcrd_size,
        _ => return Reply::status(sw::INCOMPATIBLE_FILE),
    };
    let tree_idx = match va.tree {
        Some(t) => t,
        None => return Reply::status(sw::NO_CURRENT_EF),
    };
    let record: Vec<u8> = {
        let tree = match disk.tree(tree_idx) {
            Some(t) => t,
            None => return Reply::status(sw::UNKNOWN),
        };
        match tree.record(&file, idx) {
            Ok(r) => r.to_vec(),
            Err(UicardError::NotFound) => return Reply::status(sw::FILE_NOT_FOUND),
            Err(_) => return Reply::status(sw::UNKNOWN),
        }
    };

    // Length discovery: the host retries with the exact record size.
    if ne != usize::from(rcrd_size) {
        return Reply::status(sw::wrong_le(rcrd_size));
    }

    if let Some(sfi) = sfi {
        if va.select_file_sid(disk, sfi).is_err() {
            return Reply::status(sw::UNKNOWN);
        }
    }
    if va.select_record_idx(disk, idx).is_err() {
        return Reply::status(sw::UNKNOWN);
    }
    Reply::Done(Response::with_data(sw::OK, record))
}

/// GET RESPONSE (INS 0xC0): drains the response buffer.
pub(crate) fn get_response(res: &mut ResBuffer, cmd: &Command) -> Reply {
    if cmd.p1 != 0 || cmd.p2 != 0 {
        return Reply::status(sw::INCORRECT_P1P2);
    }
    if cmd.p3 == 0 {
        return Reply::status(sw::OK);
    }
    let ne = cmd.p3 as usize;
    let available = res.available();

    if available < ne {
        let out = res.take(available).to_vec();
        return Reply::Done(Response::with_data(sw::EOF, out));
    }
    let out = res.take(ne).to_vec();
    let remaining = res.available();
    let status = if remaining == 0 {
        sw::OK
    } else {
        sw::bytes_available(remaining as u8)
    };
    Reply::Done(Response::with_data(status, out))
}
