//! The card session: one disk, one selection state, one response buffer.
//!
//! `handle` is the per-entry dispatcher the transport layer drives through
//! the procedure-byte protocol; `transact` is the host-side convenience
//! that runs a whole short C-APDU to completion.

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::{debug, trace};

use crate::apdu::{
    handlers, sw, ClaKind, Command, Reply, ResBuffer, INS_GET_RESPONSE, INS_READ_BINARY,
    INS_READ_BINARY_ODD, INS_READ_RECORD, INS_READ_RECORD_ODD, INS_SELECT,
};
use crate::disk::Disk;
use crate::error::UicardError;
use crate::va::Va;

/// Hook point for proprietary-class APDUs. Without an installed handler
/// the class is answered as unsupported.
pub trait ProprietaryHandler {
    fn handle(&mut self, cmd: &Command, procedure_count: u32) -> Reply;
}

pub struct Card {
    disk: Disk,
    va: Va,
    res: ResBuffer,
    proprietary: Option<Box<dyn ProprietaryHandler>>,
}

impl Card {
    /// Mounts a disk and performs the initial reset (MF selection).
    pub fn new(disk: Disk) -> Result<Self, UicardError> {
        let mut card = Self {
            disk,
            va: Va::new(),
            res: ResBuffer::new(),
            proprietary: None,
        };
        card.reset()?;
        Ok(card)
    }

    /// Warm reset: selection state back to the MF, response buffer dropped.
    pub fn reset(&mut self) -> Result<(), UicardError> {
        self.res.clear();
        self.va.reset(&self.disk)
    }

    pub fn disk(&self) -> &Disk {
        &self.disk
    }

    pub fn va(&self) -> &Va {
        &self.va
    }

    /// Unmounts, handing the disk back.
    pub fn unload(self) -> Disk {
        self.disk
    }

    pub fn set_proprietary_handler(&mut self, handler: Box<dyn ProprietaryHandler>) {
        self.proprietary = Some(handler);
    }

    /// One handler entry. `procedure_count` says how many times this same
    /// command has re-entered after an ACK.
    pub fn handle(&mut self, cmd: &Command, procedure_count: u32) -> Reply {
        trace!(
            "apdu: cla {:02X} ins {:02X} p1 {:02X} p2 {:02X} p3 {:02X} (entry {})",
            cmd.cla,
            cmd.ins,
            cmd.p1,
            cmd.p2,
            cmd.p3,
            procedure_count
        );
        match ClaKind::classify(cmd.cla) {
            ClaKind::Rfu | ClaKind::Invalid => Reply::status(sw::CLA_NOT_SUPPORTED),
            ClaKind::Proprietary => match self.proprietary.as_mut() {
                Some(hook) => hook.handle(cmd, procedure_count),
                None => Reply::status(sw::CLA_NOT_SUPPORTED),
            },
            ClaKind::Interindustry => match cmd.ins {
                INS_SELECT => {
                    handlers::select(&self.disk, &mut self.va, &mut self.res, cmd, procedure_count)
                }
                INS_READ_BINARY | INS_READ_BINARY_ODD => {
                    handlers::read_binary(&self.disk, &mut self.va, cmd, procedure_count)
                }
                INS_READ_RECORD | INS_READ_RECORD_ODD => {
                    handlers::read_record(&self.disk, &mut self.va, cmd, procedure_count)
                }
                INS_GET_RESPONSE => handlers::get_response(&mut self.res, cmd),
                other => {
                    debug!("unsupported ins {:02X}", other);
                    Reply::status(sw::INS_NOT_SUPPORTED)
                }
            },
        }
    }

    /// Runs a complete short C-APDU: header + P3 + body bytes as the host
    /// would put them on the wire. Drives the ACK/re-entry loop and returns
    /// the full R-APDU (`data || SW1 SW2`). A trailing Le byte after the
    /// command data is tolerated and ignored.
    pub fn transact(&mut self, capdu: &[u8]) -> Result<Vec<u8>, UicardError> {
        if capdu.len() < 4 {
            return Err(UicardError::BadParameters);
        }
        let mut cmd = Command::new(
            capdu[0],
            capdu[1],
            capdu[2],
            capdu[3],
            if capdu.len() >= 5 { capdu[4] } else { 0 },
        );
        let body = if capdu.len() > 5 { &capdu[5..] } else { &[] };

        let mut procedure_count = 0u32;
        loop {
            match self.handle(&cmd, procedure_count) {
                Reply::Ack { len } => {
                    if procedure_count > 0 {
                        // A handler must not keep asking once the body is in.
                        return Err(UicardError::ApduUnhandled);
                    }
                    let len = usize::from(len);
                    if body.len() < len {
                        return Err(UicardError::BadParameters);
                    }
                    cmd.data = body[..len].to_vec();
                    procedure_count += 1;
                }
                Reply::Done(res) => {
                    let sw1 = res.sw1();
                    let sw2 = res.sw2();
                    let mut out = res.data;
                    out.push(sw1);
                    out.push(sw2);
                    return Ok(out);
                }
            }
        }
    }
}
