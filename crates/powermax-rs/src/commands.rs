// crates/powermax-rs/src/commands.rs
//! Static catalog of outbound command templates.
//!
//! Templates are immutable, program-lifetime data. PIN slots are zeroed
//! here and patched by the send queue at transmit time (offset 4, selected
//! by the queued options string).

use crate::hal::PmaxError;
use crate::types::{MAX_SEND_BUFFER_SIZE, opcode};
use heapless::Vec;

/// Every command the engine can transmit to the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmaxCommand {
    Ack,
    Ping,
    GetEventLog,
    Disarm,
    ArmHome,
    ArmAway,
    ArmAwayInstant,
    ReqStatus,
    EnrollReply,
    Init,
    Restore,
    DownloadStart,
    DownloadGet,
    /// Stop download mode.
    DownloadExit,
    DownloadPanelFw,
    DownloadSerial,
    DownloadZoneStr,
}

/// One row of the command catalog.
#[derive(Debug, Clone, Copy)]
pub struct CommandTemplate {
    pub bytes: &'static [u8],
    pub description: &'static str,
    /// Opcode of the reply that resolves this command, or 0 when a plain
    /// ACK is all that is expected.
    pub expected_reply: u8,
    /// Send-time options. `"pin"` patches the PowerLink PIN at offset 4;
    /// `"pin,master"` patches the downloaded installer PIN instead.
    pub options: &'static str,
}

const ACK: &[u8] = &[0x02];
const PING: &[u8] = &[0xAB, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const GET_EVENT_LOG: &[u8] =
    &[0xA0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const DISARM: &[u8] = &[0xA1, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const ARM_HOME: &[u8] = &[0xA1, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const ARM_AWAY: &[u8] = &[0xA1, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const ARM_AWAY_INSTANT: &[u8] =
    &[0xA1, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const REQ_STATUS: &[u8] = &[0xA2, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const ENROLL_REPLY: &[u8] =
    &[0xAB, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const INIT: &[u8] = &[0xAB, 0x0A, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const RESTORE: &[u8] = &[0xAB, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const DL_START: &[u8] = &[0x24, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
// DL_GET layout: opcode, offset, page, length lo, length hi, block marker.
const DL_GET: &[u8] = &[0x3E, 0x00, 0x00, 0x00, 0x00, 0xB0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const DL_EXIT: &[u8] = &[0x0F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
// Presets of DL_GET for the regions the settings parser depends on.
const DL_PANEL_FW: &[u8] =
    &[0x3E, 0xC0, 0x00, 0x20, 0x00, 0xB0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const DL_SERIAL: &[u8] = &[0x3E, 0xE0, 0x00, 0x10, 0x00, 0xB0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];
const DL_ZONE_STR: &[u8] =
    &[0x3E, 0x00, 0x02, 0xE0, 0x01, 0xB0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x43];

impl PmaxCommand {
    /// The static template record for this command.
    pub const fn template(self) -> CommandTemplate {
        match self {
            Self::Ack => CommandTemplate {
                bytes: ACK,
                description: "Ack",
                expected_reply: 0,
                options: "",
            },
            Self::Ping => CommandTemplate {
                bytes: PING,
                description: "Keep alive",
                expected_reply: 0,
                options: "",
            },
            Self::GetEventLog => CommandTemplate {
                bytes: GET_EVENT_LOG,
                description: "Get event log",
                expected_reply: opcode::EVENT_LOG,
                options: "pin,master",
            },
            Self::Disarm => CommandTemplate {
                bytes: DISARM,
                description: "Disarm",
                expected_reply: 0,
                options: "pin,master",
            },
            Self::ArmHome => CommandTemplate {
                bytes: ARM_HOME,
                description: "Arm home",
                expected_reply: 0,
                options: "pin,master",
            },
            Self::ArmAway => CommandTemplate {
                bytes: ARM_AWAY,
                description: "Arm away",
                expected_reply: 0,
                options: "pin,master",
            },
            Self::ArmAwayInstant => CommandTemplate {
                bytes: ARM_AWAY_INSTANT,
                description: "Arm away instant",
                expected_reply: 0,
                options: "pin,master",
            },
            Self::ReqStatus => CommandTemplate {
                bytes: REQ_STATUS,
                description: "Request status",
                expected_reply: opcode::STATUS_UPDATE,
                options: "",
            },
            Self::EnrollReply => CommandTemplate {
                bytes: ENROLL_REPLY,
                description: "Enroll PowerLink",
                expected_reply: opcode::PANEL_INFO,
                options: "pin",
            },
            Self::Init => CommandTemplate {
                bytes: INIT,
                description: "Init PowerLink connection",
                expected_reply: 0,
                options: "pin",
            },
            Self::Restore => CommandTemplate {
                bytes: RESTORE,
                description: "Restore connection",
                expected_reply: 0,
                options: "",
            },
            Self::DownloadStart => CommandTemplate {
                bytes: DL_START,
                description: "Start download mode",
                expected_reply: opcode::DOWNLOAD_INFO,
                options: "pin",
            },
            Self::DownloadGet => CommandTemplate {
                bytes: DL_GET,
                description: "Get EEPROM block",
                expected_reply: opcode::DOWNLOAD_BLOCK,
                options: "",
            },
            Self::DownloadExit => CommandTemplate {
                bytes: DL_EXIT,
                description: "Exit download mode",
                expected_reply: 0,
                options: "",
            },
            Self::DownloadPanelFw => CommandTemplate {
                bytes: DL_PANEL_FW,
                description: "Get panel firmware strings",
                expected_reply: opcode::DOWNLOAD_BLOCK,
                options: "",
            },
            Self::DownloadSerial => CommandTemplate {
                bytes: DL_SERIAL,
                description: "Get panel serial",
                expected_reply: opcode::DOWNLOAD_BLOCK,
                options: "",
            },
            Self::DownloadZoneStr => CommandTemplate {
                bytes: DL_ZONE_STR,
                description: "Get zone names",
                expected_reply: opcode::DOWNLOAD_BLOCK,
                options: "",
            },
        }
    }
}

/// A command copied out of the catalog (possibly with patched parameter
/// bytes) waiting in the send queue.
#[derive(Debug, Clone, Default)]
pub struct QueuedCommand {
    pub bytes: Vec<u8, MAX_SEND_BUFFER_SIZE>,
    pub description: &'static str,
    pub expected_reply: u8,
    pub options: &'static str,
}

impl QueuedCommand {
    pub fn new(
        bytes: &[u8],
        description: &'static str,
        expected_reply: u8,
        options: &'static str,
    ) -> Result<Self, PmaxError> {
        let bytes = Vec::from_slice(bytes).map_err(|_| PmaxError::FrameTooLarge)?;
        Ok(Self { bytes, description, expected_reply, options })
    }

    pub fn from_template(template: &CommandTemplate) -> Self {
        // Catalog templates all fit the send buffer.
        Self {
            bytes: Vec::from_slice(template.bytes).unwrap_or_default(),
            description: template.description,
            expected_reply: template.expected_reply,
            options: template.options,
        }
    }
}
