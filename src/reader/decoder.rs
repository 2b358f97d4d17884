//! Response decoder
//!
//! Maps a validated frame to what it means: a tag sighting, a command
//! status, a parameter readout, or a module error. Every decode is bounds
//! checked; a known command with an unexpected payload length becomes
//! `Malformed` instead of reading past the payload.
//!
//! `Display` renders the human-readable result string that is reported
//! back to the remote command queue.

use super::commands::{InfoKind, QueryParams, Region, SelectParams};
use super::constants::*;
use super::frame::{Frame, FrameType};
use std::fmt;

/// One tag seen during inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSighting {
    /// Uppercase hex, no separators
    pub epc: String,
    /// Signed dBm
    pub rssi: i8,
    /// Protocol control word
    pub pc: u16,
}

/// Decoded meaning of a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderReply {
    TagSeen(TagSighting),
    /// Set-style acknowledgement (status byte 0x00 is success)
    Status { command: u8, success: bool },
    Info { kind: Option<InfoKind>, text: String },
    Power { centi_dbm: u16 },
    Region { code: u8 },
    Channel { index: u8 },
    Query(QueryParams),
    SelectParam(SelectParams),
    ReadData { epc: String, data: Vec<u8> },
    /// Single-byte module error
    Error { code: u8 },
    /// Tag access error carrying the offending EPC
    TagError { code: u8, epc: String },
    /// Known command, unexpected payload length
    Malformed { command: u8, len: usize },
    Unknown { frame_type: FrameType, command: u8 },
}

impl ReaderReply {
    /// Decode a validated frame
    pub fn from_frame(frame: &Frame) -> Self {
        let p = frame.payload.as_slice();
        let malformed = || ReaderReply::Malformed {
            command: frame.command,
            len: p.len(),
        };

        match (frame.frame_type, frame.command) {
            (FrameType::Notification, CMD_INVENTORY_SINGLE) => {
                if p.len() < 5 {
                    return malformed();
                }
                let epc_len = p.len() - 5;
                ReaderReply::TagSeen(TagSighting {
                    rssi: p[0] as i8,
                    pc: u16::from_be_bytes([p[1], p[2]]),
                    epc: hex::encode_upper(&p[3..3 + epc_len]),
                })
            }
            (FrameType::Response, CMD_GET_INFO) => {
                if p.is_empty() {
                    return malformed();
                }
                let text = String::from_utf8_lossy(&p[1..])
                    .trim_end_matches('\0')
                    .to_string();
                ReaderReply::Info {
                    kind: InfoKind::from_code(p[0]),
                    text,
                }
            }
            (FrameType::Response, CMD_GET_POWER) => match p {
                [hi, lo] => ReaderReply::Power {
                    centi_dbm: u16::from_be_bytes([*hi, *lo]),
                },
                _ => malformed(),
            },
            (
                FrameType::Response,
                CMD_SET_POWER | CMD_STOP_MULTI | CMD_SET_SELECT_PARAM | CMD_SET_SELECT_MODE
                | CMD_SET_REGION | CMD_SET_CHANNEL | CMD_SET_FREQ_HOPPING | CMD_SET_QUERY,
            ) => match p {
                [status] => ReaderReply::Status {
                    command: frame.command,
                    success: *status == STATUS_OK,
                },
                _ => malformed(),
            },
            (FrameType::Response, CMD_GET_SELECT_PARAM) => match SelectParams::from_payload(p) {
                Some(params) => ReaderReply::SelectParam(params),
                None => malformed(),
            },
            (FrameType::Response, CMD_GET_REGION) => match p {
                [code] => ReaderReply::Region { code: *code },
                _ => malformed(),
            },
            (FrameType::Response, CMD_GET_CHANNEL) => match p {
                [index] => ReaderReply::Channel { index: *index },
                _ => malformed(),
            },
            (FrameType::Response, CMD_GET_QUERY) => match p {
                [hi, lo] => ReaderReply::Query(QueryParams::from_bits(u16::from_be_bytes([*hi, *lo]))),
                _ => malformed(),
            },
            (FrameType::Response, CMD_READ_DATA) => {
                // UL(1) PC(2) EPC(UL-2) DATA(rest)
                if p.len() < 3 {
                    return malformed();
                }
                let ul = p[0] as usize;
                if ul < 2 || p.len() < 1 + ul {
                    return malformed();
                }
                ReaderReply::ReadData {
                    epc: hex::encode_upper(&p[3..1 + ul]),
                    data: p[1 + ul..].to_vec(),
                }
            }
            (FrameType::Response, CMD_WRITE_DATA) => {
                // UL(1) PC+EPC(UL) STATUS(1)
                if p.len() < 4 {
                    return malformed();
                }
                let status_index = 1 + p[0] as usize;
                match p.get(status_index) {
                    Some(status) => ReaderReply::Status {
                        command: CMD_WRITE_DATA,
                        success: *status == STATUS_OK,
                    },
                    None => malformed(),
                }
            }
            (FrameType::Response, CMD_ERROR) => match p {
                [] => malformed(),
                [code] => ReaderReply::Error { code: *code },
                [code, ul, ..] => {
                    // ERR(1) UL(1) PC(2) EPC(UL-2)
                    let ul = *ul as usize;
                    let epc = if ul >= 2 && p.len() >= 2 + ul {
                        hex::encode_upper(&p[4..2 + ul])
                    } else {
                        String::new()
                    };
                    ReaderReply::TagError { code: *code, epc }
                }
            },
            (frame_type, command) => ReaderReply::Unknown {
                frame_type,
                command,
            },
        }
    }

    /// Module reported that no tag answered
    pub fn is_no_tag(&self) -> bool {
        matches!(self, ReaderReply::Error { code } if *code == ERR_NO_TAG)
    }

    pub fn as_sighting(&self) -> Option<&TagSighting> {
        match self {
            ReaderReply::TagSeen(sighting) => Some(sighting),
            _ => None,
        }
    }
}

/// Name used in status and malformed result strings
fn command_name(command: u8) -> &'static str {
    match command {
        CMD_GET_INFO => "GetInfo",
        CMD_GET_POWER => "GetPower",
        CMD_SET_POWER => "SetPower",
        CMD_INVENTORY_SINGLE => "Inventory",
        CMD_INVENTORY_MULTI => "MultiPoll",
        CMD_STOP_MULTI => "StopPoll",
        CMD_GET_SELECT_PARAM => "GetSelectParam",
        CMD_SET_SELECT_PARAM => "SetSelectParam",
        CMD_SET_SELECT_MODE => "SetSelectMode",
        CMD_GET_REGION => "GetRegion",
        CMD_SET_REGION => "SetRegion",
        CMD_GET_QUERY => "GetQuery",
        CMD_SET_QUERY => "SetQuery",
        CMD_GET_CHANNEL => "GetChannel",
        CMD_SET_CHANNEL => "SetChannel",
        CMD_SET_FREQ_HOPPING => "SetFreqHopping",
        CMD_READ_DATA => "ReadData",
        CMD_WRITE_DATA => "WriteData",
        CMD_ERROR => "Error",
        _ => "Unknown",
    }
}

fn error_family(code: u8) -> String {
    if code == ERR_ACCESS_PASSWORD {
        "Access Pwd Err".to_string()
    } else if code & 0xF0 == ERR_READ_PROTOCOL_MASK {
        format!("Read Protocol Err {:x}", code & 0x0F)
    } else if code & 0xF0 == ERR_WRITE_PROTOCOL_MASK {
        format!("Write Protocol Err {:x}", code & 0x0F)
    } else {
        "Unknown".to_string()
    }
}

impl fmt::Display for ReaderReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderReply::TagSeen(tag) => write!(f, "Tag: EPC={} RSSI={}dBm", tag.epc, tag.rssi),
            ReaderReply::Status { command, success } => write!(
                f,
                "{}: {}",
                command_name(*command),
                if *success { "Success" } else { "Fail" }
            ),
            ReaderReply::Info { kind, text } => write!(
                f,
                "Info: {} = {}",
                kind.map(InfoKind::label).unwrap_or("Unknown"),
                text
            ),
            ReaderReply::Power { centi_dbm } => {
                write!(f, "Power: {} ({} dBm)", centi_dbm, centi_dbm / 100)
            }
            ReaderReply::Region { code } => write!(
                f,
                "Region: {} ({:x})",
                Region::from_code(*code).map(Region::name).unwrap_or("Unknown"),
                code
            ),
            ReaderReply::Channel { index } => write!(f, "Channel Index: {}", index),
            ReaderReply::Query(q) => write!(
                f,
                "QueryParam: DR={} M={} TRext={} Sel={} Sess={} Tgt={} Q={}",
                q.dr, q.m, q.trext, q.sel, q.session, q.target, q.q
            ),
            ReaderReply::SelectParam(s) => write!(
                f,
                "SelectParam: Target={} Action={} Mem={} Ptr={} Len={} Trunc={} Mask={}",
                s.target(),
                s.action(),
                s.mem_bank(),
                s.pointer,
                s.mask_len_bits,
                if s.truncate { "Enable" } else { "Disable" },
                hex::encode_upper(&s.mask)
            ),
            ReaderReply::ReadData { epc, data } => {
                write!(f, "ReadData: EPC={} Data={}", epc, hex::encode_upper(data))
            }
            ReaderReply::Error { code } => {
                write!(f, "Error: Code {:x}", code)?;
                if *code == ERR_NO_TAG {
                    write!(f, " (No Tag Found)")?;
                }
                Ok(())
            }
            ReaderReply::TagError { code, epc } => write!(
                f,
                "Error: {} (Code {:x}) EPC={}",
                error_family(*code),
                code,
                epc
            ),
            ReaderReply::Malformed { command, len } => write!(
                f,
                "Error: Malformed {} payload ({} bytes)",
                command_name(*command),
                len
            ),
            ReaderReply::Unknown { command, .. } => write!(f, "Unknown Frame: Cmd={:x}", command),
        }
    }
}
