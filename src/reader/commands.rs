//! Reader command set
//!
//! Every command the daemon can send, with its payload layout. Commands are
//! plain data; `to_frame()` produces the wire frame through the codec.

use super::constants::*;
use super::frame::Frame;
use crate::error::{Error, Result};

/// Information block requested by `GetInfo`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKind {
    Hardware,
    Software,
    Manufacturer,
}

impl InfoKind {
    pub fn code(self) -> u8 {
        match self {
            InfoKind::Hardware => INFO_HARDWARE,
            InfoKind::Software => INFO_SOFTWARE,
            InfoKind::Manufacturer => INFO_MANUFACTURER,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            INFO_HARDWARE => Some(InfoKind::Hardware),
            INFO_SOFTWARE => Some(InfoKind::Software),
            INFO_MANUFACTURER => Some(InfoKind::Manufacturer),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InfoKind::Hardware => "Hardware Ver",
            InfoKind::Software => "Software Ver",
            InfoKind::Manufacturer => "Manufacturer",
        }
    }
}

/// Regulatory region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    China900,
    Usa,
    Europe,
    China800,
    Korea,
}

impl Region {
    pub fn code(self) -> u8 {
        match self {
            Region::China900 => REGION_CN900,
            Region::Usa => REGION_US,
            Region::Europe => REGION_EU,
            Region::China800 => REGION_CN800,
            Region::Korea => REGION_KR,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            REGION_CN900 => Some(Region::China900),
            REGION_US => Some(Region::Usa),
            REGION_EU => Some(Region::Europe),
            REGION_CN800 => Some(Region::China800),
            REGION_KR => Some(Region::Korea),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Region::China900 => "China 900MHz",
            Region::Usa => "USA",
            Region::Europe => "Europe",
            Region::China800 => "China 800MHz",
            Region::Korea => "Korea",
        }
    }
}

/// Gen2 Query parameters packed into 16 bits
///
/// Bit layout: DR(15) M(13-14) TRext(12) Sel(10-11) Session(8-9)
/// Target(7) Q(3-6), bits 0-2 reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryParams {
    pub dr: u8,
    pub m: u8,
    pub trext: u8,
    pub sel: u8,
    pub session: u8,
    pub target: u8,
    pub q: u8,
}

impl QueryParams {
    /// Validated constructor, every field must fit its bit width
    pub fn new(dr: u8, m: u8, trext: u8, sel: u8, session: u8, target: u8, q: u8) -> Result<Self> {
        let fields = [
            ("DR", dr, 1),
            ("M", m, 3),
            ("TRext", trext, 1),
            ("Sel", sel, 3),
            ("Session", session, 3),
            ("Target", target, 1),
            ("Q", q, 15),
        ];
        for (name, value, max) in fields {
            if value > max {
                return Err(Error::InvalidParameter(format!(
                    "Query {} must be 0..={}, got {}",
                    name, max, value
                )));
            }
        }
        Ok(Self {
            dr,
            m,
            trext,
            sel,
            session,
            target,
            q,
        })
    }

    pub fn to_bits(self) -> u16 {
        ((self.dr as u16 & 0x01) << 15)
            | ((self.m as u16 & 0x03) << 13)
            | ((self.trext as u16 & 0x01) << 12)
            | ((self.sel as u16 & 0x03) << 10)
            | ((self.session as u16 & 0x03) << 8)
            | ((self.target as u16 & 0x01) << 7)
            | ((self.q as u16 & 0x0F) << 3)
    }

    pub fn from_bits(bits: u16) -> Self {
        Self {
            dr: ((bits >> 15) & 0x01) as u8,
            m: ((bits >> 13) & 0x03) as u8,
            trext: ((bits >> 12) & 0x01) as u8,
            sel: ((bits >> 10) & 0x03) as u8,
            session: ((bits >> 8) & 0x03) as u8,
            target: ((bits >> 7) & 0x01) as u8,
            q: ((bits >> 3) & 0x0F) as u8,
        }
    }
}

/// Select filter applied before inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectParams {
    /// Target(3 bits) Action(3 bits) MemBank(2 bits)
    pub sel_param: u8,
    /// Bit pointer into the memory bank
    pub pointer: u32,
    /// Mask length in bits
    pub mask_len_bits: u8,
    pub truncate: bool,
    pub mask: Vec<u8>,
}

impl SelectParams {
    /// Known-good filter used for field testing (EPC bank, 96-bit mask)
    pub fn default_filter() -> Self {
        Self {
            sel_param: 0x01,
            pointer: 0x20,
            mask_len_bits: 0x60,
            truncate: false,
            mask: vec![
                0x30, 0x75, 0x1F, 0xEB, 0x70, 0x5C, 0x59, 0x04, 0xE3, 0xD5, 0x0D, 0x70,
            ],
        }
    }

    pub fn target(&self) -> u8 {
        (self.sel_param >> 5) & 0x07
    }

    pub fn action(&self) -> u8 {
        (self.sel_param >> 2) & 0x07
    }

    pub fn mem_bank(&self) -> u8 {
        self.sel_param & 0x03
    }

    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(7 + self.mask.len());
        payload.push(self.sel_param);
        payload.extend_from_slice(&self.pointer.to_be_bytes());
        payload.push(self.mask_len_bits);
        payload.push(if self.truncate { 0x80 } else { 0x00 });
        payload.extend_from_slice(&self.mask);
        payload
    }

    /// Parse the `GetSelectParam` response layout
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() < 7 {
            return None;
        }
        Some(Self {
            sel_param: payload[0],
            pointer: u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]),
            mask_len_bits: payload[5],
            truncate: payload[6] != 0,
            mask: payload[7..].to_vec(),
        })
    }
}

/// Tag memory location for read/write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAccess {
    pub access_password: u32,
    /// 0 reserved, 1 EPC, 2 TID, 3 user
    pub bank: u8,
    /// Start address in words
    pub start: u16,
    /// Length in words
    pub words: u16,
}

impl MemoryAccess {
    fn write_payload(&self, payload: &mut Vec<u8>) {
        payload.extend_from_slice(&self.access_password.to_be_bytes());
        payload.push(self.bank);
        payload.extend_from_slice(&self.start.to_be_bytes());
        payload.extend_from_slice(&self.words.to_be_bytes());
    }
}

/// Fixed reader command set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderCommand {
    GetInfo(InfoKind),
    GetPower,
    SetPower { dbm: u8 },
    InventorySingle,
    InventoryMulti { count: u16 },
    StopMulti,
    GetSelectParam,
    SetSelectParam(SelectParams),
    SetSelectMode(u8),
    GetRegion,
    SetRegion(Region),
    GetQuery,
    /// Raw 16-bit query word, reserved bits included
    SetQuery { bits: u16 },
    GetChannel,
    SetChannel(u8),
    SetFreqHopping(u8),
    ReadData(MemoryAccess),
    WriteData { access: MemoryAccess, data: Vec<u8> },
}

impl ReaderCommand {
    pub fn set_query(params: QueryParams) -> Self {
        ReaderCommand::SetQuery {
            bits: params.to_bits(),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ReaderCommand::GetInfo(_) => CMD_GET_INFO,
            ReaderCommand::GetPower => CMD_GET_POWER,
            ReaderCommand::SetPower { .. } => CMD_SET_POWER,
            ReaderCommand::InventorySingle => CMD_INVENTORY_SINGLE,
            ReaderCommand::InventoryMulti { .. } => CMD_INVENTORY_MULTI,
            ReaderCommand::StopMulti => CMD_STOP_MULTI,
            ReaderCommand::GetSelectParam => CMD_GET_SELECT_PARAM,
            ReaderCommand::SetSelectParam(_) => CMD_SET_SELECT_PARAM,
            ReaderCommand::SetSelectMode(_) => CMD_SET_SELECT_MODE,
            ReaderCommand::GetRegion => CMD_GET_REGION,
            ReaderCommand::SetRegion(_) => CMD_SET_REGION,
            ReaderCommand::GetQuery => CMD_GET_QUERY,
            ReaderCommand::SetQuery { .. } => CMD_SET_QUERY,
            ReaderCommand::GetChannel => CMD_GET_CHANNEL,
            ReaderCommand::SetChannel(_) => CMD_SET_CHANNEL,
            ReaderCommand::SetFreqHopping(_) => CMD_SET_FREQ_HOPPING,
            ReaderCommand::ReadData(_) => CMD_READ_DATA,
            ReaderCommand::WriteData { .. } => CMD_WRITE_DATA,
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        match self {
            ReaderCommand::GetInfo(kind) => vec![kind.code()],
            ReaderCommand::SetPower { dbm } => (*dbm as u16 * 100).to_be_bytes().to_vec(),
            ReaderCommand::InventoryMulti { count } => {
                let [hi, lo] = count.to_be_bytes();
                vec![INVENTORY_MULTI_RESERVED, hi, lo]
            }
            ReaderCommand::SetSelectParam(params) => params.to_payload(),
            ReaderCommand::SetSelectMode(mode) => vec![*mode],
            ReaderCommand::SetRegion(region) => vec![region.code()],
            ReaderCommand::SetQuery { bits } => bits.to_be_bytes().to_vec(),
            ReaderCommand::SetChannel(index) => vec![*index],
            ReaderCommand::SetFreqHopping(mode) => vec![*mode],
            ReaderCommand::ReadData(access) => {
                let mut payload = Vec::with_capacity(9);
                access.write_payload(&mut payload);
                payload
            }
            ReaderCommand::WriteData { access, data } => {
                let mut payload = Vec::with_capacity(9 + data.len());
                access.write_payload(&mut payload);
                payload.extend_from_slice(data);
                payload
            }
            ReaderCommand::GetPower
            | ReaderCommand::InventorySingle
            | ReaderCommand::StopMulti
            | ReaderCommand::GetSelectParam
            | ReaderCommand::GetRegion
            | ReaderCommand::GetQuery
            | ReaderCommand::GetChannel => Vec::new(),
        }
    }

    pub fn to_frame(&self) -> Frame {
        Frame::command(self.code(), self.payload())
    }

    /// Wire bytes for this command
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.to_frame().encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::frame::{FrameType, checksum};

    fn all_commands() -> Vec<ReaderCommand> {
        let access = MemoryAccess {
            access_password: 0x0000_0000,
            bank: 3,
            start: 0,
            words: 2,
        };
        vec![
            ReaderCommand::GetInfo(InfoKind::Hardware),
            ReaderCommand::GetPower,
            ReaderCommand::SetPower { dbm: 26 },
            ReaderCommand::InventorySingle,
            ReaderCommand::InventoryMulti { count: 10000 },
            ReaderCommand::StopMulti,
            ReaderCommand::GetSelectParam,
            ReaderCommand::SetSelectParam(SelectParams::default_filter()),
            ReaderCommand::SetSelectMode(1),
            ReaderCommand::GetRegion,
            ReaderCommand::SetRegion(Region::Europe),
            ReaderCommand::GetQuery,
            ReaderCommand::SetQuery { bits: 0x1020 },
            ReaderCommand::GetChannel,
            ReaderCommand::SetChannel(1),
            ReaderCommand::SetFreqHopping(0xFF),
            ReaderCommand::ReadData(access),
            ReaderCommand::WriteData {
                access,
                data: vec![0x12, 0x34, 0x56, 0x78],
            },
        ]
    }

    #[test]
    fn test_round_trip_all_commands() {
        for command in all_commands() {
            let bytes = command.encode().unwrap();
            let frame = Frame::decode(&bytes).unwrap();
            assert_eq!(frame.frame_type, FrameType::Command);
            assert_eq!(frame.command, command.code(), "{:?}", command);
            assert_eq!(frame.payload, command.payload(), "{:?}", command);
            assert_eq!(checksum(&bytes[1..bytes.len() - 2]), bytes[bytes.len() - 2]);
        }
    }

    #[test]
    fn test_set_power_scenario() {
        let bytes = ReaderCommand::SetPower { dbm: 20 }.encode().unwrap();
        assert_eq!(bytes, vec![0xBB, 0x00, 0xB6, 0x00, 0x02, 0x07, 0xD0, 0x8F, 0x7E]);
    }

    #[test]
    fn test_inventory_multi_payload() {
        assert_eq!(
            ReaderCommand::InventoryMulti { count: 300 }.payload(),
            vec![0x22, 0x01, 0x2C]
        );
    }

    #[test]
    fn test_query_bits() {
        // DR=0 M=0 TRext=1 Sel=0 Session=0 Target=0 Q=4
        let params = QueryParams::new(0, 0, 1, 0, 0, 0, 4).unwrap();
        assert_eq!(params.to_bits(), 0x1020);
        assert_eq!(QueryParams::from_bits(0x1020), params);

        let all = QueryParams::new(1, 3, 1, 3, 3, 1, 15).unwrap();
        assert_eq!(all.to_bits(), 0xFFF8);

        assert!(QueryParams::new(0, 4, 0, 0, 0, 0, 0).is_err());
        assert!(QueryParams::new(0, 0, 0, 0, 0, 0, 16).is_err());
    }

    #[test]
    fn test_default_select_payload() {
        let params = SelectParams::default_filter();
        let payload = params.to_payload();
        assert_eq!(&payload[..7], &[0x01, 0x00, 0x00, 0x00, 0x20, 0x60, 0x00]);
        assert_eq!(payload.len(), 19);
        assert_eq!(SelectParams::from_payload(&payload), Some(params.clone()));
        assert_eq!(params.mem_bank(), 1);
        assert_eq!(params.target(), 0);
    }

    #[test]
    fn test_read_data_payload() {
        let command = ReaderCommand::ReadData(MemoryAccess {
            access_password: 0x1122_3344,
            bank: 2,
            start: 0x0001,
            words: 0x0004,
        });
        assert_eq!(
            command.payload(),
            vec![0x11, 0x22, 0x33, 0x44, 0x02, 0x00, 0x01, 0x00, 0x04]
        );
    }
}
