//! Constants for the UHF reader module serial protocol

// Frame delimiters
pub const FRAME_HEADER: u8 = 0xBB;
pub const FRAME_END: u8 = 0x7E;

// Frame geometry: header + type + cmd + len(2) + checksum + end
pub const FRAME_OVERHEAD: usize = 7;
pub const LENGTH_FIELD_END: usize = 5; // bytes needed before the length is known
pub const MAX_FRAME_SIZE: usize = 500;
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - FRAME_OVERHEAD;

// Frame types
pub const TYPE_COMMAND: u8 = 0x00;
pub const TYPE_RESPONSE: u8 = 0x01;
pub const TYPE_NOTIFICATION: u8 = 0x02;

// Module information
pub const CMD_GET_INFO: u8 = 0x03;

// Select
pub const CMD_GET_SELECT_PARAM: u8 = 0x0B;
pub const CMD_SET_SELECT_PARAM: u8 = 0x0C;
pub const CMD_SET_SELECT_MODE: u8 = 0x12;

// Query (Gen2 singulation parameters)
pub const CMD_GET_QUERY: u8 = 0x0D;
pub const CMD_SET_QUERY: u8 = 0x0E;

// Region and channel
pub const CMD_SET_REGION: u8 = 0x07;
pub const CMD_GET_REGION: u8 = 0x08;
pub const CMD_GET_CHANNEL: u8 = 0xAA;
pub const CMD_SET_CHANNEL: u8 = 0xAB;
pub const CMD_SET_FREQ_HOPPING: u8 = 0xAD; // 0xFF auto, 0x00 cancel

// Inventory
pub const CMD_INVENTORY_SINGLE: u8 = 0x22; // also the code of every tag notification
pub const CMD_INVENTORY_MULTI: u8 = 0x27;
pub const CMD_STOP_MULTI: u8 = 0x28;
pub const INVENTORY_MULTI_RESERVED: u8 = 0x22; // first byte of the multi-poll payload

// Tag memory access
pub const CMD_READ_DATA: u8 = 0x39;
pub const CMD_WRITE_DATA: u8 = 0x49;

// Transmit power (hundredths of dBm, big-endian)
pub const CMD_SET_POWER: u8 = 0xB6;
pub const CMD_GET_POWER: u8 = 0xB7;

// Error response
pub const CMD_ERROR: u8 = 0xFF;

// Error codes
pub const ERR_NO_TAG: u8 = 0x15;
pub const ERR_ACCESS_PASSWORD: u8 = 0x16;
pub const ERR_READ_PROTOCOL_MASK: u8 = 0xA0; // low nibble is the Gen2 error
pub const ERR_WRITE_PROTOCOL_MASK: u8 = 0xB0;

// Status byte of set-style responses
pub const STATUS_OK: u8 = 0x00;

// Region codes
pub const REGION_CN900: u8 = 0x01;
pub const REGION_US: u8 = 0x02;
pub const REGION_EU: u8 = 0x03;
pub const REGION_CN800: u8 = 0x04;
pub const REGION_KR: u8 = 0x06;

// Info kinds for CMD_GET_INFO
pub const INFO_HARDWARE: u8 = 0x00;
pub const INFO_SOFTWARE: u8 = 0x01;
pub const INFO_MANUFACTURER: u8 = 0x02;
