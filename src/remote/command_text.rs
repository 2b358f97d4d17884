//! Remote command text grammar
//!
//! A command row carries free text: a verb followed by whitespace
//! separated arguments (`RFID_POWER_SET 20`), or a raw frame in hex
//! (`BB 00 03 00 01 00 04 7E`). Text is parsed once into a
//! `DeviceCommand`; dispatch then matches on the variant.
//!
//! Numbers are decimal unless prefixed with `0x`. Access passwords and
//! data blocks are always hex.

use crate::reader::commands::{InfoKind, MemoryAccess, QueryParams, ReaderCommand, Region, SelectParams};
use crate::reader::constants::{MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
use crate::reader::frame::parse_hex;
use std::str::{FromStr, SplitWhitespace};

/// Highest accepted transmit power (dBm)
pub const MAX_POWER_DBM: u8 = 30;

/// Parsed remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Reader(ReaderCommand),
    /// Frame bytes sent verbatim
    RawFrame(Vec<u8>),
    /// Single polls with query/channel adjustments until a tag answers
    SmartPoll,
}

/// Why a command text was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}'")]
    UnknownVerb(String),

    #[error("{verb}: missing <{name}>")]
    MissingArgument {
        verb: &'static str,
        name: &'static str,
    },

    #[error("{verb}: invalid <{name}> '{value}'")]
    InvalidArgument {
        verb: &'static str,
        name: &'static str,
        value: String,
    },

    #[error("{verb}: unexpected extra argument '{extra}'")]
    TooManyArguments { verb: &'static str, extra: String },

    #[error("{verb}: hex data has an odd number of digits")]
    OddHexLength { verb: &'static str },

    #[error("{verb}: {len} bytes exceeds the {max} byte limit")]
    TooLong {
        verb: &'static str,
        len: usize,
        max: usize,
    },
}

type ParseResult<T> = std::result::Result<T, CommandParseError>;

/// Argument cursor for one verb
struct Args<'a> {
    verb: &'static str,
    tokens: SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn token(&mut self, name: &'static str) -> ParseResult<&'a str> {
        self.tokens.next().ok_or(CommandParseError::MissingArgument {
            verb: self.verb,
            name,
        })
    }

    fn invalid(&self, name: &'static str, value: &str) -> CommandParseError {
        CommandParseError::InvalidArgument {
            verb: self.verb,
            name,
            value: value.to_string(),
        }
    }

    /// Decimal, or hex with a `0x` prefix
    fn number<T>(&mut self, name: &'static str) -> ParseResult<T>
    where
        T: FromStr + TryFrom<u64>,
    {
        let raw = self.token(name)?;
        let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u64>().ok(),
        };
        parsed
            .and_then(|v| T::try_from(v).ok())
            .ok_or_else(|| self.invalid(name, raw))
    }

    fn ranged<T>(&mut self, name: &'static str, min: T, max: T) -> ParseResult<T>
    where
        T: FromStr + TryFrom<u64> + PartialOrd + Copy + ToString,
    {
        let value: T = self.number(name)?;
        if value < min || value > max {
            return Err(self.invalid(name, &value.to_string()));
        }
        Ok(value)
    }

    /// Hex, `0x` prefix optional
    fn hex_u32(&mut self, name: &'static str) -> ParseResult<u32> {
        let raw = self.token(name)?;
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        u32::from_str_radix(digits, 16).map_err(|_| self.invalid(name, raw))
    }

    fn hex_bytes(&mut self, name: &'static str) -> ParseResult<Vec<u8>> {
        let raw = self.token(name)?;
        if raw.len() % 2 != 0 {
            return Err(CommandParseError::OddHexLength { verb: self.verb });
        }
        parse_hex(raw).ok_or_else(|| self.invalid(name, raw))
    }

    fn finish(mut self) -> ParseResult<()> {
        match self.tokens.next() {
            Some(extra) => Err(CommandParseError::TooManyArguments {
                verb: self.verb,
                extra: extra.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl FromStr for DeviceCommand {
    type Err = CommandParseError;

    fn from_str(text: &str) -> ParseResult<Self> {
        parse(text)
    }
}

/// Parse command text into a typed command
pub fn parse(text: &str) -> ParseResult<DeviceCommand> {
    let text = text.trim();
    let Some(first) = text.split_whitespace().next() else {
        return Err(CommandParseError::Empty);
    };

    if first.get(..2).is_some_and(|prefix| prefix.eq_ignore_ascii_case("BB")) {
        return parse_raw_frame(text);
    }

    let upper = first.to_ascii_uppercase();
    let Some(verb) = VERBS.iter().copied().find(|v| *v == upper) else {
        return Err(CommandParseError::UnknownVerb(first.to_string()));
    };

    let mut tokens = text.split_whitespace();
    tokens.next();
    let mut args = Args { verb, tokens };

    let command = match verb {
        "RFID_INFO" => ReaderCommand::GetInfo(InfoKind::Hardware),
        "RFID_POWER_GET" => ReaderCommand::GetPower,
        "RFID_POWER_SET" => ReaderCommand::SetPower {
            dbm: args.ranged("dbm", 0u8, MAX_POWER_DBM)?,
        },
        "RFID_POLL_SINGLE" => ReaderCommand::InventorySingle,
        "RFID_POLL_MULTI" => ReaderCommand::InventoryMulti {
            count: args.ranged("count", 1u16, u16::MAX)?,
        },
        "RFID_POLL_STOP" => ReaderCommand::StopMulti,
        "RFID_POLL_RETRY_SMART" => {
            args.finish()?;
            return Ok(DeviceCommand::SmartPoll);
        }
        "RFID_SELECT_GET" => ReaderCommand::GetSelectParam,
        "RFID_SELECT_SET_DEFAULT" => ReaderCommand::SetSelectParam(SelectParams::default_filter()),
        "RFID_SELECT_MODE" => ReaderCommand::SetSelectMode(args.number("mode")?),
        "RFID_REGION_GET" => ReaderCommand::GetRegion,
        "RFID_REGION_SET" => {
            let code: u8 = args.number("region")?;
            let region = Region::from_code(code).ok_or_else(|| args.invalid("region", &code.to_string()))?;
            ReaderCommand::SetRegion(region)
        }
        "RFID_QUERY_GET" => ReaderCommand::GetQuery,
        "RFID_QUERY_SET" => {
            let dr = args.number("dr")?;
            let m = args.number("m")?;
            let trext = args.number("trext")?;
            let sel = args.number("sel")?;
            let session = args.number("session")?;
            let target = args.number("target")?;
            let q = args.number("q")?;
            let params = QueryParams::new(dr, m, trext, sel, session, target, q).map_err(|_| {
                args.invalid(
                    "query",
                    &format!("{} {} {} {} {} {} {}", dr, m, trext, sel, session, target, q),
                )
            })?;
            ReaderCommand::set_query(params)
        }
        "RFID_QUERY_SET_RAW" => {
            let raw = args.token("bits")?;
            let digits = raw
                .strip_prefix("0x")
                .or_else(|| raw.strip_prefix("0X"))
                .unwrap_or(raw);
            let bits = u16::from_str_radix(digits, 16).map_err(|_| args.invalid("bits", raw))?;
            ReaderCommand::SetQuery { bits }
        }
        "RFID_CHANNEL_GET" => ReaderCommand::GetChannel,
        "RFID_CHANNEL_SET" => ReaderCommand::SetChannel(args.number("channel")?),
        "RFID_FH_SET" => ReaderCommand::SetFreqHopping(args.number("mode")?),
        "RFID_READ_DATA" => ReaderCommand::ReadData(memory_access(&mut args)?),
        "RFID_WRITE_DATA" => {
            let access = memory_access(&mut args)?;
            let data = args.hex_bytes("data")?;
            let payload_len = 9 + data.len();
            if payload_len > MAX_PAYLOAD_SIZE {
                return Err(CommandParseError::TooLong {
                    verb,
                    len: payload_len,
                    max: MAX_PAYLOAD_SIZE,
                });
            }
            ReaderCommand::WriteData { access, data }
        }
        _ => return Err(CommandParseError::UnknownVerb(first.to_string())),
    };

    args.finish()?;
    Ok(DeviceCommand::Reader(command))
}

const VERBS: &[&str] = &[
    "RFID_INFO",
    "RFID_POWER_GET",
    "RFID_POWER_SET",
    "RFID_POLL_SINGLE",
    "RFID_POLL_MULTI",
    "RFID_POLL_STOP",
    "RFID_POLL_RETRY_SMART",
    "RFID_SELECT_GET",
    "RFID_SELECT_SET_DEFAULT",
    "RFID_SELECT_MODE",
    "RFID_REGION_GET",
    "RFID_REGION_SET",
    "RFID_QUERY_GET",
    "RFID_QUERY_SET",
    "RFID_QUERY_SET_RAW",
    "RFID_CHANNEL_GET",
    "RFID_CHANNEL_SET",
    "RFID_FH_SET",
    "RFID_READ_DATA",
    "RFID_WRITE_DATA",
];

/// `<ap_hex> <mb> <sa> <dl>`
fn memory_access(args: &mut Args<'_>) -> ParseResult<MemoryAccess> {
    Ok(MemoryAccess {
        access_password: args.hex_u32("ap")?,
        bank: args.ranged("mb", 0u8, 3)?,
        start: args.number("sa")?,
        words: args.number("dl")?,
    })
}

fn parse_raw_frame(text: &str) -> ParseResult<DeviceCommand> {
    const VERB: &str = "RAW";
    let digits = text.chars().filter(|c| !c.is_whitespace()).count();
    if digits % 2 != 0 {
        return Err(CommandParseError::OddHexLength { verb: VERB });
    }
    let bytes = parse_hex(text).ok_or_else(|| CommandParseError::InvalidArgument {
        verb: VERB,
        name: "frame",
        value: text.to_string(),
    })?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(CommandParseError::TooLong {
            verb: VERB,
            len: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(DeviceCommand::RawFrame(bytes))
}
