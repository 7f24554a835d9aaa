/// MIAX options Top of Market message set
///
/// Little-endian, type(1) then a nanosecond timestamp(4) for everything but
/// System Time. Compact top-of-market messages carry 2 byte prices with 2
/// implied decimals, wide ones 4 byte prices with 4. Double-sided messages
/// decode into a bid and an ask quote.

use super::{DecodeResult, Reader};
use crate::protocol::{OptionId, Price, Side, Size};
use byteorder::LittleEndian;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopQuote {
    pub side: Side,
    pub price: Price,
    pub size: Size,
    pub priority_customer_size: Size,
    pub condition: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopOfMarket {
    pub msg_type: u8,
    pub timestamp: u32,
    pub option: OptionId,
    pub quote: TopQuote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoubleSidedTop {
    pub msg_type: u8,
    pub timestamp: u32,
    pub option: OptionId,
    pub bid: TopQuote,
    pub ask: TopQuote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesUpdate {
    pub timestamp: u32,
    pub option: OptionId,
    pub underlying: [u8; 11],
    pub symbol: [u8; 6],
    pub expiration: [u8; 8],
    pub strike: Price,
    pub call_put: u8,
    pub opening_time: [u8; 8],
    pub closing_time: [u8; 8],
    pub restricted: u8,
    pub long_term: u8,
    pub active: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnderlyingTradingStatus {
    pub timestamp: u32,
    pub underlying: [u8; 11],
    pub status: u8,
    pub reason: u8,
    pub expected_seconds: u32,
    pub expected_nanos: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastSale {
    pub timestamp: u32,
    pub option: OptionId,
    pub trade_id: u32,
    pub correction: u8,
    pub ref_trade_id: u32,
    pub ref_correction: u8,
    pub price: Price,
    pub size: Size,
    pub condition: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradeCancel {
    pub timestamp: u32,
    pub option: OptionId,
    pub trade_id: u32,
    pub correction: u8,
    pub price: Price,
    pub size: Size,
    pub condition: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    SystemTime { seconds: u32 },
    SystemState { timestamp: u32, version: [u8; 8], session_id: u32, status: u8 },
    SeriesUpdate(SeriesUpdate),
    UnderlyingTradingStatus(UnderlyingTradingStatus),
    TopOfMarket(TopOfMarket),
    DoubleSidedTop(DoubleSidedTop),
    LastSale(LastSale),
    TradeCancel(TradeCancel),
    Unknown { msg_type: u8 },
}

impl Default for Message {
    fn default() -> Self {
        Message::Unknown { msg_type: 0 }
    }
}

fn read_quote(r: &mut Reader<'_, LittleEndian>, side: Side, wide: bool) -> DecodeResult<TopQuote> {
    Ok(TopQuote {
        side,
        price: r.price(wide)?,
        size: r.size(wide)?,
        priority_customer_size: r.size(wide)?,
        condition: r.u8()?,
    })
}

fn read_option(r: &mut Reader<'_, LittleEndian>) -> DecodeResult<OptionId> {
    Ok(OptionId(r.u32()? as u64))
}

impl Message {
    pub fn msg_type(&self) -> u8 {
        match self {
            Message::SystemTime { .. } => b'1',
            Message::SystemState { .. } => b'S',
            Message::SeriesUpdate(_) => b'P',
            Message::UnderlyingTradingStatus(_) => b'H',
            Message::TopOfMarket(m) => m.msg_type,
            Message::DoubleSidedTop(m) => m.msg_type,
            Message::LastSale(_) => b'T',
            Message::TradeCancel(_) => b'X',
            Message::Unknown { msg_type } => *msg_type,
        }
    }

    pub fn decode(&mut self, data: &[u8]) -> DecodeResult<()> {
        let mut r = Reader::<LittleEndian>::new(data);
        let msg_type = r.u8()?;
        if msg_type == b'1' {
            *self = Message::SystemTime { seconds: r.u32()? };
            return Ok(());
        }
        let timestamp = r.u32()?;

        let decoded = match msg_type {
            b'S' => Message::SystemState {
                timestamp,
                version: r.bytes()?,
                session_id: r.u32()?,
                status: r.u8()?,
            },
            b'P' => Message::SeriesUpdate(SeriesUpdate {
                timestamp,
                option: read_option(&mut r)?,
                underlying: r.bytes()?,
                symbol: r.bytes()?,
                expiration: r.bytes()?,
                strike: r.price(true)?,
                call_put: r.u8()?,
                opening_time: r.bytes()?,
                closing_time: r.bytes()?,
                restricted: r.u8()?,
                long_term: r.u8()?,
                active: r.u8()?,
            }),
            b'H' => Message::UnderlyingTradingStatus(UnderlyingTradingStatus {
                timestamp,
                underlying: r.bytes()?,
                status: r.u8()?,
                reason: r.u8()?,
                expected_seconds: r.u32()?,
                expected_nanos: r.u32()?,
            }),
            b'B' | b'O' | b'W' | b'A' => {
                let wide = matches!(msg_type, b'W' | b'A');
                let side = if matches!(msg_type, b'B' | b'W') { Side::Bid } else { Side::Ask };
                let option = read_option(&mut r)?;
                Message::TopOfMarket(TopOfMarket {
                    msg_type,
                    timestamp,
                    option,
                    quote: read_quote(&mut r, side, wide)?,
                })
            }
            b'd' | b'D' => {
                let wide = msg_type == b'D';
                let option = read_option(&mut r)?;
                let bid = read_quote(&mut r, Side::Bid, wide)?;
                let ask = read_quote(&mut r, Side::Ask, wide)?;
                Message::DoubleSidedTop(DoubleSidedTop {
                    msg_type,
                    timestamp,
                    option,
                    bid,
                    ask,
                })
            }
            b'T' => Message::LastSale(LastSale {
                timestamp,
                option: read_option(&mut r)?,
                trade_id: r.u32()?,
                correction: r.u8()?,
                ref_trade_id: r.u32()?,
                ref_correction: r.u8()?,
                price: r.price(true)?,
                size: r.u32()?,
                condition: r.u8()?,
            }),
            b'X' => Message::TradeCancel(TradeCancel {
                timestamp,
                option: read_option(&mut r)?,
                trade_id: r.u32()?,
                correction: r.u8()?,
                price: r.price(true)?,
                size: r.u32()?,
                condition: r.u8()?,
            }),
            other => Message::Unknown { msg_type: other },
        };
        *self = decoded;
        Ok(())
    }
}
