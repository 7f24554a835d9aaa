/// BATS options multicast PITCH message set
///
/// Little-endian. Each message starts with length(1, counts itself) and
/// type(1). Long variants carry 8 byte prices with 4 implied decimals, short
/// variants 2 byte prices with 2 implied decimals.

use super::{DecodeError, DecodeResult, Reader};
use crate::protocol::{price_from_2dp, price_from_4dp, OptionId, OrderId, Price, Side, Size};
use byteorder::LittleEndian;

pub const TIME: u8 = 0x20;
pub const ADD_ORDER_LONG: u8 = 0x21;
pub const ADD_ORDER_SHORT: u8 = 0x22;
pub const ORDER_EXECUTED: u8 = 0x23;
pub const ORDER_EXECUTED_AT_PRICE_SIZE: u8 = 0x24;
pub const REDUCE_SIZE_LONG: u8 = 0x25;
pub const REDUCE_SIZE_SHORT: u8 = 0x26;
pub const MODIFY_ORDER_LONG: u8 = 0x27;
pub const MODIFY_ORDER_SHORT: u8 = 0x28;
pub const DELETE_ORDER: u8 = 0x29;
pub const TRADE_LONG: u8 = 0x2a;
pub const TRADE_SHORT: u8 = 0x2b;
pub const TRADE_BREAK: u8 = 0x2c;
pub const END_OF_SESSION: u8 = 0x2d;
pub const SYMBOL_MAPPING: u8 = 0x2e;
pub const ADD_ORDER_EXPANDED: u8 = 0x2f;
pub const TRADING_STATUS: u8 = 0x31;
pub const UNIT_CLEAR: u8 = 0x97;
pub const AUCTION_NOTIFICATION: u8 = 0xad;
pub const AUCTION_CANCEL: u8 = 0xae;
pub const AUCTION_TRADE: u8 = 0xaf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOrder {
    pub msg_type: u8,
    pub time_offset: u32,
    pub order_id: OrderId,
    pub side: Side,
    pub size: Size,
    /// Symbol as sent, space padded to 8
    pub symbol: [u8; 8],
    pub option: OptionId,
    pub price: Price,
    pub flags: u8,
    pub participant: Option<[u8; 4]>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderExecuted {
    pub time_offset: u32,
    pub order_id: OrderId,
    pub executed: Size,
    pub execution_id: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderExecutedAtPriceSize {
    pub time_offset: u32,
    pub order_id: OrderId,
    pub executed: Size,
    pub remaining: Size,
    pub execution_id: u64,
    pub price: Price,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReduceSize {
    pub msg_type: u8,
    pub time_offset: u32,
    pub order_id: OrderId,
    pub cancelled: Size,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifyOrder {
    pub msg_type: u8,
    pub time_offset: u32,
    pub order_id: OrderId,
    pub size: Size,
    pub price: Price,
    pub flags: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trade {
    pub msg_type: u8,
    pub time_offset: u32,
    pub order_id: OrderId,
    pub side: Side,
    pub size: Size,
    pub symbol: [u8; 6],
    pub price: Price,
    pub execution_id: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolMapping {
    pub feed_symbol: [u8; 6],
    pub osi_symbol: [u8; 21],
    pub condition: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradingStatus {
    pub time_offset: u32,
    pub symbol: [u8; 8],
    pub status: u8,
    pub reg_sho: u8,
}

/// Auction notification, cancel and trade share this prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Auction {
    pub msg_type: u8,
    pub time_offset: u32,
    pub symbol: [u8; 6],
    pub auction_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Time { seconds: u32 },
    AddOrder(AddOrder),
    OrderExecuted(OrderExecuted),
    OrderExecutedAtPriceSize(OrderExecutedAtPriceSize),
    ReduceSize(ReduceSize),
    ModifyOrder(ModifyOrder),
    DeleteOrder { time_offset: u32, order_id: OrderId },
    Trade(Trade),
    TradeBreak { time_offset: u32, execution_id: u64 },
    EndOfSession { time_offset: u32 },
    SymbolMapping(SymbolMapping),
    TradingStatus(TradingStatus),
    UnitClear { time_offset: u32 },
    Auction(Auction),
    Unknown { msg_type: u8 },
}

impl Default for Message {
    fn default() -> Self {
        Message::Unknown { msg_type: 0 }
    }
}

fn read_side(r: &mut Reader<'_, LittleEndian>) -> DecodeResult<Side> {
    Ok(Side::from_wire(r.u8()?))
}

fn read_price(r: &mut Reader<'_, LittleEndian>, long: bool) -> DecodeResult<Price> {
    if long {
        Ok(price_from_4dp(r.u64()?))
    } else {
        Ok(price_from_2dp(r.u16()? as u64))
    }
}

fn read_size(r: &mut Reader<'_, LittleEndian>, long: bool) -> DecodeResult<Size> {
    r.size(long)
}

impl Message {
    pub fn msg_type(&self) -> u8 {
        match self {
            Message::Time { .. } => TIME,
            Message::AddOrder(m) => m.msg_type,
            Message::OrderExecuted(_) => ORDER_EXECUTED,
            Message::OrderExecutedAtPriceSize(_) => ORDER_EXECUTED_AT_PRICE_SIZE,
            Message::ReduceSize(m) => m.msg_type,
            Message::ModifyOrder(m) => m.msg_type,
            Message::DeleteOrder { .. } => DELETE_ORDER,
            Message::Trade(m) => m.msg_type,
            Message::TradeBreak { .. } => TRADE_BREAK,
            Message::EndOfSession { .. } => END_OF_SESSION,
            Message::SymbolMapping(_) => SYMBOL_MAPPING,
            Message::TradingStatus(_) => TRADING_STATUS,
            Message::UnitClear { .. } => UNIT_CLEAR,
            Message::Auction(m) => m.msg_type,
            Message::Unknown { msg_type } => *msg_type,
        }
    }

    /// Decode one PITCH message, length byte included, in place.
    pub fn decode(&mut self, data: &[u8]) -> DecodeResult<()> {
        let mut r = Reader::<LittleEndian>::new(data);
        let length = r.u8()? as usize;
        if length < 2 {
            return Err(DecodeError::BadLength(length));
        }
        if length > data.len() {
            return Err(DecodeError::TruncatedMessage {
                declared: length,
                actual: data.len(),
            });
        }
        let msg_type = r.u8()?;

        let decoded = match msg_type {
            TIME => Message::Time { seconds: r.u32()? },
            ADD_ORDER_LONG | ADD_ORDER_SHORT | ADD_ORDER_EXPANDED => {
                let long = msg_type != ADD_ORDER_SHORT;
                let time_offset = r.u32()?;
                let order_id = OrderId(r.u64()?);
                let side = read_side(&mut r)?;
                let size = read_size(&mut r, long)?;
                let mut symbol = [b' '; 8];
                if msg_type == ADD_ORDER_EXPANDED {
                    symbol = r.bytes()?;
                } else {
                    symbol[..6].copy_from_slice(&r.bytes::<6>()?);
                }
                let price = read_price(&mut r, long)?;
                let flags = r.u8()?;
                let participant = if msg_type == ADD_ORDER_EXPANDED {
                    Some(r.bytes()?)
                } else {
                    None
                };
                Message::AddOrder(AddOrder {
                    msg_type,
                    time_offset,
                    order_id,
                    side,
                    size,
                    symbol,
                    option: OptionId::from_symbol(&symbol),
                    price,
                    flags,
                    participant,
                })
            }
            ORDER_EXECUTED => Message::OrderExecuted(OrderExecuted {
                time_offset: r.u32()?,
                order_id: OrderId(r.u64()?),
                executed: r.u32()?,
                execution_id: r.u64()?,
            }),
            ORDER_EXECUTED_AT_PRICE_SIZE => Message::OrderExecutedAtPriceSize(OrderExecutedAtPriceSize {
                time_offset: r.u32()?,
                order_id: OrderId(r.u64()?),
                executed: r.u32()?,
                remaining: r.u32()?,
                execution_id: r.u64()?,
                price: read_price(&mut r, true)?,
            }),
            REDUCE_SIZE_LONG | REDUCE_SIZE_SHORT => Message::ReduceSize(ReduceSize {
                msg_type,
                time_offset: r.u32()?,
                order_id: OrderId(r.u64()?),
                cancelled: read_size(&mut r, msg_type == REDUCE_SIZE_LONG)?,
            }),
            MODIFY_ORDER_LONG | MODIFY_ORDER_SHORT => {
                let long = msg_type == MODIFY_ORDER_LONG;
                Message::ModifyOrder(ModifyOrder {
                    msg_type,
                    time_offset: r.u32()?,
                    order_id: OrderId(r.u64()?),
                    size: read_size(&mut r, long)?,
                    price: read_price(&mut r, long)?,
                    flags: r.u8()?,
                })
            }
            DELETE_ORDER => Message::DeleteOrder {
                time_offset: r.u32()?,
                order_id: OrderId(r.u64()?),
            },
            TRADE_LONG | TRADE_SHORT => {
                let long = msg_type == TRADE_LONG;
                Message::Trade(Trade {
                    msg_type,
                    time_offset: r.u32()?,
                    order_id: OrderId(r.u64()?),
                    side: read_side(&mut r)?,
                    size: read_size(&mut r, long)?,
                    symbol: r.bytes()?,
                    price: read_price(&mut r, long)?,
                    execution_id: r.u64()?,
                })
            }
            TRADE_BREAK => Message::TradeBreak {
                time_offset: r.u32()?,
                execution_id: r.u64()?,
            },
            END_OF_SESSION => Message::EndOfSession { time_offset: r.u32()? },
            SYMBOL_MAPPING => Message::SymbolMapping(SymbolMapping {
                feed_symbol: r.bytes()?,
                osi_symbol: r.bytes()?,
                condition: r.u8()?,
            }),
            TRADING_STATUS => {
                let time_offset = r.u32()?;
                let symbol = r.bytes()?;
                let status = r.u8()?;
                let reg_sho = r.u8()?;
                r.skip(2)?;
                Message::TradingStatus(TradingStatus {
                    time_offset,
                    symbol,
                    status,
                    reg_sho,
                })
            }
            UNIT_CLEAR => Message::UnitClear { time_offset: r.u32()? },
            AUCTION_NOTIFICATION | AUCTION_CANCEL | AUCTION_TRADE => Message::Auction(Auction {
                msg_type,
                time_offset: r.u32()?,
                symbol: r.bytes()?,
                auction_id: r.u64()?,
            }),
            other => Message::Unknown { msg_type: other },
        };
        *self = decoded;
        Ok(())
    }
}
