/// NASDAQ options ITTO 4.0 message set
///
/// All integers are big-endian. Every message except `T` starts with
/// type(1) timestamp(4). Short (lower case) and long (upper case) variants of
/// the same message share one decoder; compact prices carry 2 decimals and
/// are normalised to 4.

use super::{DecodeResult, Reader};
use crate::protocol::{OptionId, OrderId, Price, Side, Size};
use byteorder::BigEndian;

/// One side of an order-level message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderSide {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub size: Size,
}

/// One side of a replace: `orig_id` is removed, `order_id` takes its place
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceSide {
    pub orig_id: OrderId,
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub size: Size,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionDirectory {
    pub timestamp: u32,
    pub option: OptionId,
    pub symbol: [u8; 6],
    pub expiration: [u8; 3],
    pub strike: Price,
    pub option_type: u8,
    pub source: u8,
    pub underlying: [u8; 13],
    pub closing_type: u8,
    pub tradable: u8,
    pub mpv: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOrder {
    pub msg_type: u8,
    pub timestamp: u32,
    pub option: OptionId,
    pub order: OrderSide,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddQuote {
    pub msg_type: u8,
    pub timestamp: u32,
    pub option: OptionId,
    pub bid: OrderSide,
    pub ask: OrderSide,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleSideExecuted {
    pub timestamp: u32,
    pub order_id: OrderId,
    pub executed: Size,
    pub cross_number: u32,
    pub match_number: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleSideExecutedWithPrice {
    pub timestamp: u32,
    pub order_id: OrderId,
    pub cross_number: u32,
    pub match_number: u32,
    pub printable: u8,
    pub price: Price,
    pub size: Size,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderCancel {
    pub timestamp: u32,
    pub order_id: OrderId,
    pub cancelled: Size,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleSideReplace {
    pub msg_type: u8,
    pub timestamp: u32,
    pub replace: ReplaceSide,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleSideUpdate {
    pub timestamp: u32,
    pub order_id: OrderId,
    pub reason: u8,
    pub price: Price,
    pub size: Size,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuoteReplace {
    pub msg_type: u8,
    pub timestamp: u32,
    pub bid: ReplaceSide,
    pub ask: ReplaceSide,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuoteDelete {
    pub timestamp: u32,
    pub bid_order_id: OrderId,
    pub ask_order_id: OrderId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSingleSideDelete {
    pub timestamp: u32,
    pub order_ids: Vec<OrderId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionsTrade {
    pub timestamp: u32,
    pub side: Side,
    pub option: OptionId,
    pub cross_number: u32,
    pub match_number: u32,
    pub price: Price,
    pub size: Size,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrossTrade {
    pub timestamp: u32,
    pub option: OptionId,
    pub cross_number: u32,
    pub match_number: u32,
    pub cross_type: u8,
    pub price: Price,
    pub size: Size,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Noii {
    pub timestamp: u32,
    pub auction_id: u32,
    pub auction_type: u8,
    pub paired: Size,
    pub imbalance_direction: u8,
    pub option: OptionId,
    pub imbalance_price: Price,
    pub imbalance_volume: Size,
    pub customer_firm: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Seconds { second: u32 },
    SystemEvent { timestamp: u32, event_code: u8 },
    OptionDirectory(OptionDirectory),
    TradingAction { timestamp: u32, option: OptionId, state: u8 },
    OptionOpen { timestamp: u32, option: OptionId, open_state: u8 },
    AddOrder(AddOrder),
    AddQuote(AddQuote),
    SingleSideExecuted(SingleSideExecuted),
    SingleSideExecutedWithPrice(SingleSideExecutedWithPrice),
    OrderCancel(OrderCancel),
    SingleSideReplace(SingleSideReplace),
    SingleSideDelete { timestamp: u32, order_id: OrderId },
    SingleSideUpdate(SingleSideUpdate),
    QuoteReplace(QuoteReplace),
    QuoteDelete(QuoteDelete),
    BlockSingleSideDelete(BlockSingleSideDelete),
    OptionsTrade(OptionsTrade),
    CrossTrade(CrossTrade),
    BrokenTrade { timestamp: u32, cross_number: u32, match_number: u32 },
    Noii(Noii),
    Unknown { msg_type: u8 },
}

impl Default for Message {
    fn default() -> Self {
        Message::Unknown { msg_type: 0 }
    }
}

fn read_side(r: &mut Reader<'_, BigEndian>) -> DecodeResult<Side> {
    Ok(Side::from_wire(r.u8()?))
}

fn read_order_id(r: &mut Reader<'_, BigEndian>) -> DecodeResult<OrderId> {
    Ok(OrderId(r.u32()? as u64))
}

fn read_option(r: &mut Reader<'_, BigEndian>) -> DecodeResult<OptionId> {
    Ok(OptionId(r.u32()? as u64))
}

impl Message {
    pub fn msg_type(&self) -> u8 {
        match self {
            Message::Seconds { .. } => b'T',
            Message::SystemEvent { .. } => b'S',
            Message::OptionDirectory(_) => b'R',
            Message::TradingAction { .. } => b'H',
            Message::OptionOpen { .. } => b'O',
            Message::AddOrder(m) => m.msg_type,
            Message::AddQuote(m) => m.msg_type,
            Message::SingleSideExecuted(_) => b'E',
            Message::SingleSideExecutedWithPrice(_) => b'C',
            Message::OrderCancel(_) => b'X',
            Message::SingleSideReplace(m) => m.msg_type,
            Message::SingleSideDelete { .. } => b'D',
            Message::SingleSideUpdate(_) => b'G',
            Message::QuoteReplace(m) => m.msg_type,
            Message::QuoteDelete(_) => b'Y',
            Message::BlockSingleSideDelete(_) => b'Z',
            Message::OptionsTrade(_) => b'P',
            Message::CrossTrade(_) => b'Q',
            Message::BrokenTrade { .. } => b'B',
            Message::Noii(_) => b'I',
            Message::Unknown { msg_type } => *msg_type,
        }
    }

    /// Decode one ITTO message in place.
    ///
    /// The block-delete reference list keeps its allocation when this value
    /// is reused for another block delete.
    pub fn decode(&mut self, data: &[u8]) -> DecodeResult<()> {
        let mut r = Reader::<BigEndian>::new(data);
        let msg_type = r.u8()?;
        if msg_type == b'T' {
            *self = Message::Seconds { second: r.u32()? };
            return Ok(());
        }
        let timestamp = r.u32()?;

        let decoded = match msg_type {
            b'S' => Message::SystemEvent {
                timestamp,
                event_code: r.u8()?,
            },
            b'R' => Message::OptionDirectory(OptionDirectory {
                timestamp,
                option: read_option(&mut r)?,
                symbol: r.bytes()?,
                expiration: r.bytes()?,
                strike: r.u32()? as Price,
                option_type: r.u8()?,
                source: r.u8()?,
                underlying: r.bytes()?,
                closing_type: r.u8()?,
                tradable: r.u8()?,
                mpv: r.u8()?,
            }),
            b'H' => Message::TradingAction {
                timestamp,
                option: read_option(&mut r)?,
                state: r.u8()?,
            },
            b'O' => Message::OptionOpen {
                timestamp,
                option: read_option(&mut r)?,
                open_state: r.u8()?,
            },
            b'a' | b'A' => {
                let wide = msg_type == b'A';
                let order_id = read_order_id(&mut r)?;
                let side = read_side(&mut r)?;
                let option = read_option(&mut r)?;
                let price = r.price(wide)?;
                let size = r.size(wide)?;
                Message::AddOrder(AddOrder {
                    msg_type,
                    timestamp,
                    option,
                    order: OrderSide { order_id, side, price, size },
                })
            }
            b'j' | b'J' => {
                let wide = msg_type == b'J';
                let bid_id = read_order_id(&mut r)?;
                let ask_id = read_order_id(&mut r)?;
                let option = read_option(&mut r)?;
                let bid = OrderSide {
                    order_id: bid_id,
                    side: Side::Bid,
                    price: r.price(wide)?,
                    size: r.size(wide)?,
                };
                let ask = OrderSide {
                    order_id: ask_id,
                    side: Side::Ask,
                    price: r.price(wide)?,
                    size: r.size(wide)?,
                };
                Message::AddQuote(AddQuote { msg_type, timestamp, option, bid, ask })
            }
            b'E' => Message::SingleSideExecuted(SingleSideExecuted {
                timestamp,
                order_id: read_order_id(&mut r)?,
                executed: r.u32()?,
                cross_number: r.u32()?,
                match_number: r.u32()?,
            }),
            b'C' => Message::SingleSideExecutedWithPrice(SingleSideExecutedWithPrice {
                timestamp,
                order_id: read_order_id(&mut r)?,
                cross_number: r.u32()?,
                match_number: r.u32()?,
                printable: r.u8()?,
                price: r.price(true)?,
                size: r.u32()?,
            }),
            b'X' => Message::OrderCancel(OrderCancel {
                timestamp,
                order_id: read_order_id(&mut r)?,
                cancelled: r.u32()?,
            }),
            b'u' | b'U' => {
                let wide = msg_type == b'U';
                let orig_id = read_order_id(&mut r)?;
                let order_id = read_order_id(&mut r)?;
                let price = r.price(wide)?;
                let size = r.size(wide)?;
                Message::SingleSideReplace(SingleSideReplace {
                    msg_type,
                    timestamp,
                    replace: ReplaceSide {
                        orig_id,
                        order_id,
                        side: Side::Unknown,
                        price,
                        size,
                    },
                })
            }
            b'D' => Message::SingleSideDelete {
                timestamp,
                order_id: read_order_id(&mut r)?,
            },
            b'G' => Message::SingleSideUpdate(SingleSideUpdate {
                timestamp,
                order_id: read_order_id(&mut r)?,
                reason: r.u8()?,
                price: r.price(true)?,
                size: r.u32()?,
            }),
            b'k' | b'K' => {
                let wide = msg_type == b'K';
                let orig_bid = read_order_id(&mut r)?;
                let new_bid = read_order_id(&mut r)?;
                let orig_ask = read_order_id(&mut r)?;
                let new_ask = read_order_id(&mut r)?;
                let bid = ReplaceSide {
                    orig_id: orig_bid,
                    order_id: new_bid,
                    side: Side::Bid,
                    price: r.price(wide)?,
                    size: r.size(wide)?,
                };
                let ask = ReplaceSide {
                    orig_id: orig_ask,
                    order_id: new_ask,
                    side: Side::Ask,
                    price: r.price(wide)?,
                    size: r.size(wide)?,
                };
                Message::QuoteReplace(QuoteReplace { msg_type, timestamp, bid, ask })
            }
            b'Y' => Message::QuoteDelete(QuoteDelete {
                timestamp,
                bid_order_id: read_order_id(&mut r)?,
                ask_order_id: read_order_id(&mut r)?,
            }),
            b'Z' => {
                let mut order_ids = match self {
                    Message::BlockSingleSideDelete(m) => std::mem::take(&mut m.order_ids),
                    _ => Vec::new(),
                };
                order_ids.clear();
                // bounded by the declared count, not by what is left in the buffer
                let count = r.u16()? as usize;
                for _ in 0..count {
                    order_ids.push(read_order_id(&mut r)?);
                }
                Message::BlockSingleSideDelete(BlockSingleSideDelete { timestamp, order_ids })
            }
            b'P' => Message::OptionsTrade(OptionsTrade {
                timestamp,
                side: read_side(&mut r)?,
                option: read_option(&mut r)?,
                cross_number: r.u32()?,
                match_number: r.u32()?,
                price: r.price(true)?,
                size: r.u32()?,
            }),
            b'Q' => Message::CrossTrade(CrossTrade {
                timestamp,
                option: read_option(&mut r)?,
                cross_number: r.u32()?,
                match_number: r.u32()?,
                cross_type: r.u8()?,
                price: r.price(true)?,
                size: r.u32()?,
            }),
            b'B' => Message::BrokenTrade {
                timestamp,
                cross_number: r.u32()?,
                match_number: r.u32()?,
            },
            b'I' => Message::Noii(Noii {
                timestamp,
                auction_id: r.u32()?,
                auction_type: r.u8()?,
                paired: r.u32()?,
                imbalance_direction: r.u8()?,
                option: read_option(&mut r)?,
                imbalance_price: r.price(true)?,
                imbalance_volume: r.u32()?,
                customer_firm: r.u8()?,
            }),
            other => Message::Unknown { msg_type: other },
        };
        *self = decoded;
        Ok(())
    }
}
