/// Uniform order operations
///
/// Every feed is reduced to five operations before it touches the order
/// database or the book. Order-based feeds (ITTO, PITCH) produce Add, Remove,
/// Update and Replace keyed by session and order id; top-of-market feeds
/// (TOM) produce absolute Top levels keyed by option.

use crate::packet::{itto, pitch, tom, Message};
use crate::protocol::{OptionId, OrderId, Price, Side, Size};
use crate::session::SessionId;
use crate::subscr::Subscription;
use tracing::warn;

/// Resting order as the order database keeps it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub option: OptionId,
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub size: Size,
}

/// Absolute size of one top-of-market level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Top {
    pub option: OptionId,
    pub side: Side,
    pub price: Price,
    pub size: Size,
}

impl Top {
    pub fn is_valid(&self) -> bool {
        self.option.is_valid() && self.side.is_known() && self.price != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add {
        session: SessionId,
        order: Order,
    },
    Remove {
        session: SessionId,
        order_id: OrderId,
    },
    /// Relative size change
    Update {
        session: SessionId,
        order_id: OrderId,
        delta: i64,
    },
    /// Remove `orig_id` and add `order_id` in one step. Option and side come
    /// from the original order; a known `side` must match it.
    Replace {
        session: SessionId,
        orig_id: OrderId,
        order_id: OrderId,
        side: Side,
        price: Price,
        size: Size,
    },
    Top(Top),
}

fn add(session: SessionId, option: OptionId, o: &itto::OrderSide, out: &mut Vec<Operation>) {
    out.push(Operation::Add {
        session,
        order: Order {
            option,
            order_id: o.order_id,
            side: o.side,
            price: o.price,
            size: o.size,
        },
    });
}

fn replace(session: SessionId, r: &itto::ReplaceSide, out: &mut Vec<Operation>) {
    out.push(Operation::Replace {
        session,
        orig_id: r.orig_id,
        order_id: r.order_id,
        side: r.side,
        price: r.price,
        size: r.size,
    });
}

fn top(subscr: &Subscription, option: OptionId, q: &tom::TopQuote) -> Operation {
    Operation::Top(Top {
        option: subscr.filter(option),
        side: q.side,
        price: q.price,
        size: q.size,
    })
}

fn itto_operations(session: SessionId, msg: &itto::Message, subscr: &Subscription, out: &mut Vec<Operation>) {
    use itto::Message as M;
    let update = |order_id, delta: Size| Operation::Update {
        session,
        order_id,
        delta: -(delta as i64),
    };
    let remove = |order_id| Operation::Remove { session, order_id };

    match msg {
        M::AddOrder(m) => add(session, subscr.filter(m.option), &m.order, out),
        M::AddQuote(m) => {
            let option = subscr.filter(m.option);
            add(session, option, &m.bid, out);
            add(session, option, &m.ask, out);
        }
        M::SingleSideExecuted(m) => out.push(update(m.order_id, m.executed)),
        M::SingleSideExecutedWithPrice(m) => out.push(update(m.order_id, m.size)),
        M::OrderCancel(m) => out.push(update(m.order_id, m.cancelled)),
        M::SingleSideReplace(m) => replace(session, &m.replace, out),
        M::SingleSideDelete { order_id, .. } => out.push(remove(*order_id)),
        M::SingleSideUpdate(m) => out.push(Operation::Replace {
            session,
            orig_id: m.order_id,
            order_id: m.order_id,
            side: Side::Unknown,
            price: m.price,
            size: m.size,
        }),
        M::QuoteReplace(m) => {
            replace(session, &m.bid, out);
            replace(session, &m.ask, out);
        }
        M::QuoteDelete(m) => {
            out.push(remove(m.bid_order_id));
            out.push(remove(m.ask_order_id));
        }
        M::BlockSingleSideDelete(m) => out.extend(m.order_ids.iter().map(|&id| remove(id))),
        M::Seconds { .. }
        | M::SystemEvent { .. }
        | M::OptionDirectory(_)
        | M::TradingAction { .. }
        | M::OptionOpen { .. }
        | M::OptionsTrade(_)
        | M::CrossTrade(_)
        | M::BrokenTrade { .. }
        | M::Noii(_) => {}
        M::Unknown { msg_type } => warn!(feed = "itto", msg_type = *msg_type, "unknown message type"),
    }
}

fn pitch_operations(session: SessionId, msg: &pitch::Message, subscr: &Subscription, out: &mut Vec<Operation>) {
    use pitch::Message as M;
    let update = |order_id, delta: Size| Operation::Update {
        session,
        order_id,
        delta: -(delta as i64),
    };

    match msg {
        M::AddOrder(m) => out.push(Operation::Add {
            session,
            order: Order {
                option: subscr.filter(m.option),
                order_id: m.order_id,
                side: m.side,
                price: m.price,
                size: m.size,
            },
        }),
        M::OrderExecuted(m) => out.push(update(m.order_id, m.executed)),
        M::OrderExecutedAtPriceSize(m) => out.push(update(m.order_id, m.executed)),
        M::ReduceSize(m) => out.push(update(m.order_id, m.cancelled)),
        M::ModifyOrder(m) => out.push(Operation::Replace {
            session,
            orig_id: m.order_id,
            order_id: m.order_id,
            side: Side::Unknown,
            price: m.price,
            size: m.size,
        }),
        M::DeleteOrder { order_id, .. } => out.push(Operation::Remove {
            session,
            order_id: *order_id,
        }),
        M::Time { .. }
        | M::Trade(_)
        | M::TradeBreak { .. }
        | M::EndOfSession { .. }
        | M::SymbolMapping(_)
        | M::TradingStatus(_)
        | M::UnitClear { .. }
        | M::Auction(_) => {}
        M::Unknown { msg_type } => warn!(feed = "pitch", msg_type = *msg_type, "unknown message type"),
    }
}

fn tom_operations(msg: &tom::Message, subscr: &Subscription, out: &mut Vec<Operation>) {
    use tom::Message as M;
    match msg {
        M::TopOfMarket(m) => out.push(top(subscr, m.option, &m.quote)),
        M::DoubleSidedTop(m) => {
            out.push(top(subscr, m.option, &m.bid));
            out.push(top(subscr, m.option, &m.ask));
        }
        M::SystemTime { .. }
        | M::SystemState { .. }
        | M::SeriesUpdate(_)
        | M::UnderlyingTradingStatus(_)
        | M::LastSale(_)
        | M::TradeCancel(_) => {}
        M::Unknown { msg_type } => warn!(feed = "tom", msg_type = *msg_type, "unknown message type"),
    }
}

/// Appends the operations `msg` implies to `out`.
pub fn operations_for(session: SessionId, msg: &Message, subscr: &Subscription, out: &mut Vec<Operation>) {
    match msg {
        Message::Itto(m) => itto_operations(session, m, subscr, out),
        Message::Pitch(m) => pitch_operations(session, m, subscr, out),
        Message::Tom(m) => tom_operations(m, subscr, out),
    }
}
