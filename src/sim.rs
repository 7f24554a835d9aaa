/// Book simulator
///
/// Turns each decoded message into operations, resolves them against the
/// order database, applies the result to the book and tells observers what
/// happened. Any `SimError` means the replayed state can no longer be
/// trusted and aborts the run.

use crate::book::Book;
use crate::operation::{operations_for, Operation};
use crate::order_db::{Applied, OrderDb};
use crate::packet::Message;
use crate::processor::{Handler, HandlerError, MessageEvent};
use crate::protocol::{OptionId, OrderId, Price, Side, Size};
use crate::session::SessionId;
use crate::stats::LatencyWindow;
use crate::subscr::Subscription;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("order {order_id}: size {size} {delta:+} goes negative")]
    NegativeSize { order_id: OrderId, size: Size, delta: i64 },

    #[error("option {option} {side} level {price} goes negative ({size})")]
    NegativeLevel {
        option: OptionId,
        side: Side,
        price: Price,
        size: i64,
    },

    #[error("replace of unknown order {0}")]
    ReplaceOriginalMissing(OrderId),

    #[error("replace of order {orig_id}: declared {expected}, resting {found}")]
    ReplaceSideMismatch { orig_id: OrderId, expected: Side, found: Side },

    #[error("order capacity {0} exceeded")]
    OrderCapacity(usize),

    #[error("option {option} {side}: level capacity {max} exceeded")]
    LevelCapacity { option: OptionId, side: Side, max: usize },
}

/// Callbacks run inline after every applied operation
pub trait Observer {
    fn on_operation(&mut self, _op: &Operation, _applied: &Applied) {}

    fn on_book_update(&mut self, _book: &Book, _option: OptionId, _side: Side) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub messages: u64,
    pub operations: u64,
    pub not_found: u64,
    pub book_updates: u64,
}

#[derive(Default)]
pub struct Simulator {
    db: OrderDb,
    book: Book,
    subscription: Subscription,
    observers: Vec<Box<dyn Observer>>,
    ops: Vec<Operation>,
    stats: SimStats,
    apply_latencies: LatencyWindow,
}

impl Simulator {
    pub fn new(subscription: Subscription) -> Self {
        Simulator {
            subscription,
            ..Self::default()
        }
    }

    /// 0 leaves the corresponding dimension unbounded.
    pub fn with_limits(subscription: Subscription, max_orders: usize, max_levels: usize) -> Self {
        Simulator {
            db: OrderDb::with_capacity_limit(max_orders),
            book: Book::with_level_limit(max_levels),
            subscription,
            ..Self::default()
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn order_db(&self) -> &OrderDb {
        &self.db
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    pub fn apply_latencies(&self) -> &LatencyWindow {
        &self.apply_latencies
    }

    /// Applies one operation to the order database and the book.
    pub fn apply(&mut self, op: &Operation) -> Result<Applied, SimError> {
        let applied = self.db.apply(op)?;
        self.stats.operations += 1;
        if let Applied::NotFound(order_id) = applied {
            self.stats.not_found += 1;
            debug!(order_id = %order_id, ?op, "order not found");
        }
        let touched = self.book.apply(&applied)?;

        for observer in self.observers.iter_mut() {
            observer.on_operation(op, &applied);
        }
        for (option, side) in touched.keys() {
            self.stats.book_updates += 1;
            for observer in self.observers.iter_mut() {
                observer.on_book_update(&self.book, option, side);
            }
        }
        Ok(applied)
    }

    pub fn process(&mut self, session: SessionId, message: &Message) -> Result<(), SimError> {
        let started = Instant::now();
        self.stats.messages += 1;

        let mut ops = std::mem::take(&mut self.ops);
        ops.clear();
        operations_for(session, message, &self.subscription, &mut ops);
        let result = ops.iter().try_for_each(|op| self.apply(op).map(|_| ()));
        self.ops = ops;

        self.apply_latencies.record(started.elapsed());
        result
    }
}

impl Handler for Simulator {
    fn handle_message(&mut self, event: &MessageEvent<'_>) -> Result<(), HandlerError> {
        self.process(event.session, event.message)?;
        Ok(())
    }
}
