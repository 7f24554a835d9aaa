/// Order database
///
/// Resting orders keyed by (session, order id). Operations resolve against it
/// and come back as `Applied` values carrying the order snapshots the book
/// needs, so the book never looks orders up itself.

use crate::operation::{Operation, Order, Top};
use crate::protocol::OrderId;
use crate::session::SessionId;
use crate::sim::SimError;
use std::collections::HashMap;
use tracing::debug;

/// Operation resolved against the order database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Added(Order),
    Removed(Order),
    /// `original` is the order before the change
    Updated { original: Order, delta: i64 },
    /// `added` has size 0 when the replacement left nothing resting
    Replaced { original: Order, added: Order },
    /// Remove or update of an order the database never saw
    NotFound(OrderId),
    Top(Top),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderDbStats {
    pub count: usize,
    pub peak_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct OrderDb {
    orders: HashMap<(SessionId, OrderId), Order>,
    peak_count: usize,
    /// 0 = unlimited
    max_orders: usize,
}

impl OrderDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(max_orders: usize) -> Self {
        OrderDb {
            max_orders,
            ..Self::default()
        }
    }

    pub fn find(&self, session: SessionId, order_id: OrderId) -> Option<Order> {
        self.orders.get(&(session, order_id)).copied()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn stats(&self) -> OrderDbStats {
        OrderDbStats {
            count: self.orders.len(),
            peak_count: self.peak_count,
        }
    }

    fn insert(&mut self, session: SessionId, order: Order) -> Result<Option<Order>, SimError> {
        let key = (session, order.order_id);
        if self.max_orders != 0 && self.orders.len() >= self.max_orders && !self.orders.contains_key(&key) {
            return Err(SimError::OrderCapacity(self.max_orders));
        }
        let previous = self.orders.insert(key, order);
        self.peak_count = self.peak_count.max(self.orders.len());
        Ok(previous)
    }

    pub fn apply(&mut self, op: &Operation) -> Result<Applied, SimError> {
        match *op {
            Operation::Add { session, order } => match self.insert(session, order)? {
                // A reused id replaces the resting order so the book stays balanced
                Some(previous) => {
                    debug!(session = %session, order_id = %order.order_id, "add over resting order");
                    Ok(Applied::Replaced {
                        original: previous,
                        added: order,
                    })
                }
                None => Ok(Applied::Added(order)),
            },

            Operation::Remove { session, order_id } => Ok(match self.orders.remove(&(session, order_id)) {
                Some(order) => Applied::Removed(order),
                None => Applied::NotFound(order_id),
            }),

            Operation::Update {
                session,
                order_id,
                delta,
            } => {
                let key = (session, order_id);
                let Some(order) = self.orders.get_mut(&key) else {
                    return Ok(Applied::NotFound(order_id));
                };
                let original = *order;
                let size = original.size as i64 + delta;
                if size < 0 {
                    return Err(SimError::NegativeSize {
                        order_id,
                        size: original.size,
                        delta,
                    });
                }
                if size == 0 {
                    self.orders.remove(&key);
                } else {
                    order.size = size as u32;
                }
                Ok(Applied::Updated { original, delta })
            }

            Operation::Replace {
                session,
                orig_id,
                order_id,
                side,
                price,
                size,
            } => {
                let key = (session, orig_id);
                let found = self.orders.get(&key).ok_or(SimError::ReplaceOriginalMissing(orig_id))?.side;
                if side.is_known() && side != found {
                    return Err(SimError::ReplaceSideMismatch {
                        orig_id,
                        expected: side,
                        found,
                    });
                }
                let original = self.orders.remove(&key).ok_or(SimError::ReplaceOriginalMissing(orig_id))?;
                let added = Order {
                    option: original.option,
                    order_id,
                    side: original.side,
                    price,
                    size,
                };
                if size > 0 {
                    self.insert(session, added)?;
                }
                Ok(Applied::Replaced { original, added })
            }

            Operation::Top(top) => Ok(Applied::Top(top)),
        }
    }
}
