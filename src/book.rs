/// Aggregated price-level books, one per option
///
/// Each option keeps a single BTreeMap holding both sides. Keys are side
/// normalised (bids store the complemented price) so one ascending traversal
/// walks bids best-first, then asks best-first.

use crate::operation::{Order, Top};
use crate::order_db::Applied;
use crate::protocol::{OptionId, Price, PriceLevel, Side};
use crate::sim::SimError;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct LevelKey {
    side: u8,
    rank: u64,
}

impl LevelKey {
    fn new(side: Side, price: Price) -> Self {
        match side {
            Side::Bid => LevelKey { side: 0, rank: !price },
            _ => LevelKey { side: 1, rank: price },
        }
    }

    fn price(&self) -> Price {
        if self.side == 0 {
            !self.rank
        } else {
            self.rank
        }
    }

    fn side_range(side: Side) -> std::ops::RangeInclusive<LevelKey> {
        let tag = if side == Side::Bid { 0 } else { 1 };
        LevelKey { side: tag, rank: 0 }..=LevelKey { side: tag, rank: u64::MAX }
    }
}

#[derive(Debug, Clone, Default)]
struct OptionBook {
    levels: BTreeMap<LevelKey, u64>,
    counts: [usize; 2],
}

impl OptionBook {
    fn count(&self, side: Side) -> usize {
        self.counts[(side != Side::Bid) as usize]
    }

    fn count_mut(&mut self, side: Side) -> &mut usize {
        &mut self.counts[(side != Side::Bid) as usize]
    }

    fn open_level(&mut self, option: OptionId, side: Side, max_levels: usize) -> Result<(), SimError> {
        if max_levels != 0 && self.count(side) >= max_levels {
            return Err(SimError::LevelCapacity {
                option,
                side,
                max: max_levels,
            });
        }
        *self.count_mut(side) += 1;
        Ok(())
    }

    fn close_level(&mut self, key: &LevelKey, side: Side) {
        if self.levels.remove(key).is_some() {
            *self.count_mut(side) -= 1;
        }
    }

    fn add_delta(&mut self, option: OptionId, side: Side, price: Price, delta: i64, max_levels: usize) -> Result<(), SimError> {
        let key = LevelKey::new(side, price);
        let current = self.levels.get(&key).copied().unwrap_or(0);
        let size = current as i64 + delta;
        if size < 0 {
            return Err(SimError::NegativeLevel {
                option,
                side,
                price,
                size,
            });
        }
        if size == 0 {
            self.close_level(&key, side);
            return Ok(());
        }
        if current == 0 {
            self.open_level(option, side, max_levels)?;
        }
        self.levels.insert(key, size as u64);
        Ok(())
    }

    /// Absolute replace; size 0 deletes the level
    fn set_level(&mut self, top: &Top, max_levels: usize) -> Result<(), SimError> {
        let key = LevelKey::new(top.side, top.price);
        if top.size == 0 {
            self.close_level(&key, top.side);
            return Ok(());
        }
        if !self.levels.contains_key(&key) {
            self.open_level(top.option, top.side, max_levels)?;
        }
        self.levels.insert(key, top.size as u64);
        Ok(())
    }
}

/// Side of one option touched by an update
pub type BookKey = (OptionId, Side);

/// Book sides one applied operation changed. A replace can land the new
/// order on another option or side than the one it removed, so up to two.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Touched([Option<BookKey>; 2]);

impl Touched {
    fn mark(&mut self, key: BookKey, changed: bool) {
        if !changed || self.0.contains(&Some(key)) {
            return;
        }
        if let Some(slot) = self.0.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0[0].is_none()
    }

    pub fn keys(self) -> impl Iterator<Item = BookKey> {
        self.0.into_iter().flatten()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Book {
    options: HashMap<OptionId, OptionBook>,
    /// Levels per side, 0 = unlimited
    max_levels: usize,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level_limit(max_levels: usize) -> Self {
        Book {
            max_levels,
            ..Self::default()
        }
    }

    fn bookable(option: OptionId, side: Side, price: Price) -> bool {
        option.is_valid() && side.is_known() && price != 0
    }

    fn add_delta(&mut self, option: OptionId, side: Side, price: Price, delta: i64) -> Result<bool, SimError> {
        if delta == 0 || !Self::bookable(option, side, price) {
            return Ok(false);
        }
        let max_levels = self.max_levels;
        let book = self.options.entry(option).or_default();
        let result = book.add_delta(option, side, price, delta, max_levels);
        self.prune(option);
        result.map(|()| true)
    }

    fn set_level(&mut self, top: &Top) -> Result<bool, SimError> {
        if !top.is_valid() {
            return Ok(false);
        }
        let max_levels = self.max_levels;
        let book = self.options.entry(top.option).or_default();
        let result = book.set_level(top, max_levels);
        self.prune(top.option);
        result.map(|()| true)
    }

    fn prune(&mut self, option: OptionId) {
        if self.options.get(&option).is_some_and(|b| b.levels.is_empty()) {
            self.options.remove(&option);
        }
    }

    fn order_delta(&mut self, order: &Order, delta: i64) -> Result<bool, SimError> {
        self.add_delta(order.option, order.side, order.price, delta)
    }

    /// Applies a resolved operation and reports the book sides it changed.
    pub fn apply(&mut self, applied: &Applied) -> Result<Touched, SimError> {
        let key = |o: &Order| (o.option, o.side);
        let mut touched = Touched::default();
        match applied {
            Applied::Added(o) => touched.mark(key(o), self.order_delta(o, o.size as i64)?),
            Applied::Removed(o) => touched.mark(key(o), self.order_delta(o, -(o.size as i64))?),
            Applied::Updated { original, delta } => touched.mark(key(original), self.order_delta(original, *delta)?),
            Applied::Replaced { original, added } => {
                touched.mark(key(original), self.order_delta(original, -(original.size as i64))?);
                touched.mark(key(added), self.order_delta(added, added.size as i64)?);
            }
            Applied::Top(top) => touched.mark((top.option, top.side), self.set_level(top)?),
            Applied::NotFound(_) => {}
        }
        Ok(touched)
    }

    /// Best `n` levels of one side, best first. `n == 0` returns all.
    pub fn top(&self, option: OptionId, side: Side, n: usize) -> Vec<PriceLevel> {
        if !side.is_known() {
            return Vec::new();
        }
        let Some(book) = self.options.get(&option) else {
            return Vec::new();
        };
        let take = if n == 0 { usize::MAX } else { n };
        book.levels
            .range(LevelKey::side_range(side))
            .take(take)
            .map(|(k, &size)| PriceLevel { price: k.price(), size })
            .collect()
    }

    pub fn best(&self, option: OptionId, side: Side) -> Option<PriceLevel> {
        self.top(option, side, 1).into_iter().next()
    }

    /// Both sides in one pass: bids best-first followed by asks best-first
    pub fn levels(&self, option: OptionId) -> impl Iterator<Item = (Side, PriceLevel)> + '_ {
        self.options.get(&option).into_iter().flat_map(|b| {
            b.levels.iter().map(|(k, &size)| {
                let side = if k.side == 0 { Side::Bid } else { Side::Ask };
                (side, PriceLevel { price: k.price(), size })
            })
        })
    }

    pub fn level_count(&self, option: OptionId, side: Side) -> usize {
        self.options.get(&option).map_or(0, |b| b.count(side))
    }

    /// Options with at least one level
    pub fn option_count(&self) -> usize {
        self.options.len()
    }
}
