/// Domain types shared by every feed codec and the book simulator
///
/// Prices are carried as u64 fixed-point with 4 implied decimals, whatever
/// scale the wire used. Compact (2-decimal) wire prices are multiplied by 100
/// on decode; no floating point is involved anywhere on the data path.

use std::fmt;

/// Number of price units per 1.0
pub const PRICE_SCALE: u64 = 10_000;

/// Fixed-point price, 4 implied decimals
pub type Price = u64;

/// Order or level size in contracts
pub type Size = u32;

/// Instrument identifier. Zero means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptionId(pub u64);

impl OptionId {
    pub const UNKNOWN: OptionId = OptionId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Packs a PITCH symbol of up to 8 characters big-endian. Trailing
    /// spaces are padding, so `b"SPY   "` and `b"SPY"` are the same option.
    pub fn from_symbol(symbol: &[u8]) -> Self {
        let len = symbol.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
        OptionId(symbol[..len].iter().take(8).fold(0u64, |v, &b| (v << 8) | b as u64))
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Order reference number. 32 bit on ITTO, 64 bit on PITCH.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Side {
    Bid,
    Ask,
    #[default]
    Unknown,
}

impl Side {
    /// Maps the `B`/`S` market side byte used by ITTO and PITCH.
    pub fn from_wire(v: u8) -> Self {
        match v {
            b'B' => Side::Bid,
            b'S' => Side::Ask,
            _ => Side::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        self != Side::Unknown
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
            Side::Unknown => "?",
        };
        f.write_str(s)
    }
}

/// Normalise a 2-decimal wire price
#[inline]
pub fn price_from_2dp(raw: u64) -> Price {
    raw * 100
}

/// Normalise a 4-decimal wire price
#[inline]
pub fn price_from_4dp(raw: u64) -> Price {
    raw
}

/// Renders a fixed-point price as `units.dddd` without going through floats.
pub fn format_price(price: Price) -> String {
    format!("{}.{:04}", price / PRICE_SCALE, price % PRICE_SCALE)
}

/// One aggregated price level of a book side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Price,
    pub size: u64,
}

impl fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", format_price(self.price), self.size)
    }
}
