//! Monetary amounts

use std::fmt;

/// Signed amount in the smallest unit
pub type Amount = i64;

/// One coin
pub const COIN: Amount = 100_000_000;

/// Upper bound on any single amount or sum of amounts
pub const MAX_MONEY: Amount = 21_000_000 * COIN;

/// Whether `value` is a valid amount (`0 ..= MAX_MONEY`)
pub fn money_range(value: Amount) -> bool {
    (0..=MAX_MONEY).contains(&value)
}

/// Render an amount as a decimal coin value, keeping at least two decimals.
pub fn format_money(amount: Amount) -> String {
    let abs = amount.unsigned_abs();
    let coin = COIN.unsigned_abs();
    let mut s = format!("{}.{:08}", abs / coin, abs % coin);

    let trailing = s
        .bytes()
        .rev()
        .take(6)
        .take_while(|b| *b == b'0')
        .count();
    s.truncate(s.len() - trailing);

    if amount < 0 {
        s.insert(0, '-');
    }
    s
}

/// Amount that displays as a coin value, for error messages and logs
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(pub Amount);

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_money(self.0))
    }
}

impl From<Amount> for Money {
    fn from(amount: Amount) -> Self {
        Money(amount)
    }
}
