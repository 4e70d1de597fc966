use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Fractional digits carried by balances and transfer amounts.
pub const MONEY_SCALE: u32 = 2;

pub const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£'];
pub const CURRENCY_WORDS: &[&str] = &[
    "dollars", "dollar", "usd", "eur", "euro", "euros", "gbp", "pounds", "bucks",
];

// Plain digits, or comma-grouped thousands, with an optional fraction.
static AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?$").expect("valid amount regex")
});

/// Parses a positive amount such as `$1,250.50`, `500 dollars` or `40`.
/// One leading currency symbol and one trailing currency word are allowed;
/// any other character (signs, exponents, suffixes like `k`, colons) makes
/// the span unusable.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    let unsigned = trimmed
        .strip_prefix(CURRENCY_SYMBOLS)
        .unwrap_or(trimmed)
        .trim_start();
    let number = match unsigned.rsplit_once(char::is_whitespace) {
        Some((number, unit)) if CURRENCY_WORDS.contains(&unit.to_lowercase().as_str()) => {
            number.trim_end()
        }
        _ => unsigned,
    };

    if !AMOUNT.is_match(number) {
        return None;
    }

    number
        .replace(',', "")
        .parse::<Decimal>()
        .ok()
        .map(|value| value.normalize())
        .filter(|value| *value > Decimal::ZERO)
}

/// Converts to integer cents; `None` when the value has sub-cent precision or
/// does not fit in an `i64`.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    let scaled = amount.checked_mul(Decimal::ONE_HUNDRED)?;
    if !scaled.fract().is_zero() {
        return None;
    }
    scaled.to_i64()
}

pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, MONEY_SCALE)
}

pub fn is_valid_transfer_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && to_minor_units(amount).is_some()
}

pub fn format_money(amount: Decimal) -> String {
    let mut rounded = amount.round_dp(MONEY_SCALE);
    rounded.rescale(MONEY_SCALE);
    format!("${}", rounded)
}
