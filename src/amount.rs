//! Fixed-point token amounts with 18 decimals.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of fractional decimals used by the credit token.
pub const TOKEN_DECIMALS: u32 = 18;
const DECIMAL_FACTOR: u128 = 1_000_000_000_000_000_000;

/// Token quantity expressed in base units (`10^-18` of a whole token).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u128);

impl TokenAmount {
    /// Zero tokens.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw base-unit quantity.
    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    /// Amount of whole tokens.
    pub const fn from_whole(tokens: u64) -> Self {
        Self(tokens as u128 * DECIMAL_FACTOR)
    }

    /// Raw base units.
    pub const fn base_units(self) -> u128 {
        self.0
    }

    /// Subtracts `other`, clamping at zero.
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Parses a decimal string such as `"2"` or `"0.25"` into base units.
    pub fn parse_ether(input: &str) -> Result<Self, AmountParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AmountParseError::Empty);
        }
        let (whole, frac) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountParseError::Invalid(trimmed.to_string()));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AmountParseError::Invalid(trimmed.to_string()));
        }
        if frac.len() > TOKEN_DECIMALS as usize {
            return Err(AmountParseError::TooPrecise(trimmed.to_string()));
        }
        let whole_units: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| AmountParseError::Overflow(trimmed.to_string()))?
        };
        let mut frac_units: u128 = 0;
        if !frac.is_empty() {
            let padded = format!("{frac:0<width$}", width = TOKEN_DECIMALS as usize);
            frac_units = padded
                .parse()
                .map_err(|_| AmountParseError::Invalid(trimmed.to_string()))?;
        }
        whole_units
            .checked_mul(DECIMAL_FACTOR)
            .and_then(|w| w.checked_add(frac_units))
            .map(Self)
            .ok_or_else(|| AmountParseError::Overflow(trimmed.to_string()))
    }

    /// Renders the amount rounded half-up to `decimals` fractional digits.
    pub fn format_fixed(self, decimals: u32) -> String {
        let decimals = decimals.min(TOKEN_DECIMALS);
        let step = 10u128.pow(TOKEN_DECIMALS - decimals);
        let rounded = self.0 / step + u128::from(self.0 % step >= step.div_ceil(2) && step > 1);
        let scale = 10u128.pow(decimals);
        let whole = rounded / scale;
        if decimals == 0 {
            return whole.to_string();
        }
        let frac = rounded % scale;
        format!("{whole}.{frac:0width$}", width = decimals as usize)
    }
}

impl fmt::Display for TokenAmount {
    /// Exact decimal rendering with trailing zeros removed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / DECIMAL_FACTOR;
        let frac = self.0 % DECIMAL_FACTOR;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:018}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for TokenAmount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_ether(s)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Whole(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self::parse_ether(&text).map_err(serde::de::Error::custom),
            Raw::Whole(n) => Ok(Self::from_whole(n)),
        }
    }
}

/// Errors raised while parsing a decimal token amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
    /// Empty input.
    #[error("empty amount")]
    Empty,
    /// Input is not a plain decimal number.
    #[error("invalid amount `{0}`")]
    Invalid(String),
    /// More than 18 fractional digits.
    #[error("amount `{0}` has more than 18 decimals")]
    TooPrecise(String),
    /// Value does not fit in 128 bits of base units.
    #[error("amount `{0}` is too large")]
    Overflow(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(
            TokenAmount::parse_ether("2").unwrap().base_units(),
            2_000_000_000_000_000_000
        );
        assert_eq!(
            TokenAmount::parse_ether("0.25").unwrap().base_units(),
            250_000_000_000_000_000
        );
        assert_eq!(
            TokenAmount::parse_ether(".5").unwrap(),
            TokenAmount::parse_ether("0.5").unwrap()
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(TokenAmount::parse_ether(""), Err(AmountParseError::Empty));
        assert!(TokenAmount::parse_ether("1e3").is_err());
        assert!(TokenAmount::parse_ether("-1").is_err());
        assert!(TokenAmount::parse_ether(".").is_err());
        assert!(matches!(
            TokenAmount::parse_ether("0.0000000000000000001"),
            Err(AmountParseError::TooPrecise(_))
        ));
    }

    #[test]
    fn fixed_formatting_rounds() {
        let amount = TokenAmount::parse_ether("3.14159").unwrap();
        assert_eq!(amount.format_fixed(2), "3.14");
        assert_eq!(TokenAmount::parse_ether("0.005").unwrap().format_fixed(2), "0.01");
        assert_eq!(TokenAmount::ZERO.format_fixed(2), "0.00");
        assert_eq!(TokenAmount::from_whole(7).format_fixed(0), "7");
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(TokenAmount::parse_ether("1.50").unwrap().to_string(), "1.5");
        assert_eq!(TokenAmount::from_whole(3).to_string(), "3");
    }

    #[test]
    fn deserializes_strings_and_integers() {
        let a: TokenAmount = serde_json::from_str("\"0.5\"").unwrap();
        let b: TokenAmount = serde_json::from_str("2").unwrap();
        assert_eq!(a.base_units(), 500_000_000_000_000_000);
        assert_eq!(b, TokenAmount::from_whole(2));
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"0.5\"");
    }
}
