use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::ConfigError;

// Every cent count below this converts to an f64 whose shortest representation is the decimal
// itself, so the JSON number on the wire never drifts from the configured value.
const MAX_CENTS: i64 = 99_999_999_999_999;

/// Non-negative money amount with two fixed decimal places, stored as whole cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    cents: i64,
}

impl Amount {
    pub fn from_cents(cents: i64) -> Result<Self, ConfigError> {
        if !(0..=MAX_CENTS).contains(&cents) {
            return Err(ConfigError::InvalidAmount {
                value: cents.to_string(),
                reason: "out of range",
            });
        }
        Ok(Self { cents })
    }

    #[must_use]
    pub fn cents(self) -> i64 {
        self.cents
    }

    fn as_f64(self) -> f64 {
        self.cents as f64 / 100.0
    }
}

impl FromStr for Amount {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ConfigError::InvalidAmount {
            value: raw.to_string(),
            reason,
        };

        let s = raw.trim();
        if s.starts_with('-') {
            return Err(invalid("must not be negative"));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected a decimal number such as `120.50`"));
        }
        if frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("at most two decimal places are allowed"));
        }
        if s.contains('.') && frac.is_empty() {
            return Err(invalid("missing digits after the decimal point"));
        }

        let whole: i64 = whole.parse().map_err(|_| invalid("out of range"))?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid("out of range"))? * 10,
            _ => frac.parse().map_err(|_| invalid("out of range"))?,
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .ok_or_else(|| invalid("out of range"))?;
        if cents > MAX_CENTS {
            return Err(invalid("out of range"));
        }
        Ok(Self { cents })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

/// Serialized as a JSON number (`120.5`), never as a string.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}
