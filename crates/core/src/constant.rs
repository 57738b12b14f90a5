//! Constant pool values
//!
//! Owned, serializable values for every literal class the language has,
//! plus format patterns. The VM converts these into runtime values when a
//! `PushConst` executes; the pool itself is immutable after load.

use serde::{Deserialize, Serialize};

/// A tagged constant-pool entry.
///
/// `Decimal` stores the scaled representation (value x 100); `Date` and
/// file paths are carried as text, matching their source-level literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i32),
    Decimal(i64),
    Text(String),
    Flag(bool),
    Date(String),
    /// A format pattern referenced by `Format` instructions
    Pattern(String),
}

impl Constant {
    /// Short tag name used in diagnostics and artifact dumps.
    pub fn tag(&self) -> &'static str {
        match self {
            Constant::Int(_) => "int",
            Constant::Decimal(_) => "decimal",
            Constant::Text(_) => "text",
            Constant::Flag(_) => "flag",
            Constant::Date(_) => "date",
            Constant::Pattern(_) => "pattern",
        }
    }
}

/// Render a scaled decimal with exactly two fractional digits.
///
/// The sign is handled separately so values between -1.00 and 0.00
/// keep their minus sign (`-45` renders as `-0.45`, not `0.45`).
pub fn decimal_to_string(scaled: i64) -> String {
    let sign = if scaled < 0 { "-" } else { "" };
    let abs = scaled.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Decimal(v) => write!(f, "{}", decimal_to_string(*v)),
            Constant::Text(s) | Constant::Date(s) | Constant::Pattern(s) => write!(f, "{}", s),
            Constant::Flag(b) => write!(f, "{}", b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_display_keeps_two_fraction_digits() {
        assert_eq!(Constant::Decimal(310).to_string(), "3.10");
        assert_eq!(Constant::Decimal(-145).to_string(), "-1.45");
        assert_eq!(Constant::Decimal(0).to_string(), "0.00");
    }

    #[test]
    fn test_decimal_display_small_negative_keeps_sign() {
        assert_eq!(decimal_to_string(-45), "-0.45");
        assert_eq!(decimal_to_string(-5), "-0.05");
    }

    #[test]
    fn test_tags() {
        assert_eq!(Constant::Int(1).tag(), "int");
        assert_eq!(Constant::Pattern("0.00".into()).tag(), "pattern");
    }
}
