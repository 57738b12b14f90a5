//! Format pattern rendering
//!
//! Implements the fixed pattern sets the checker admits: date patterns
//! on date text (`YYYY-MM-DD`), numeric patterns on int and decimal.
//! Pattern/type mismatches at runtime are `runtime.bad_cast`; the
//! checker prevents them in compiled programs.

use crate::error::{ErrorKind, RuntimeError};
use crate::value::Value;
use droe_core::constant::decimal_to_string;

const MONTHS_SHORT: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const MONTHS_LONG: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Apply a format pattern to a value, producing text.
pub fn apply_pattern(value: &Value, pattern: &str, at: usize) -> Result<String, RuntimeError> {
    match (value, pattern) {
        (Value::Int(v), "#,##0") => Ok(group_thousands(&v.to_string())),
        (Value::Int(v), "0000") => Ok(zero_pad(*v, 4)),
        (Value::Int(v), "hex") => Ok(if *v < 0 {
            format!("-{:x}", (*v as i64).unsigned_abs())
        } else {
            format!("{:x}", v)
        }),
        (Value::Decimal(v), "0.00") => Ok(decimal_to_string(*v)),
        (Value::Decimal(v), "#,##0.00") => Ok(group_decimal(*v)),
        (Value::Decimal(v), "$0.00") => Ok(format!("${}", decimal_to_string(*v))),
        (Value::Text(s), _) => format_date(s, pattern, at),
        _ => Err(RuntimeError::new(
            ErrorKind::BadCast,
            format!("pattern \"{}\" does not apply to {}", pattern, value.type_name()),
            at,
        )),
    }
}

/// Dates are carried as `YYYY-MM-DD` text.
fn format_date(text: &str, pattern: &str, at: usize) -> Result<String, RuntimeError> {
    let bad = |msg: String| RuntimeError::new(ErrorKind::BadCast, msg, at);
    let mut parts = text.splitn(3, '-');
    let year: i32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| bad(format!("'{}' is not a date", text)))?;
    let month: usize = parts
        .next()
        .and_then(|p| p.parse().ok())
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| bad(format!("'{}' is not a date", text)))?;
    let day: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .filter(|d| (1..=31).contains(d))
        .ok_or_else(|| bad(format!("'{}' is not a date", text)))?;

    match pattern {
        "MM/dd/yyyy" => Ok(format!("{:02}/{:02}/{:04}", month, day, year)),
        "dd/MM/yyyy" => Ok(format!("{:02}/{:02}/{:04}", day, month, year)),
        "MMM dd, yyyy" => Ok(format!("{} {:02}, {}", MONTHS_SHORT[month - 1], day, year)),
        "long" => Ok(format!("{} {}, {}", MONTHS_LONG[month - 1], day, year)),
        other => Err(bad(format!("unknown date pattern \"{}\"", other))),
    }
}

/// Insert `,` thousands separators into a (possibly signed) digit run.
fn group_thousands(digits: &str) -> String {
    let (sign, body) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };
    let mut out = String::new();
    let len = body.len();
    for (i, c) in body.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("{}{}", sign, out)
}

fn group_decimal(scaled: i64) -> String {
    let sign = if scaled < 0 { "-" } else { "" };
    let abs = scaled.unsigned_abs();
    let whole = (abs / 100).to_string();
    format!("{}{}.{:02}", sign, group_thousands(&whole), abs % 100)
}

fn zero_pad(v: i32, width: usize) -> String {
    if v < 0 {
        format!("-{:0width$}", (i64::from(v)).unsigned_abs(), width = width)
    } else {
        format!("{:0width$}", v, width = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(value: Value, pattern: &str) -> String {
        apply_pattern(&value, pattern, 0).unwrap()
    }

    #[test]
    fn test_decimal_patterns() {
        assert_eq!(fmt(Value::Decimal(123456), "0.00"), "1234.56");
        assert_eq!(fmt(Value::Decimal(123456), "#,##0.00"), "1,234.56");
        assert_eq!(fmt(Value::Decimal(123456), "$0.00"), "$1234.56");
        assert_eq!(fmt(Value::Decimal(-123456), "#,##0.00"), "-1,234.56");
    }

    #[test]
    fn test_int_patterns() {
        assert_eq!(fmt(Value::Int(1234567), "#,##0"), "1,234,567");
        assert_eq!(fmt(Value::Int(-1234567), "#,##0"), "-1,234,567");
        assert_eq!(fmt(Value::Int(7), "0000"), "0007");
        assert_eq!(fmt(Value::Int(255), "hex"), "ff");
        assert_eq!(fmt(Value::Int(-255), "hex"), "-ff");
    }

    #[test]
    fn test_date_patterns() {
        let date = Value::text("2024-01-15");
        assert_eq!(fmt(date.clone(), "MM/dd/yyyy"), "01/15/2024");
        assert_eq!(fmt(date.clone(), "dd/MM/yyyy"), "15/01/2024");
        assert_eq!(fmt(date.clone(), "MMM dd, yyyy"), "Jan 15, 2024");
        assert_eq!(fmt(date, "long"), "January 15, 2024");
    }

    #[test]
    fn test_mismatched_pattern_is_bad_cast() {
        let err = apply_pattern(&Value::Flag(true), "0.00", 3).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadCast);
        assert_eq!(err.at, 3);
    }

    #[test]
    fn test_malformed_date_is_bad_cast() {
        let err = apply_pattern(&Value::text("not-a-date"), "MM/dd/yyyy", 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadCast);
    }

    #[test]
    fn test_group_thousands_boundaries() {
        assert_eq!(group_thousands("1"), "1");
        assert_eq!(group_thousands("999"), "999");
        assert_eq!(group_thousands("1000"), "1,000");
        assert_eq!(group_thousands("1000000"), "1,000,000");
    }
}
