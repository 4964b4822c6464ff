//! Culture-invariant text formats for primitive wire values.
//!
//! Floats use fixed-digit scientific notation (8 fractional digits for `f32`,
//! 16 for `f64`), which is enough to round-trip every finite value exactly.
//! Date-times always carry exactly three fractional-second digits.

use chrono::{NaiveDateTime, Timelike};
use rust_decimal::Decimal;

use super::error::{Result, WirecallError};

const POSITIVE_INFINITY: &str = "Infinity";
const NEGATIVE_INFINITY: &str = "-Infinity";
const NOT_A_NUMBER: &str = "NaN";

pub const TRUE_LITERAL: &str = "true";
pub const FALSE_LITERAL: &str = "false";

const DATE_TIME_SECONDS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_TIME_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub fn format_f32(value: f32) -> String {
    format_float(value.is_nan(), value.is_infinite(), value.is_sign_negative(), || {
        format!("{:.8e}", value)
    })
}

pub fn format_f64(value: f64) -> String {
    format_float(value.is_nan(), value.is_infinite(), value.is_sign_negative(), || {
        format!("{:.16e}", value)
    })
}

fn format_float(
    is_nan: bool,
    is_infinite: bool,
    is_negative: bool,
    finite: impl FnOnce() -> String,
) -> String {
    if is_nan {
        NOT_A_NUMBER.to_string()
    } else if is_infinite && is_negative {
        NEGATIVE_INFINITY.to_string()
    } else if is_infinite {
        POSITIVE_INFINITY.to_string()
    } else {
        finite()
    }
}

pub fn parse_f32(text: &str) -> Result<f32> {
    match text {
        POSITIVE_INFINITY => Ok(f32::INFINITY),
        NEGATIVE_INFINITY => Ok(f32::NEG_INFINITY),
        NOT_A_NUMBER => Ok(f32::NAN),
        _ => text
            .parse::<f32>()
            .map_err(|_| WirecallError::invalid_value("f32", text)),
    }
}

pub fn parse_f64(text: &str) -> Result<f64> {
    match text {
        POSITIVE_INFINITY => Ok(f64::INFINITY),
        NEGATIVE_INFINITY => Ok(f64::NEG_INFINITY),
        NOT_A_NUMBER => Ok(f64::NAN),
        _ => text
            .parse::<f64>()
            .map_err(|_| WirecallError::invalid_value("f64", text)),
    }
}

pub fn format_bool(value: bool) -> String {
    let literal = if value { TRUE_LITERAL } else { FALSE_LITERAL };
    literal.to_string()
}

pub fn parse_bool(text: &str) -> Result<bool> {
    if text.eq_ignore_ascii_case(TRUE_LITERAL) {
        Ok(true)
    } else if text.eq_ignore_ascii_case(FALSE_LITERAL) {
        Ok(false)
    } else {
        Err(WirecallError::invalid_value("bool", text))
    }
}

pub fn format_decimal(value: &Decimal) -> String {
    value.to_string()
}

pub fn parse_decimal(text: &str) -> Result<Decimal> {
    Decimal::from_str_exact(text).map_err(|_| WirecallError::invalid_value("decimal", text))
}

/// Formats with millisecond resolution, always emitting three fractional
/// digits, including `.000` when the millisecond component is zero.
///
/// Sub-millisecond precision is truncated, not rounded, so such values do
/// not survive a round trip.
pub fn format_date_time(value: &NaiveDateTime) -> String {
    let millis = value.nanosecond() / 1_000_000 % 1000;
    format!("{}.{:03}", value.format(DATE_TIME_SECONDS_FORMAT), millis)
}

pub fn parse_date_time(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, DATE_TIME_PARSE_FORMAT)
        .map_err(|_| WirecallError::invalid_value("datetime", text))
}

pub fn parse_char(text: &str) -> Result<char> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(WirecallError::invalid_value("char", text)),
    }
}

pub fn parse_integer<T: std::str::FromStr>(type_name: &str, text: &str) -> Result<T> {
    text.trim()
        .parse::<T>()
        .map_err(|_| WirecallError::invalid_value(type_name, text))
}
