//! Bit-pattern and timestamp conversions shared by the record scanner,
//! delta decoder, and sample reconstructor (§4.B).

use chrono::{DateTime, TimeZone, Utc};

/// Reinterprets a float's 8-byte little-endian IEEE-754 bit pattern as a
/// signed 64-bit integer. Bit-exact, including NaN payloads and signed zero.
pub fn normalize_float(value: f64) -> i64 {
    value.to_bits() as i64
}

/// Inverse of [`normalize_float`].
pub fn restore_float(value: i64) -> f64 {
    f64::from_bits(value as u64)
}

/// Whole milliseconds since the Unix epoch, truncating toward negative
/// infinity (matches `chrono`'s `timestamp_millis`, which already floors).
pub fn epoch_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Inverse of [`epoch_ms`].
pub fn ms_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(|| Utc.timestamp_nanos(0))
}
