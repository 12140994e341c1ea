// Order-preserving encodings between floating-point values and same-width
// integers, plus the epoch conversions used by the temporal column lanes.
//
// The sortable mapping flips the sign bit of non-negative floats and all
// bits of negative floats, so that signed integer comparison of the encoded
// values matches IEEE ordering. `-0.0` is canonicalized to `0.0` and every
// NaN to the canonical quiet NaN before encoding; with that, the mapping is
// an exact bijection on the remaining values.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

const F64_PAYLOAD_MASK: i64 = 0x7fff_ffff_ffff_ffff;
const F32_PAYLOAD_MASK: i32 = 0x7fff_ffff;

/// Days from 1970-01-01 back to 0001-01-01 in the proleptic Gregorian
/// calendar, matching `NaiveDate::num_days_from_ce`.
const EPOCH_DAYS_FROM_CE: i64 = 719_163;

#[inline]
pub fn double_to_sortable_long(value: f64) -> i64 {
    let canonical = if value.is_nan() {
        f64::NAN
    } else if value == 0.0 {
        0.0
    } else {
        value
    };
    let bits = canonical.to_bits() as i64;
    bits ^ ((bits >> 63) & F64_PAYLOAD_MASK)
}

#[inline]
pub fn sortable_long_to_double(encoded: i64) -> f64 {
    let bits = encoded ^ ((encoded >> 63) & F64_PAYLOAD_MASK);
    f64::from_bits(bits as u64)
}

#[inline]
pub fn float_to_sortable_int(value: f32) -> i32 {
    let canonical = if value.is_nan() {
        f32::NAN
    } else if value == 0.0 {
        0.0
    } else {
        value
    };
    let bits = canonical.to_bits() as i32;
    bits ^ ((bits >> 31) & F32_PAYLOAD_MASK)
}

#[inline]
pub fn sortable_int_to_float(encoded: i32) -> f32 {
    let bits = encoded ^ ((encoded >> 31) & F32_PAYLOAD_MASK);
    f32::from_bits(bits as u32)
}

/// Epoch-day number of a calendar date (1970-01-01 is day 0).
#[inline]
pub fn epoch_day_of(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce()) - EPOCH_DAYS_FROM_CE
}

/// Inverse of [`epoch_day_of`]. Returns `None` outside chrono's date range.
#[inline]
pub fn date_of_epoch_day(epoch_day: i64) -> Option<NaiveDate> {
    let days_from_ce = epoch_day.checked_add(EPOCH_DAYS_FROM_CE)?;
    NaiveDate::from_num_days_from_ce_opt(i32::try_from(days_from_ce).ok()?)
}

/// Epoch-millisecond value of a UTC instant.
#[inline]
pub fn epoch_millis_of(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

#[inline]
pub fn instant_of_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Epoch-millisecond value of a naive date-time interpreted as UTC.
#[inline]
pub fn utc_millis_of(date_time: NaiveDateTime) -> i64 {
    date_time.and_utc().timestamp_millis()
}

#[inline]
pub fn date_time_of_utc_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_roundtrip() {
        for x in [
            0.0,
            1.0,
            -1.0,
            1234.5678,
            -1234.5678,
            f64::MIN,
            f64::MAX,
            f64::MIN_POSITIVE,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ] {
            assert_eq!(sortable_long_to_double(double_to_sortable_long(x)), x);
        }
    }

    #[test]
    fn test_double_negative_zero_canonicalized() {
        assert_eq!(double_to_sortable_long(-0.0), double_to_sortable_long(0.0));
        assert_eq!(sortable_long_to_double(double_to_sortable_long(-0.0)), 0.0);
    }

    #[test]
    fn test_double_order_preserved() {
        let samples = [
            f64::NEG_INFINITY,
            f64::MIN,
            -1e100,
            -2.0,
            -1.0,
            -f64::MIN_POSITIVE,
            0.0,
            f64::MIN_POSITIVE,
            0.5,
            1.0,
            2.0,
            1e100,
            f64::MAX,
            f64::INFINITY,
        ];
        for window in samples.windows(2) {
            assert!(
                double_to_sortable_long(window[0]) < double_to_sortable_long(window[1]),
                "{} must encode below {}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn test_nan_sorts_above_infinity() {
        assert!(double_to_sortable_long(f64::NAN) > double_to_sortable_long(f64::INFINITY));
        assert!(float_to_sortable_int(f32::NAN) > float_to_sortable_int(f32::INFINITY));
        assert!(sortable_long_to_double(double_to_sortable_long(f64::NAN)).is_nan());
    }

    #[test]
    fn test_float_roundtrip_and_order() {
        for x in [0.0f32, 1.5, -1.5, f32::MIN, f32::MAX, f32::INFINITY] {
            assert_eq!(sortable_int_to_float(float_to_sortable_int(x)), x);
        }
        assert!(float_to_sortable_int(-2.0) < float_to_sortable_int(-1.0));
        assert!(float_to_sortable_int(-1.0) < float_to_sortable_int(0.0));
        assert!(float_to_sortable_int(0.0) < float_to_sortable_int(1.0));
        assert_eq!(float_to_sortable_int(-0.0), float_to_sortable_int(0.0));
    }

    #[test]
    fn test_epoch_day() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(epoch_day_of(epoch), 0);

        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let day = epoch_day_of(date);
        assert_eq!(date_of_epoch_day(day), Some(date));
        assert_eq!(epoch_day_of(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()), -1);
    }

    #[test]
    fn test_epoch_millis() {
        let instant = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(epoch_millis_of(instant), 1_700_000_000_123);
        assert_eq!(instant_of_epoch_millis(1_700_000_000_123), Some(instant));

        let naive = instant.naive_utc();
        assert_eq!(utc_millis_of(naive), 1_700_000_000_123);
        assert_eq!(date_time_of_utc_millis(1_700_000_000_123), Some(naive));
    }
}
