//! Conversions between domain values and SQLite column values.
//!
//! SQLite integers are signed 64-bit. Every narrowing goes through
//! `try_from` and reports [`DbError::OutOfRange`] or [`DbError::Corrupt`].

use chrono::{DateTime, NaiveDate, Utc};

use larue_types::UserId;

use crate::error::DbError;

/// Column format of recycler day keys.
const DAY_COLUMN_FORMAT: &str = "%Y%m%d";

pub(crate) fn user_to_db(user_id: UserId) -> Result<i64, DbError> {
    i64::try_from(user_id.into_inner()).map_err(|_overflow| DbError::OutOfRange {
        field: "user_id",
        value: user_id.to_string(),
    })
}

pub(crate) fn user_from_db(value: i64) -> Result<UserId, DbError> {
    u64::try_from(value)
        .map(UserId::new)
        .map_err(|_negative| DbError::Corrupt(format!("user_id {value}")))
}

pub(crate) fn u32_from_db(field: &'static str, value: i64) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|_range| DbError::Corrupt(format!("{field} {value}")))
}

pub(crate) fn u64_from_db(field: &'static str, value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_range| DbError::Corrupt(format!("{field} {value}")))
}

pub(crate) fn u64_to_db(field: &'static str, value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_overflow| DbError::OutOfRange {
        field,
        value: value.to_string(),
    })
}

pub(crate) fn time_from_db(field: &'static str, secs: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| DbError::Corrupt(format!("{field} {secs}")))
}

/// `YYYYMMDD`, or 0 for "never".
pub(crate) fn day_to_db(day: Option<NaiveDate>) -> Result<i64, DbError> {
    day.map_or(Ok(0), |day| {
        day.format(DAY_COLUMN_FORMAT)
            .to_string()
            .parse()
            .map_err(|_parse| DbError::OutOfRange {
                field: "day",
                value: day.to_string(),
            })
    })
}

pub(crate) fn day_from_db(value: i64) -> Result<Option<NaiveDate>, DbError> {
    if value == 0 {
        return Ok(None);
    }
    NaiveDate::parse_from_str(&value.to_string(), DAY_COLUMN_FORMAT)
        .map(Some)
        .map_err(|_parse| DbError::Corrupt(format!("day key {value}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn day_keys_use_compact_integers() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert_eq!(day_to_db(Some(day)).unwrap(), 20_261_017);
        assert_eq!(day_from_db(20_261_017).unwrap(), Some(day));
        assert_eq!(day_to_db(None).unwrap(), 0);
        assert_eq!(day_from_db(0).unwrap(), None);
        assert!(matches!(day_from_db(20_261_399), Err(DbError::Corrupt(_))));
    }

    #[test]
    fn user_ids_outside_sqlite_range_are_rejected() {
        assert!(user_to_db(UserId::new(u64::MAX)).is_err());
        assert_eq!(user_to_db(UserId::new(42)).unwrap(), 42);
        assert!(matches!(user_from_db(-1), Err(DbError::Corrupt(_))));
    }
}
