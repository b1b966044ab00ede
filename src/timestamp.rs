//! Entry modification timestamps.
//!
//! ZIP headers store modification times as MS-DOS date/time pairs: two 16-bit
//! words with a two-second resolution covering 1980 through 2107. The
//! extended-timestamp extra field (`0x5455`) may add a Unix timestamp with
//! one-second resolution.
//!
//! DOS values carry no time zone. This crate interprets them as UTC so that
//! conversions are deterministic across machines.
//!
//! # Example
//!
//! ```rust
//! use zipkit::Timestamp;
//!
//! let ts = Timestamp::from_unix_secs(1_700_000_000);
//! let (date, time) = ts.to_dos();
//! let back = Timestamp::from_dos(date, time);
//! assert_eq!(back.as_unix_secs(), 1_700_000_000);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SECS_PER_DAY: i64 = 86_400;

/// Earliest representable DOS time: 1980-01-01 00:00:00.
const DOS_EPOCH_UNIX: i64 = 315_532_800;

/// A modification timestamp in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    unix_secs: i64,
}

impl Timestamp {
    /// Creates a timestamp from Unix seconds.
    #[inline]
    pub const fn from_unix_secs(secs: i64) -> Self {
        Self { unix_secs: secs }
    }

    /// Returns the timestamp as Unix seconds.
    #[inline]
    pub const fn as_unix_secs(&self) -> i64 {
        self.unix_secs
    }

    /// Returns the current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Creates a timestamp from a `SystemTime`, truncating to whole seconds.
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self::from_unix_secs(d.as_secs() as i64),
            Err(e) => {
                let d = e.duration();
                let secs = d.as_secs() as i64 + i64::from(d.subsec_nanos() > 0);
                Self::from_unix_secs(-secs)
            }
        }
    }

    /// Converts to a `SystemTime`.
    pub fn as_system_time(&self) -> SystemTime {
        if self.unix_secs >= 0 {
            UNIX_EPOCH + Duration::from_secs(self.unix_secs as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.unix_secs.unsigned_abs())
        }
    }

    /// Decodes an MS-DOS date/time pair.
    ///
    /// Out-of-range fields (month 0, day 0, hour 25, ...) are clamped rather
    /// than rejected; archivers in the wild write such values.
    pub fn from_dos(date: u16, time: u16) -> Self {
        let year = 1980 + i64::from(date >> 9);
        let month = u32::from((date >> 5) & 0x0F).clamp(1, 12);
        let day = u32::from(date & 0x1F).max(1);
        let hour = i64::from((time >> 11).min(23));
        let minute = i64::from(((time >> 5) & 0x3F).min(59));
        let second = i64::from(((time & 0x1F) * 2).min(59));

        let days = days_from_civil(year, month, day);
        Self::from_unix_secs(days * SECS_PER_DAY + hour * 3600 + minute * 60 + second)
    }

    /// Encodes as an MS-DOS `(date, time)` pair.
    ///
    /// Times before 1980 clamp to 1980-01-01 00:00:00 and times after 2107
    /// clamp to the last representable second. Odd seconds round down.
    pub fn to_dos(&self) -> (u16, u16) {
        let secs = self.unix_secs.max(DOS_EPOCH_UNIX);
        let days = secs.div_euclid(SECS_PER_DAY);
        let rem = secs.rem_euclid(SECS_PER_DAY);
        let (year, month, day) = civil_from_days(days);
        if year > 2107 {
            return (0xFF9F, 0xBF7D);
        }

        let date = (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16;
        let hour = (rem / 3600) as u16;
        let minute = ((rem % 3600) / 60) as u16;
        let second = (rem % 60) as u16;
        let time = (hour << 11) | (minute << 5) | (second / 2);
        (date, time)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y.rem_euclid(400);
    let m = i64::from(month);
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`days_from_civil`].
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
