// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use crate::consts::{AMIGA_EPOCH_OFFSET, SECONDS_PER_DAY, SECONDS_PER_MINUTE, TICKS_PER_SECOND};
use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// An AmigaDOS date stamp: days since 1978-01-01, minutes since midnight
/// and ticks (1/50 s) inside the current minute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FsTime {
    pub days: u32,
    pub mins: u32,
    pub ticks: u32,
}

impl FsTime {
    pub fn new(days: u32, mins: u32, ticks: u32) -> Self {
        FsTime { days, mins, ticks }
    }

    pub fn now() -> Self {
        Self::from_unix(Utc::now().timestamp())
    }

    /// Dates before the Amiga epoch are clamped to the epoch.
    pub fn from_unix(secs: i64) -> Self {
        let secs = (secs - AMIGA_EPOCH_OFFSET).max(0);
        FsTime {
            days: (secs / SECONDS_PER_DAY) as u32,
            mins: ((secs % SECONDS_PER_DAY) / SECONDS_PER_MINUTE) as u32,
            ticks: ((secs % SECONDS_PER_MINUTE) * TICKS_PER_SECOND) as u32,
        }
    }

    pub fn to_unix(self) -> i64 {
        self.days as i64 * SECONDS_PER_DAY
            + self.mins as i64 * SECONDS_PER_MINUTE
            + self.ticks as i64 / TICKS_PER_SECOND
            + AMIGA_EPOCH_OFFSET
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.to_unix(), 0)
    }

    /// Reads three consecutive big-endian words.
    pub fn read(p: &[u8]) -> Self {
        FsTime {
            days: BigEndian::read_u32(&p[0..4]),
            mins: BigEndian::read_u32(&p[4..8]),
            ticks: BigEndian::read_u32(&p[8..12]),
        }
    }

    pub fn write(&self, p: &mut [u8]) {
        BigEndian::write_u32(&mut p[0..4], self.days);
        BigEndian::write_u32(&mut p[4..8], self.mins);
        BigEndian::write_u32(&mut p[8..12], self.ticks);
    }
}

impl fmt::Display for FsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "Invalid date"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch() {
        let t = FsTime::from_unix(AMIGA_EPOCH_OFFSET);
        assert_eq!(t, FsTime::new(0, 0, 0));
        assert_eq!(t.to_string(), "1978-01-01 00:00:00");
    }

    #[test]
    fn test_unix_conversion() {
        // 1978-01-02 01:02:03
        let secs = AMIGA_EPOCH_OFFSET + 86400 + 3600 + 120 + 3;
        let t = FsTime::from_unix(secs);
        assert_eq!(t, FsTime::new(1, 62, 150));
        assert_eq!(t.to_unix(), secs);
    }

    #[test]
    fn test_read_write() {
        let mut buf = [0u8; 12];
        FsTime::new(5000, 720, 49).write(&mut buf);
        assert_eq!(FsTime::read(&buf), FsTime::new(5000, 720, 49));
    }
}
