use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid month-year {input:?}, expected MM-YYYY")]
pub struct InvalidMonthYear {
    pub input: String,
}

impl InvalidMonthYear {
    fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
        }
    }
}

/// A calendar month as written in requests (`"07-2025"`).
///
/// Subscriptions are billed by the month, so every date the service stores or
/// compares is floored to the first day of its month. The last day is kept
/// alongside for inclusive period ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthYear {
    first_day: NaiveDate,
    last_day: NaiveDate,
}

impl MonthYear {
    pub fn new(month: u32, year: i32) -> Option<Self> {
        let first_day = NaiveDate::from_ymd_opt(year, month, 1)?;
        let last_day = first_day
            .checked_add_months(Months::new(1))?
            .pred_opt()?;

        Some(Self {
            first_day,
            last_day,
        })
    }

    /// Accepts exactly two month digits (01-12), a dash and four year digits.
    pub fn parse(input: &str) -> Result<Self, InvalidMonthYear> {
        let bytes = input.as_bytes();
        if bytes.len() != 7 || bytes[2] != b'-' {
            return Err(InvalidMonthYear::new(input));
        }

        let (month, year) = (&input[..2], &input[3..]);
        if !month.bytes().chain(year.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(InvalidMonthYear::new(input));
        }

        let month: u32 = month.parse().map_err(|_| InvalidMonthYear::new(input))?;
        let year: i32 = year.parse().map_err(|_| InvalidMonthYear::new(input))?;

        Self::new(month, year).ok_or_else(|| InvalidMonthYear::new(input))
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    /// Midnight UTC on the first day of the month.
    pub fn first_instant(&self) -> DateTime<Utc> {
        self.first_day.and_time(NaiveTime::MIN).and_utc()
    }

    /// Midnight UTC on the last day of the month, used as an inclusive period end.
    pub fn month_end(&self) -> DateTime<Utc> {
        self.last_day.and_time(NaiveTime::MIN).and_utc()
    }
}

impl FromStr for MonthYear {
    type Err = InvalidMonthYear;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MonthYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:04}", self.month(), self.year())
    }
}
