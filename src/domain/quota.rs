use super::ActionType;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One `(account, action type, day)` counter. Rows are never reset; a new
/// day simply starts a new key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaCounter {
    pub account_id: Uuid,
    pub action_type: ActionType,
    pub day: NaiveDate,
    pub count: i32,
    pub max: i32,
}

impl QuotaCounter {
    pub fn remaining(&self) -> i32 {
        (self.max - self.count).max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub allowed: bool,
    pub remaining: i32,
}

impl Reservation {
    pub fn granted(remaining: i32) -> Self {
        Self {
            allowed: true,
            remaining,
        }
    }

    pub fn denied() -> Self {
        Self {
            allowed: false,
            remaining: 0,
        }
    }
}

pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.parse::<Tz>().ok()
}

/// Calendar date of `now` as seen from the account's timezone.
pub fn quota_day(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// First instant of the next quota day in `tz`, expressed in UTC.
pub fn next_day_start(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let Some(tomorrow) = quota_day(now, tz).succ_opt() else {
        return now + Duration::days(1);
    };
    let midnight = tomorrow.and_time(NaiveTime::MIN);

    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(start) => start.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // midnight skipped by a DST jump; the day starts at the first valid hour
        LocalResult::None => tz
            .from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()
            .map(|start| start.with_timezone(&Utc))
            .unwrap_or(now + Duration::days(1)),
    }
}
