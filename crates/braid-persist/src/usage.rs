use chrono::{DateTime, Datelike, Months, Utc};

use crate::error::Result;
use crate::models::{MessageRole, MessageStatus};
use crate::repositories::MessageRepository;

/// The rolling monthly window `[start, end)` anchored to account creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageCounts {
    pub total: u64,
    pub premium: u64,
}

fn add_months(instant: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    // checked_add_months only fails at the far end of the representable
    // range, where the window is meaningless anyway
    instant
        .checked_add_months(Months::new(months))
        .unwrap_or(instant)
}

/// Compute the current usage window for an anchor instant.
///
/// Window boundaries are the anchor advanced by whole calendar months, so
/// day-of-month and time-of-day are preserved across varying month lengths
/// (with chrono's clamping for short months, e.g. Jan 31 → Feb 29). `start`
/// is the latest boundary ≤ `now`; `end` is the boundary after it. The step
/// count comes from the year/month delta, so an anchor arbitrarily far in
/// the past resolves without iterating month by month.
pub fn rolling_window(anchor: DateTime<Utc>, now: DateTime<Utc>) -> UsageWindow {
    if now <= anchor {
        return UsageWindow {
            start: anchor,
            end: add_months(anchor, 1),
        };
    }

    let delta = (now.year() - anchor.year()) * 12 + (now.month() as i32 - anchor.month() as i32);
    let mut steps = delta.max(0) as u32;
    let mut start = add_months(anchor, steps);

    while start > now && steps > 0 {
        steps -= 1;
        start = add_months(anchor, steps);
    }

    UsageWindow {
        start,
        end: add_months(anchor, steps + 1),
    }
}

/// Counts a user's assistant output inside the current window, for quota
/// gating. Messages still `processing` count: a stream in flight already
/// consumed a slot.
#[derive(Clone)]
pub struct UsageCounter {
    messages: MessageRepository,
}

impl UsageCounter {
    pub fn new(messages: MessageRepository) -> Self {
        Self { messages }
    }

    pub async fn assistant_counts(&self, user_id: &str, anchor: DateTime<Utc>) -> Result<UsageCounts> {
        self.assistant_counts_at(user_id, anchor, Utc::now()).await
    }

    pub async fn assistant_counts_at(
        &self,
        user_id: &str,
        anchor: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<UsageCounts> {
        let window = rolling_window(anchor, now);
        let statuses = [MessageStatus::Finished, MessageStatus::Processing];

        let total = self
            .messages
            .count_in_window(
                user_id,
                MessageRole::Assistant,
                &statuses,
                window.start,
                window.end,
                false,
            )
            .await?;

        let premium = self
            .messages
            .count_in_window(
                user_id,
                MessageRole::Assistant,
                &statuses,
                window.start,
                window.end,
                true,
            )
            .await?;

        Ok(UsageCounts { total, premium })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_window_mid_march() {
        let anchor = utc(2024, 1, 15, 10, 0, 0);
        let now = utc(2024, 3, 20, 10, 0, 0);

        let window = rolling_window(anchor, now);

        assert_eq!(window.start, utc(2024, 3, 15, 10, 0, 0));
        assert_eq!(window.end, utc(2024, 4, 15, 10, 0, 0));
    }

    #[test]
    fn test_window_contains_now() {
        let anchor = utc(2023, 7, 3, 8, 30, 0);
        let cases = [
            utc(2023, 7, 3, 8, 30, 0),
            utc(2023, 8, 2, 23, 59, 59),
            utc(2024, 2, 29, 12, 0, 0),
            utc(2031, 1, 1, 0, 0, 0),
        ];

        for now in cases {
            let window = rolling_window(anchor, now);
            assert!(window.start <= now, "start {} > now {}", window.start, now);
            assert!(now < window.end, "now {} >= end {}", now, window.end);
        }
    }

    #[test]
    fn test_window_preserves_day_of_month() {
        let anchor = utc(2024, 1, 15, 10, 0, 0);

        // Across February: the 15th is preserved, not anchor + 30 days
        let window = rolling_window(anchor, utc(2024, 2, 20, 0, 0, 0));
        assert_eq!(window.start, utc(2024, 2, 15, 10, 0, 0));
        assert_eq!(window.end, utc(2024, 3, 15, 10, 0, 0));
    }

    #[test]
    fn test_window_clamps_short_months() {
        let anchor = utc(2024, 1, 31, 10, 0, 0);

        let window = rolling_window(anchor, utc(2024, 3, 1, 9, 0, 0));
        // Jan 31 + 1 month clamps to Feb 29 in a leap year
        assert_eq!(window.start, utc(2024, 2, 29, 10, 0, 0));
        assert_eq!(window.end, utc(2024, 3, 31, 10, 0, 0));
    }

    #[test]
    fn test_window_far_past_anchor() {
        let anchor = utc(1995, 6, 10, 0, 0, 0);
        let now = utc(2026, 6, 9, 12, 0, 0);

        let window = rolling_window(anchor, now);

        assert_eq!(window.start, utc(2026, 5, 10, 0, 0, 0));
        assert_eq!(window.end, utc(2026, 6, 10, 0, 0, 0));
    }

    #[test]
    fn test_window_future_anchor_degenerates_to_first_window() {
        let anchor = utc(2030, 1, 1, 0, 0, 0);
        let now = utc(2024, 1, 1, 0, 0, 0);

        let window = rolling_window(anchor, now);

        assert_eq!(window.start, anchor);
        assert_eq!(window.end, utc(2030, 2, 1, 0, 0, 0));
    }
}
