// src/shifts.rs

use crate::api_client::CheckinError;
use crate::cache::{SharedShiftCache, ShiftCache};
use crate::calendar::WEEKDAY_SHORT_KEYS;
use crate::context::AppContext;
use crate::i18n::Translations;
use crate::models::Shift;
use chrono::{Datelike, Duration, NaiveDate};
use serde_json::json;
use std::fmt::Write;
use tracing::{debug, info};

pub const WEEK_SHIFT_DAYS: i64 = 7;

/// `3/14 (WEEK_FRIDAY)`, translated.
pub fn format_shift_date(date: &str, t: &Translations) -> String {
    match NaiveDate::parse_from_str(date.get(..10).unwrap_or(date), "%Y-%m-%d") {
        Ok(parsed) => {
            let weekday = WEEKDAY_SHORT_KEYS[parsed.weekday().num_days_from_sunday() as usize];
            format!("{}/{} ({})", parsed.month(), parsed.day(), t.t(weekday))
        }
        Err(_) => date.to_string(),
    }
}

pub struct ShiftService {
    ctx: AppContext,
    cache: SharedShiftCache,
}

impl ShiftService {
    pub fn new(ctx: AppContext, cache: SharedShiftCache) -> Self {
        Self { ctx, cache }
    }

    /// The session user's shift for `today`, if one is scheduled.
    pub async fn today_shift(&self, today: NaiveDate) -> Result<Option<Shift>, CheckinError> {
        if let Some((cached_date, shift)) = &self.cache.lock().await.today {
            if *cached_date == today {
                debug!("Using cached shift for {}", today);
                return Ok(shift.clone());
            }
        }

        let user_id = self.ctx.session_user_id().await.unwrap_or_default();
        info!("Fetching shift for {} on {}", user_id, today);
        let response = self
            .ctx
            .client
            .call(
                "getEmployeeShiftForDate",
                &[
                    ("employeeId", user_id),
                    ("date", today.format("%Y-%m-%d").to_string()),
                ],
            )
            .await?;

        let has_shift = response.field::<bool>("hasShift").unwrap_or(false);
        let shift = if response.ok() && has_shift {
            response.field::<Shift>("data")
        } else {
            None
        };
        self.cache.lock().await.today = Some((today, shift.clone()));
        Ok(shift)
    }

    /// Shifts from today through a week ahead, cached for a minute.
    pub async fn week_shifts(&self, today: NaiveDate) -> Result<Vec<Shift>, CheckinError> {
        let end = today + Duration::days(WEEK_SHIFT_DAYS);
        let key = ShiftCache::week_key(today, end);
        if let Some(shifts) = self.cache.lock().await.week.get(&key) {
            debug!("Using cached week shifts for {}", key);
            return Ok(shifts);
        }

        let user_id = self.ctx.session_user_id().await.unwrap_or_default();
        let filters = json!({
            "employeeId": user_id,
            "startDate": today.format("%Y-%m-%d").to_string(),
            "endDate": end.format("%Y-%m-%d").to_string(),
        });
        info!("Fetching shifts with filters {}", filters);
        let response = self
            .ctx
            .client
            .call("getShifts", &[("filters", filters.to_string())])
            .await?;

        let shifts: Vec<Shift> = if response.ok() {
            response.list("data")
        } else {
            Vec::new()
        };
        self.cache.lock().await.week.put(key, shifts.clone());
        Ok(shifts)
    }
}

pub fn render_today_shift(shift: Option<&Shift>, t: &Translations) -> String {
    match shift {
        Some(shift) => format!(
            "{}\n  {} - {}\n  📍 {}\n",
            shift.shift_type, shift.start_time, shift.end_time, shift.location
        ),
        None => format!("{}\n", t.t_or("NO_SHIFT_TODAY", "今日無排班")),
    }
}

pub fn render_week_shifts(shifts: &[Shift], t: &Translations) -> String {
    if shifts.is_empty() {
        return format!("{}\n", t.t_or("NO_SHIFT_WEEK", "未來一週無排班"));
    }
    let mut out = String::new();
    for shift in shifts {
        let _ = writeln!(
            out,
            "{:<14} {:<8} {} - {}",
            format_shift_date(&shift.date, t),
            shift.shift_type,
            shift.start_time,
            shift.end_time
        );
    }
    out
}
