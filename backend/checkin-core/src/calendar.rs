// src/calendar.rs

use crate::api_client::CheckinError;
use crate::holidays::{national_holiday, Holiday};
use crate::i18n::Translations;
use crate::models::{ApplicationStatus, AttendanceRecord, PunchKind};
use crate::status::{calendar_class, CalendarClass};
use crate::validation::ValidationError;
use crate::work_hours::{find_punch, format_decimal2, record_work_hours, STANDARD_WORK_HOURS};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{self, Write as _};
use std::str::FromStr;

static MONTH_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("month key pattern is valid"));

pub const WEEKDAY_SHORT_KEYS: [&str; 7] = [
    "WEEK_SUNDAY",
    "WEEK_MONDAY",
    "WEEK_TUESDAY",
    "WEEK_WEDNESDAY",
    "WEEK_THURSDAY",
    "WEEK_FRIDAY",
    "WEEK_SATURDAY",
];

pub const WEEKDAY_KEYS: [(&str, &str); 7] = [
    ("WEEKDAY_SUNDAY", "Sunday"),
    ("WEEKDAY_MONDAY", "Monday"),
    ("WEEKDAY_TUESDAY", "Tuesday"),
    ("WEEKDAY_WEDNESDAY", "Wednesday"),
    ("WEEKDAY_THURSDAY", "Thursday"),
    ("WEEKDAY_FRIDAY", "Friday"),
    ("WEEKDAY_SATURDAY", "Saturday"),
];

/// A calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn days_in_month(&self) -> u32 {
        let next_first = self.next().first_day();
        next_first.pred_opt().map(|d| d.day()).unwrap_or(28)
    }

    /// Blank cells before day 1 in a Sunday-first week.
    pub fn leading_blanks(&self) -> u32 {
        self.first_day().weekday().num_days_from_sunday()
    }

    pub fn date(&self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = CheckinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = MONTH_KEY
            .captures(s.trim())
            .ok_or(CheckinError::Validation(ValidationError::MissingField("month")))?;
        let year: i32 = caps[1].parse().unwrap_or_default();
        let month: u32 = caps[2].parse().unwrap_or_default();
        MonthKey::new(year, month)
            .ok_or(CheckinError::Validation(ValidationError::MissingField("month")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayState {
    Today,
    /// Not selectable.
    Future,
    Past(CalendarClass),
}

#[derive(Debug, Clone)]
pub struct DayCell<'a> {
    pub date: NaiveDate,
    pub state: DayState,
    pub holiday: Option<&'static Holiday>,
    pub records: Vec<&'a AttendanceRecord>,
}

impl DayCell<'_> {
    pub fn is_selectable(&self) -> bool {
        self.state != DayState::Future
    }

    fn marker(&self) -> char {
        match self.state {
            DayState::Today => '*',
            DayState::Future => ' ',
            DayState::Past(class) => class.marker(),
        }
    }
}

/// One month laid out as a Sunday-first grid.
#[derive(Debug, Clone)]
pub struct CalendarView<'a> {
    pub month: MonthKey,
    pub leading_blanks: u32,
    pub days: Vec<DayCell<'a>>,
}

impl<'a> CalendarView<'a> {
    pub fn build(month: MonthKey, today: NaiveDate, records: &'a [AttendanceRecord]) -> Self {
        let days = (1..=month.days_in_month())
            .filter_map(|day| month.date(day))
            .map(|date| {
                let date_key = date.format("%Y-%m-%d").to_string();
                let day_records: Vec<&AttendanceRecord> = records
                    .iter()
                    .filter(|r| r.date_key() == date_key)
                    .collect();

                let state = if date == today {
                    DayState::Today
                } else if date > today {
                    DayState::Future
                } else {
                    DayState::Past(calendar_class(&day_records))
                };

                DayCell {
                    date,
                    state,
                    holiday: national_holiday(date),
                    records: day_records,
                }
            })
            .collect();

        Self {
            month,
            leading_blanks: month.leading_blanks(),
            days,
        }
    }

    pub fn day(&self, day: u32) -> Option<&DayCell<'a>> {
        self.days.iter().find(|cell| cell.date.day() == day)
    }

    pub fn title(&self, t: &Translations) -> String {
        t.t_params(
            "MONTH_YEAR_TEMPLATE",
            &[
                ("year", self.month.year().to_string()),
                ("month", self.month.month().to_string()),
            ],
        )
    }

    /// Seven columns, each cell `dd` plus a status marker; holidays are
    /// listed under the grid.
    pub fn render_text(&self, t: &Translations) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.title(t));

        let header: Vec<String> = WEEKDAY_SHORT_KEYS
            .iter()
            .map(|key| format!("{:>4}", short_label(&t.t(key))))
            .collect();
        let _ = writeln!(out, "{}", header.join(""));

        let mut column = 0;
        for _ in 0..self.leading_blanks {
            out.push_str("    ");
            column += 1;
        }
        for cell in &self.days {
            let holiday_mark = if cell.holiday.is_some() { 'H' } else { ' ' };
            let _ = write!(out, "{:>2}{}{}", cell.date.day(), cell.marker(), holiday_mark);
            column += 1;
            if column % 7 == 0 {
                out.push('\n');
            }
        }
        if column % 7 != 0 {
            out.push('\n');
        }

        let _ = writeln!(
            out,
            "* today  ! abnormal  . day-off  ? pending  + approved  ~ adjustment  H holiday"
        );
        for cell in self.days.iter().filter(|c| c.holiday.is_some()) {
            if let Some(holiday) = cell.holiday {
                let _ = writeln!(out, "  {} {}", cell.date.format("%m/%d"), holiday.name);
            }
        }
        out
    }
}

fn short_label(label: &str) -> String {
    label.chars().take(3).collect()
}

/// Translated long weekday name, used in reports.
pub fn weekday_name(date: NaiveDate, t: &Translations) -> String {
    let (key, fallback) = WEEKDAY_KEYS[date.weekday().num_days_from_sunday() as usize];
    t.t_or(key, fallback)
}

/// Detailed text for one day: punches, overtime, leave and the backend's verdict.
pub fn render_day(date_key: &str, records: &[&AttendanceRecord], t: &Translations) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "📅 {} {}", date_key, t.t_or("DAILY_ATTENDANCE_TITLE", "出勤記錄"));

    if records.is_empty() {
        let _ = writeln!(out, "  {}", t.t_or("DAILY_RECORDS_EMPTY", "該日沒有打卡紀錄"));
        return out;
    }

    for record in records {
        if record.record.is_empty() {
            let _ = writeln!(out, "  ⚠️ {}", t.t_or("DAILY_RECORDS_EMPTY", "該日沒有打卡紀錄"));
        }
        for punch in &record.record {
            let type_key = match punch.kind() {
                Some(PunchKind::In) => "PUNCH_IN",
                _ => "PUNCH_OUT",
            };
            let _ = writeln!(out, "  ● {} - {}", punch.time, t.t(type_key));
            let _ = writeln!(out, "    📍 {}", punch.location);
            if !punch.note.is_empty() {
                let _ = writeln!(out, "    💭 {}", punch.note);
            }
        }

        if let Some(ot) = &record.overtime {
            let hours = ot.hours.map(|h| h.normalize().to_string()).unwrap_or_default();
            let _ = writeln!(
                out,
                "  {} {} {}: {} - {}",
                t.t_or("OVERTIME_PERIOD", "加班時段"),
                hours,
                t.t_or("UNIT_HOURS", "小時"),
                ot.start_time,
                ot.end_time
            );
            if !ot.reason.is_empty() {
                let _ = writeln!(out, "    {}: {}", t.t_or("REASON_LABEL", "原因"), ot.reason);
            }
        }

        if let Some(hours) = record_work_hours(record) {
            if hours.has_overtime() {
                let in_time = find_punch(record, PunchKind::In)
                    .map(|p| p.time.as_str())
                    .unwrap_or("-");
                let out_time = find_punch(record, PunchKind::Out)
                    .map(|p| p.time.as_str())
                    .unwrap_or("-");
                let unit = t.t_or("UNIT_HOURS", "小時");
                let _ = writeln!(out, "  ⏰ {}", t.t_or("OVERTIME_DETECTED", "偵測到加班時數"));
                let _ = writeln!(
                    out,
                    "    {}: {} {}",
                    t.t_or("TOTAL_WORK_HOURS", "總工時"),
                    format_decimal2(hours.net),
                    unit
                );
                let _ = writeln!(
                    out,
                    "    {}: {} {} ({})",
                    t.t_or("STANDARD_WORK_HOURS", "標準工時"),
                    STANDARD_WORK_HOURS,
                    unit,
                    t.t_or("LUNCH_BREAK_DEDUCTED", "已扣除午休 1 小時")
                );
                let _ = writeln!(
                    out,
                    "    {}: {} {}",
                    t.t_or("OVERTIME_HOURS", "加班時數"),
                    format_decimal2(hours.overtime),
                    unit
                );
                let _ = writeln!(
                    out,
                    "    {}: checkin overtime quick --date {} --reason <…> ({} - {})",
                    t.t_or("QUICK_APPLY", "快速申請"),
                    record.date_key(),
                    in_time,
                    out_time
                );
            }
        }

        if let Some(leave) = &record.leave {
            let status = ApplicationStatus::from_raw(&leave.status);
            let icon = match status {
                ApplicationStatus::Approved => "✅",
                ApplicationStatus::Rejected => "❌",
                ApplicationStatus::Pending => "⏳",
            };
            let days = leave.days.map(|d| d.normalize().to_string()).unwrap_or_default();
            let _ = writeln!(
                out,
                "  {} [{} {}] {}: {}, {}: {} {}",
                t.t_or("LEAVE_INFO_TITLE", "請假資訊"),
                icon,
                t.t(status.label_key()),
                t.t_or("LEAVE_TYPE", "假別"),
                t.t(&leave.leave_type),
                t.t_or("LEAVE_DAYS_COUNT", "天數"),
                days,
                t.t_or("UNIT_DAYS", "天")
            );
            if !leave.reason.is_empty() {
                let _ = writeln!(out, "    {}: {}", t.t_or("LEAVE_REASON_DISPLAY", "原因"), leave.reason);
            }
            if !leave.review_comment.is_empty() {
                let _ = writeln!(
                    out,
                    "    {}: {}",
                    t.t_or("REVIEW_COMMENT", "審核意見"),
                    leave.review_comment
                );
            }
        }

        let _ = writeln!(
            out,
            "  {}: {}",
            t.t_or("SYSTEM_JUDGMENT", "系統判斷"),
            t.t(&record.reason)
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeaveInfo, PunchEntry};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(date: &str, reason: &str) -> AttendanceRecord {
        AttendanceRecord {
            date: date.into(),
            reason: reason.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_month_key_parse_and_navigation() {
        let key: MonthKey = "2025-12".parse().unwrap();
        assert_eq!(key.to_string(), "2025-12");
        assert_eq!(key.next().to_string(), "2026-01");
        assert_eq!(key.prev().to_string(), "2025-11");
        assert_eq!("2024-02".parse::<MonthKey>().unwrap().days_in_month(), 29);
        assert!("2025-13".parse::<MonthKey>().is_err());
        assert!("2025-1".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_leading_blanks_follow_first_weekday() {
        // 2025-03-01 is a Saturday, 2025-06-01 a Sunday.
        assert_eq!(MonthKey::new(2025, 3).unwrap().leading_blanks(), 6);
        assert_eq!(MonthKey::new(2025, 6).unwrap().leading_blanks(), 0);
    }

    #[test]
    fn test_build_assigns_today_future_and_past_classes() {
        let records = vec![
            record("2025-03-03", "STATUS_PUNCH_IN_MISSING"),
            record("2025-03-04", "STATUS_PUNCH_NORMAL"),
            record("2025-03-20", "STATUS_PUNCH_IN_MISSING"),
        ];
        let month = MonthKey::new(2025, 3).unwrap();
        let view = CalendarView::build(month, date(2025, 3, 10), &records);

        assert_eq!(view.leading_blanks, 6);
        assert_eq!(view.days.len(), 31);
        assert_eq!(
            view.day(3).unwrap().state,
            DayState::Past(CalendarClass::AbnormalDay)
        );
        assert_eq!(view.day(4).unwrap().state, DayState::Past(CalendarClass::DayOff));
        assert_eq!(view.day(5).unwrap().state, DayState::Past(CalendarClass::NormalDay));
        assert_eq!(view.day(10).unwrap().state, DayState::Today);
        assert_eq!(view.day(20).unwrap().state, DayState::Future);
        assert!(!view.day(20).unwrap().is_selectable());
        assert_eq!(view.day(3).unwrap().records.len(), 1);
    }

    #[test]
    fn test_holidays_are_labelled() {
        let month = MonthKey::new(2025, 10).unwrap();
        let view = CalendarView::build(month, date(2025, 11, 1), &[]);
        assert_eq!(view.day(10).unwrap().holiday.unwrap().name, "國慶日");
        assert!(view.day(11).unwrap().holiday.is_none());

        let text = view.render_text(&Translations::default());
        assert!(text.contains("10/10 國慶日"));
        assert!(text.starts_with("MONTH_YEAR_TEMPLATE"));
    }

    #[test]
    fn test_render_day_lists_punches_and_leave() {
        let mut r = record("2025-03-03", "STATUS_PUNCH_NORMAL");
        r.record = vec![
            PunchEntry {
                punch_type: "上班".into(),
                time: "08:00".into(),
                location: "台北辦公室".into(),
                note: String::new(),
            },
            PunchEntry {
                punch_type: "下班".into(),
                time: "20:00".into(),
                location: "台北辦公室".into(),
                note: "趕案子".into(),
            },
        ];
        r.leave = Some(LeaveInfo {
            leave_type: "ANNUAL_LEAVE".into(),
            status: "APPROVED".into(),
            ..Default::default()
        });

        let text = render_day("2025-03-03", &[&r], &Translations::default());
        assert!(text.contains("08:00 - PUNCH_IN"));
        assert!(text.contains("💭 趕案子"));
        assert!(text.contains("加班時數: 3.00"));
        assert!(text.contains("checkin overtime quick --date 2025-03-03"));
        assert!(text.contains("✅ APPROVED"));
        assert!(text.contains("STATUS_PUNCH_NORMAL"));

        let en = Translations::from_json(
            "en-US",
            &serde_json::json!({ "OVERTIME_HOURS": "Overtime", "UNIT_HOURS": "h" }),
        );
        let text = render_day("2025-03-03", &[&r], &en);
        assert!(text.contains("Overtime: 3.00 h"));
        assert!(!text.contains("加班時數"));
    }

    #[test]
    fn test_weekday_name_falls_back_to_english() {
        assert_eq!(weekday_name(date(2025, 3, 2), &Translations::default()), "Sunday");
    }
}
