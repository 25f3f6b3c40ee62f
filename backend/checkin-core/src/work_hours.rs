// src/work_hours.rs

use crate::models::{AttendanceRecord, OvertimeInfo, PunchEntry, PunchKind};
use crate::status::ReasonCode;
use chrono::{NaiveTime, Timelike};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

pub const LUNCH_BREAK_HOURS: Decimal = dec!(1);
pub const STANDARD_WORK_HOURS: Decimal = dec!(8);
/// Exported reports only flag overtime beyond half an hour.
pub const REPORT_OVERTIME_THRESHOLD: Decimal = dec!(0.5);

const APPROVED_STATUSES: [&str; 2] = ["approved", "已核准"];

/// Hours derived from one day's punch-in and punch-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkHours {
    /// Punch-out minus punch-in.
    pub gross: Decimal,
    /// Gross minus the lunch break.
    pub net: Decimal,
    /// Net hours above the standard day, never negative.
    pub overtime: Decimal,
}

impl WorkHours {
    pub fn has_overtime(&self) -> bool {
        self.overtime > Decimal::ZERO
    }

    pub fn is_report_overtime(&self) -> bool {
        self.overtime > REPORT_OVERTIME_THRESHOLD
    }
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .ok()
}

/// First punch of the given direction.
pub fn find_punch(record: &AttendanceRecord, kind: PunchKind) -> Option<&PunchEntry> {
    record.record.iter().find(|entry| entry.kind() == Some(kind))
}

/// `None` unless punch-out is strictly after punch-in.
pub fn work_hours_between(punch_in: NaiveTime, punch_out: NaiveTime) -> Option<WorkHours> {
    let seconds = (punch_out - punch_in).num_seconds();
    if seconds <= 0 {
        return None;
    }
    let gross = Decimal::from(seconds) / dec!(3600);
    let net = gross - LUNCH_BREAK_HOURS;
    let overtime = (net - STANDARD_WORK_HOURS).max(Decimal::ZERO);
    Some(WorkHours {
        gross,
        net,
        overtime,
    })
}

pub fn record_work_hours(record: &AttendanceRecord) -> Option<WorkHours> {
    let punch_in = parse_time(&find_punch(record, PunchKind::In)?.time)?;
    let punch_out = parse_time(&find_punch(record, PunchKind::Out)?.time)?;
    work_hours_between(punch_in, punch_out)
}

/// Overtime that an application contributes to the day: approved
/// applications, or ones without any status but with hours.
pub fn application_overtime_hours(overtime: &OvertimeInfo) -> Decimal {
    let status = overtime.effective_status();
    let hours = overtime.hours.unwrap_or(Decimal::ZERO);
    if APPROVED_STATUSES.contains(&status.as_str()) || status.is_empty() {
        hours
    } else {
        Decimal::ZERO
    }
}

pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn format_decimal2(value: Decimal) -> String {
    format!("{:.2}", round2(value))
}

/// `7.5` becomes `7小時30分`.
pub fn format_hours_minutes(hours: Decimal) -> String {
    let whole = hours.trunc();
    let minutes = ((hours - whole) * dec!(60))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    format!(
        "{}小時{}分",
        whole.to_i64().unwrap_or_default(),
        minutes.to_i64().unwrap_or_default()
    )
}

/// `"17:45"` becomes `17.75`.
pub fn time_to_decimal(raw: &str) -> Option<Decimal> {
    let time = parse_time(raw)?;
    Some(Decimal::from(time.hour()) + Decimal::from(time.minute()) / dec!(60))
}

pub fn time_difference_minutes(start: &str, end: &str) -> Option<i64> {
    let start = parse_time(start)?;
    let end = parse_time(end)?;
    Some((end - start).num_minutes())
}

/// Figures shown in the monthly summary panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthlyStats {
    pub work_days: u32,
    pub abnormal_count: u32,
    pub normal_days: u32,
    pub total_overtime: Decimal,
}

impl MonthlyStats {
    pub fn from_records(records: &[AttendanceRecord]) -> Self {
        let mut stats = MonthlyStats::default();

        for record in records {
            let has_both = find_punch(record, PunchKind::In).is_some()
                && find_punch(record, PunchKind::Out).is_some();
            if has_both {
                stats.work_days += 1;
            }

            let from_punch = record_work_hours(record)
                .map(|hours| hours.overtime)
                .unwrap_or(Decimal::ZERO);
            let from_application = record
                .overtime
                .as_ref()
                .map(application_overtime_hours)
                .unwrap_or(Decimal::ZERO);
            stats.total_overtime += from_punch.max(from_application);

            let reason = ReasonCode::parse(&record.reason);
            if reason.is_abnormal() {
                stats.abnormal_count += 1;
            } else if reason.is_normal() {
                stats.normal_days += 1;
            }
        }
        stats
    }

    /// One decimal, or a bare `0` when there is no overtime.
    pub fn overtime_display(&self) -> String {
        if self.total_overtime > Decimal::ZERO {
            format!(
                "{:.1}",
                self.total_overtime
                    .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
            )
        } else {
            "0".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn punch(kind: &str, time: &str) -> PunchEntry {
        PunchEntry {
            punch_type: kind.into(),
            time: time.into(),
            location: "HQ".into(),
            note: String::new(),
        }
    }

    fn day(date: &str, punches: &[(&str, &str)], reason: &str) -> AttendanceRecord {
        AttendanceRecord {
            date: date.into(),
            record: punches.iter().map(|(k, t)| punch(k, t)).collect(),
            reason: reason.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_net_hours_subtract_lunch() {
        let record = day("2025-03-03", &[("上班", "08:30"), ("下班", "17:30")], "");
        let hours = record_work_hours(&record).unwrap();
        assert_eq!(hours.gross, dec!(9));
        assert_eq!(hours.net, dec!(8));
        assert_eq!(hours.overtime, Decimal::ZERO);
        assert!(!hours.has_overtime());
    }

    #[test]
    fn test_overtime_above_standard_day() {
        let record = day("2025-03-03", &[("上班", "08:00"), ("下班", "19:45")], "");
        let hours = record_work_hours(&record).unwrap();
        assert_eq!(hours.net, dec!(10.75));
        assert_eq!(hours.overtime, dec!(2.75));
        assert!(hours.is_report_overtime());
    }

    #[test]
    fn test_overtime_never_negative() {
        let hours = work_hours_between(parse_time("09:00").unwrap(), parse_time("12:00").unwrap())
            .unwrap();
        assert_eq!(hours.net, dec!(2));
        assert_eq!(hours.overtime, Decimal::ZERO);
    }

    #[test]
    fn test_non_positive_span_has_no_hours() {
        let record = day("2025-03-03", &[("上班", "18:00"), ("下班", "09:00")], "");
        assert!(record_work_hours(&record).is_none());
        let record = day("2025-03-03", &[("上班", "09:00")], "");
        assert!(record_work_hours(&record).is_none());
    }

    #[test]
    fn test_find_punch_takes_first_of_kind() {
        let record = day(
            "2025-03-03",
            &[("上班", "08:00"), ("上班", "09:00"), ("下班", "18:00")],
            "",
        );
        assert_eq!(find_punch(&record, PunchKind::In).unwrap().time, "08:00");
    }

    #[test]
    fn test_formatting_helpers() {
        assert_eq!(format_hours_minutes(dec!(7.5)), "7小時30分");
        assert_eq!(format_hours_minutes(dec!(8)), "8小時0分");
        assert_eq!(format_decimal2(dec!(2.755)), "2.76");
        assert_eq!(time_to_decimal("17:45"), Some(dec!(17.75)));
        assert_eq!(time_to_decimal("bad"), None);
        assert_eq!(time_difference_minutes("18:00", "20:30"), Some(150));
    }

    #[test]
    fn test_application_overtime_status_rules() {
        let mut ot = OvertimeInfo {
            hours: Some(dec!(2)),
            ..Default::default()
        };
        assert_eq!(application_overtime_hours(&ot), dec!(2));

        ot.approval_status = Some("已核准".into());
        assert_eq!(application_overtime_hours(&ot), dec!(2));

        ot.status = Some("PENDING".into());
        assert_eq!(application_overtime_hours(&ot), Decimal::ZERO);

        ot.status = Some(" Approved".into());
        assert_eq!(application_overtime_hours(&ot), dec!(2));
    }

    #[test]
    fn test_monthly_stats() {
        let mut with_application = day("2025-03-04", &[("上班", "09:00"), ("下班", "18:30")], "STATUS_PUNCH_NORMAL");
        with_application.overtime = Some(OvertimeInfo {
            hours: Some(dec!(3)),
            status: Some("approved".into()),
            ..Default::default()
        });

        let records = vec![
            day("2025-03-03", &[("上班", "08:00"), ("下班", "19:00")], "STATUS_PUNCH_NORMAL"),
            with_application,
            day("2025-03-05", &[("上班", "08:00")], "STATUS_PUNCH_OUT_MISSING"),
            day("2025-03-06", &[], "STATUS_REPAIR_REJECTED"),
            day("2025-03-07", &[], "STATUS_NO_RECORD"),
            day("2025-03-10", &[("上班", "08:00"), ("下班", "17:00")], "STATUS_REPAIR_APPROVED"),
        ];

        let stats = MonthlyStats::from_records(&records);
        assert_eq!(stats.work_days, 3);
        assert_eq!(stats.abnormal_count, 2);
        assert_eq!(stats.normal_days, 3);
        // 2h from punches on the 3rd, max(0.5, 3) on the 4th.
        assert_eq!(stats.total_overtime, dec!(5));
        assert_eq!(stats.overtime_display(), "5.0");
    }

    #[test]
    fn test_overtime_display_zero() {
        assert_eq!(MonthlyStats::default().overtime_display(), "0");
    }
}
