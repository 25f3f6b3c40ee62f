// src/status.rs

use crate::i18n::Translations;
use crate::models::{AttendanceRecord, PunchKind, PUNCH_IN_LABEL};
use chrono::NaiveDate;
use std::fmt;
use std::fmt::Write;

/// Attendance status code as sent by the backend in `reason`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    PunchInMissing,
    PunchOutMissing,
    PunchNormal,
    NoRecord,
    RepairPending,
    RepairApproved,
    RepairRejected,
    Other(String),
    Empty,
}

impl ReasonCode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" => ReasonCode::Empty,
            "STATUS_PUNCH_IN_MISSING" => ReasonCode::PunchInMissing,
            "STATUS_PUNCH_OUT_MISSING" => ReasonCode::PunchOutMissing,
            "STATUS_PUNCH_NORMAL" => ReasonCode::PunchNormal,
            "STATUS_NO_RECORD" => ReasonCode::NoRecord,
            "STATUS_REPAIR_PENDING" => ReasonCode::RepairPending,
            "STATUS_REPAIR_APPROVED" => ReasonCode::RepairApproved,
            "STATUS_REPAIR_REJECTED" => ReasonCode::RepairRejected,
            other => ReasonCode::Other(other.to_string()),
        }
    }

    pub fn as_code(&self) -> &str {
        match self {
            ReasonCode::PunchInMissing => "STATUS_PUNCH_IN_MISSING",
            ReasonCode::PunchOutMissing => "STATUS_PUNCH_OUT_MISSING",
            ReasonCode::PunchNormal => "STATUS_PUNCH_NORMAL",
            ReasonCode::NoRecord => "STATUS_NO_RECORD",
            ReasonCode::RepairPending => "STATUS_REPAIR_PENDING",
            ReasonCode::RepairApproved => "STATUS_REPAIR_APPROVED",
            ReasonCode::RepairRejected => "STATUS_REPAIR_REJECTED",
            ReasonCode::Other(code) => code,
            ReasonCode::Empty => "",
        }
    }

    /// Counted as abnormal in the monthly statistics.
    pub fn is_abnormal(&self) -> bool {
        matches!(
            self,
            ReasonCode::PunchInMissing
                | ReasonCode::PunchOutMissing
                | ReasonCode::RepairPending
                | ReasonCode::RepairRejected
        )
    }

    /// Counted as a normal day in the monthly statistics.
    pub fn is_normal(&self) -> bool {
        matches!(self, ReasonCode::PunchNormal | ReasonCode::RepairApproved)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarClass {
    NormalDay,
    AbnormalDay,
    DayOff,
    PendingVirtual,
    ApprovedVirtual,
    PendingAdjustment,
}

impl CalendarClass {
    pub fn css_name(&self) -> &'static str {
        match self {
            CalendarClass::NormalDay => "normal-day",
            CalendarClass::AbnormalDay => "abnormal-day",
            CalendarClass::DayOff => "day-off",
            CalendarClass::PendingVirtual => "pending-virtual",
            CalendarClass::ApprovedVirtual => "approved-virtual",
            CalendarClass::PendingAdjustment => "pending-adjustment",
        }
    }

    /// One-character marker for the text calendar.
    pub fn marker(&self) -> char {
        match self {
            CalendarClass::NormalDay => ' ',
            CalendarClass::AbnormalDay => '!',
            CalendarClass::DayOff => '.',
            CalendarClass::PendingVirtual => '?',
            CalendarClass::ApprovedVirtual => '+',
            CalendarClass::PendingAdjustment => '~',
        }
    }
}

/// Class of a calendar day, decided by the first record for that date.
pub fn calendar_class(day_records: &[&AttendanceRecord]) -> CalendarClass {
    let Some(record) = day_records.first() else {
        return CalendarClass::NormalDay;
    };

    match ReasonCode::parse(&record.reason) {
        ReasonCode::PunchInMissing | ReasonCode::PunchOutMissing => CalendarClass::AbnormalDay,
        ReasonCode::PunchNormal => CalendarClass::DayOff,
        ReasonCode::RepairPending => CalendarClass::PendingVirtual,
        ReasonCode::RepairApproved => CalendarClass::ApprovedVirtual,
        ReasonCode::NoRecord if record.overtime.is_some() || record.leave.is_some() => {
            CalendarClass::DayOff
        }
        ReasonCode::NoRecord | ReasonCode::Empty => CalendarClass::NormalDay,
        ReasonCode::RepairRejected | ReasonCode::Other(_) => CalendarClass::PendingAdjustment,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Yellow,
    Green,
    Orange,
    Red,
    Gray,
}

/// What the user can do from an abnormal-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbnormalAction {
    None,
    AddPunch(PunchKind),
    Reapply(PunchKind),
}

/// Either a translation key or text to show as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayText {
    Key {
        key: &'static str,
        fallback: &'static str,
    },
    Code(String),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbnormalEntry {
    pub date: String,
    pub reason: ReasonCode,
    pub tone: Tone,
    pub text: DisplayText,
    pub action: AbnormalAction,
}

/// Maps the backend's Chinese repair descriptions to translation keys.
pub fn punch_types_key(punch_types: &str) -> Option<(&'static str, &'static str)> {
    match punch_types.trim() {
        "補上班審核中" => Some(("STATUS_REPAIR_PENDING_IN", "Punch In Review Pending")),
        "補下班審核中" => Some(("STATUS_REPAIR_PENDING_OUT", "Punch Out Review Pending")),
        "補上班通過" => Some(("STATUS_REPAIR_APPROVED_IN", "Punch In Approved")),
        "補下班通過" => Some(("STATUS_REPAIR_APPROVED_OUT", "Punch Out Approved")),
        "補上班被拒絕" => Some(("STATUS_REPAIR_REJECTED_IN", "Punch In Rejected")),
        "補下班被拒絕" => Some(("STATUS_REPAIR_REJECTED_OUT", "Punch Out Rejected")),
        _ => None,
    }
}

fn punch_types_text(punch_types: &str) -> DisplayText {
    match punch_types_key(punch_types) {
        Some((key, fallback)) => DisplayText::Key { key, fallback },
        None => DisplayText::Raw(punch_types.to_string()),
    }
}

pub fn classify_abnormal(record: &AttendanceRecord) -> AbnormalEntry {
    let reason = ReasonCode::parse(&record.reason);
    let (tone, text, action) = match &reason {
        ReasonCode::RepairPending => (
            Tone::Yellow,
            punch_types_text(&record.punch_types),
            AbnormalAction::None,
        ),
        ReasonCode::RepairApproved => (
            Tone::Green,
            punch_types_text(&record.punch_types),
            AbnormalAction::None,
        ),
        ReasonCode::RepairRejected => {
            let kind = if record.punch_types.contains(PUNCH_IN_LABEL) {
                PunchKind::In
            } else {
                PunchKind::Out
            };
            (
                Tone::Orange,
                punch_types_text(&record.punch_types),
                AbnormalAction::Reapply(kind),
            )
        }
        ReasonCode::PunchInMissing => (
            Tone::Red,
            DisplayText::Code("STATUS_PUNCH_IN_MISSING".into()),
            AbnormalAction::AddPunch(PunchKind::In),
        ),
        ReasonCode::PunchOutMissing => (
            Tone::Red,
            DisplayText::Code("STATUS_PUNCH_OUT_MISSING".into()),
            AbnormalAction::AddPunch(PunchKind::Out),
        ),
        other => (
            Tone::Gray,
            DisplayText::Code(other.as_code().to_string()),
            AbnormalAction::None,
        ),
    };

    AbnormalEntry {
        date: record.date.clone(),
        reason,
        tone,
        text,
        action,
    }
}

/// Abnormal list entries, newest date first.
pub fn abnormal_entries(records: &[AttendanceRecord]) -> Vec<AbnormalEntry> {
    let mut sorted: Vec<&AttendanceRecord> = records.iter().collect();
    sorted.sort_by(|a, b| parse_record_date(b).cmp(&parse_record_date(a)));
    sorted.into_iter().map(classify_abnormal).collect()
}

fn parse_record_date(record: &AttendanceRecord) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(record.date_key(), "%Y-%m-%d").ok()
}

impl DisplayText {
    pub fn resolve(&self, t: &Translations) -> String {
        match self {
            DisplayText::Key { key, fallback } => t.t_or(key, fallback),
            DisplayText::Code(code) => t.t(code),
            DisplayText::Raw(text) => text.clone(),
        }
    }
}

impl Tone {
    fn marker(&self) -> &'static str {
        match self {
            Tone::Yellow => "🟡",
            Tone::Green => "🟢",
            Tone::Orange => "🟠",
            Tone::Red => "🔴",
            Tone::Gray => "⚪",
        }
    }
}

pub fn render_abnormal_list(entries: &[AbnormalEntry], t: &Translations) -> String {
    if entries.is_empty() {
        return format!("{}\n", t.t_or("NO_ABNORMAL_RECORDS", "本月沒有異常紀錄"));
    }
    let mut out = String::new();
    for entry in entries {
        let action = match entry.action {
            AbnormalAction::None => String::new(),
            AbnormalAction::AddPunch(kind) => format!("  → {}", t.t(kind.adjust_button_key())),
            AbnormalAction::Reapply(_) => format!("  → {}", t.t_or("REAPPLY", "Reapply")),
        };
        let _ = writeln!(
            out,
            "{} {}  {}{}",
            entry.tone.marker(),
            entry.date.get(..10).unwrap_or(&entry.date),
            entry.text.resolve(t),
            action
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeaveInfo, OvertimeInfo};

    fn record(date: &str, reason: &str, punch_types: &str) -> AttendanceRecord {
        AttendanceRecord {
            date: date.into(),
            reason: reason.into(),
            punch_types: punch_types.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_punch_in_missing_is_abnormal_with_add_punch_in() {
        let r = record("2025-03-04", "STATUS_PUNCH_IN_MISSING", "");
        assert_eq!(calendar_class(&[&r]), CalendarClass::AbnormalDay);
        assert_eq!(CalendarClass::AbnormalDay.css_name(), "abnormal-day");

        let entry = classify_abnormal(&r);
        assert_eq!(entry.tone, Tone::Red);
        assert_eq!(entry.action, AbnormalAction::AddPunch(PunchKind::In));
        assert_eq!(
            entry.text,
            DisplayText::Code("STATUS_PUNCH_IN_MISSING".into())
        );
    }

    #[test]
    fn test_calendar_class_table() {
        let cases = [
            ("STATUS_PUNCH_OUT_MISSING", CalendarClass::AbnormalDay),
            ("STATUS_PUNCH_NORMAL", CalendarClass::DayOff),
            ("STATUS_REPAIR_PENDING", CalendarClass::PendingVirtual),
            ("STATUS_REPAIR_APPROVED", CalendarClass::ApprovedVirtual),
            ("STATUS_REPAIR_REJECTED", CalendarClass::PendingAdjustment),
            ("SOMETHING_NEW", CalendarClass::PendingAdjustment),
            ("STATUS_NO_RECORD", CalendarClass::NormalDay),
            ("", CalendarClass::NormalDay),
        ];
        for (reason, expected) in cases {
            let r = record("2025-03-04", reason, "");
            assert_eq!(calendar_class(&[&r]), expected, "reason {:?}", reason);
        }
        assert_eq!(calendar_class(&[]), CalendarClass::NormalDay);
    }

    #[test]
    fn test_no_record_with_overtime_or_leave_is_day_off() {
        let mut r = record("2025-03-08", "STATUS_NO_RECORD", "");
        r.overtime = Some(OvertimeInfo::default());
        assert_eq!(calendar_class(&[&r]), CalendarClass::DayOff);

        let mut r = record("2025-03-09", "STATUS_NO_RECORD", "");
        r.leave = Some(LeaveInfo::default());
        assert_eq!(calendar_class(&[&r]), CalendarClass::DayOff);
    }

    #[test]
    fn test_first_record_decides_class() {
        let first = record("2025-03-04", "STATUS_PUNCH_NORMAL", "");
        let second = record("2025-03-04", "STATUS_PUNCH_IN_MISSING", "");
        assert_eq!(calendar_class(&[&first, &second]), CalendarClass::DayOff);
    }

    #[test]
    fn test_rejected_repair_reapplies_matching_direction() {
        let r = record("2025-03-05", "STATUS_REPAIR_REJECTED", "補上班被拒絕");
        let entry = classify_abnormal(&r);
        assert_eq!(entry.tone, Tone::Orange);
        assert_eq!(entry.action, AbnormalAction::Reapply(PunchKind::In));
        assert_eq!(
            entry.text,
            DisplayText::Key {
                key: "STATUS_REPAIR_REJECTED_IN",
                fallback: "Punch In Rejected"
            }
        );

        let r = record("2025-03-05", "STATUS_REPAIR_REJECTED", "補下班被拒絕");
        assert_eq!(
            classify_abnormal(&r).action,
            AbnormalAction::Reapply(PunchKind::Out)
        );
    }

    #[test]
    fn test_pending_and_unknown_entries() {
        let pending = classify_abnormal(&record("2025-03-06", "STATUS_REPAIR_PENDING", "補下班審核中"));
        assert_eq!(pending.tone, Tone::Yellow);
        assert_eq!(pending.action, AbnormalAction::None);

        let odd = classify_abnormal(&record("2025-03-06", "STATUS_REPAIR_PENDING", "其他"));
        assert_eq!(odd.text, DisplayText::Raw("其他".into()));

        let unknown = classify_abnormal(&record("2025-03-06", "STATUS_LATE", ""));
        assert_eq!(unknown.tone, Tone::Gray);
        assert_eq!(unknown.text, DisplayText::Code("STATUS_LATE".into()));
    }

    #[test]
    fn test_abnormal_entries_sorted_newest_first() {
        let records = vec![
            record("2025-03-02", "STATUS_PUNCH_IN_MISSING", ""),
            record("2025-03-10", "STATUS_PUNCH_OUT_MISSING", ""),
            record("2025-03-05", "STATUS_REPAIR_PENDING", "補上班審核中"),
        ];
        let dates: Vec<String> = abnormal_entries(&records)
            .into_iter()
            .map(|e| e.date)
            .collect();
        assert_eq!(dates, vec!["2025-03-10", "2025-03-05", "2025-03-02"]);
    }

    #[test]
    fn test_statistics_sets() {
        assert!(ReasonCode::parse("STATUS_REPAIR_REJECTED").is_abnormal());
        assert!(!ReasonCode::parse("STATUS_REPAIR_REJECTED").is_normal());
        assert!(ReasonCode::parse("STATUS_REPAIR_APPROVED").is_normal());
        assert!(!ReasonCode::parse("STATUS_NO_RECORD").is_abnormal());
    }

    #[test]
    fn test_abnormal_list_text() {
        let t = Translations::default();
        let records = vec![
            record("2025-03-04", "STATUS_PUNCH_IN_MISSING", ""),
            record("2025-03-06", "STATUS_REPAIR_PENDING", "補下班審核中"),
        ];
        let text = render_abnormal_list(&abnormal_entries(&records), &t);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("2025-03-06"));
        assert!(lines[0].contains("Punch Out Review Pending"));
        assert!(lines[1].contains("STATUS_PUNCH_IN_MISSING"));
        assert!(lines[1].contains("→"));
        assert!(!lines[1].contains("Reapply"));
    }

    #[test]
    fn test_rejected_entry_offers_reapply_label() {
        let records = vec![record("2025-03-07", "STATUS_REPAIR_REJECTED", "補上班審核拒絕")];
        let entries = abnormal_entries(&records);

        let text = render_abnormal_list(&entries, &Translations::default());
        assert!(text.contains("→ Reapply"));

        let zh = Translations::from_json("zh-TW", &serde_json::json!({ "REAPPLY": "重新申請" }));
        assert!(render_abnormal_list(&entries, &zh).contains("→ 重新申請"));
    }
}
