// src/export.rs
//
// Attendance reports written as CSV: the personal monthly report, one file
// per employee for admins, and the detailed employee punch report.

use crate::api_client::{io_context, CheckinError};
use crate::cache::AttendanceSource;
use crate::calendar::{weekday_name, MonthKey};
use crate::context::AppContext;
use crate::i18n::Translations;
use crate::models::{AttendanceRecord, PunchKind};
use crate::work_hours::{find_punch, format_decimal2, format_hours_minutes, record_work_hours, WorkHours};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const NO_VALUE: &str = "-";
pub const VIRTUAL_PUNCH_NOTE: &str = "系統虛擬卡";
pub const MAX_SHEET_NAME_CHARS: usize = 31;
pub const UNKNOWN_USER_ID: &str = "unknown";
pub const UNKNOWN_USER_NAME: &str = "未知員工";

pub const ATTENDANCE_HEADERS: [&str; 8] = [
    "日期", "上班時間", "上班地點", "下班時間", "下班地點", "工作時數", "狀態", "備註",
];

pub const EMPLOYEE_HEADERS: [&str; 10] = [
    "日期",
    "星期",
    "上班時間",
    "上班地點",
    "下班時間",
    "下班地點",
    "工作時數",
    "工時（小時）",
    "狀態",
    "備註",
];

/// One attendance day, flattened for a report row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub date: String,
    pub punch_in: Option<String>,
    pub punch_in_location: String,
    pub punch_out: Option<String>,
    pub punch_out_location: String,
    pub hours: Option<WorkHours>,
    pub status: String,
    pub notes: String,
}

fn or_dash(value: &str) -> String {
    if value.is_empty() {
        NO_VALUE.to_string()
    } else {
        value.to_string()
    }
}

pub fn flatten_record(record: &AttendanceRecord, t: &Translations) -> ReportRow {
    let punch_in = find_punch(record, PunchKind::In);
    let punch_out = find_punch(record, PunchKind::Out);
    let notes: Vec<&str> = record
        .record
        .iter()
        .map(|p| p.note.as_str())
        .filter(|note| !note.is_empty() && *note != VIRTUAL_PUNCH_NOTE)
        .collect();

    ReportRow {
        date: record.date.clone(),
        punch_in: punch_in.map(|p| p.time.clone()),
        punch_in_location: or_dash(punch_in.map(|p| p.location.as_str()).unwrap_or_default()),
        punch_out: punch_out.map(|p| p.time.clone()),
        punch_out_location: or_dash(punch_out.map(|p| p.location.as_str()).unwrap_or_default()),
        hours: record_work_hours(record),
        status: or_dash(&t.t(&record.reason)),
        notes: or_dash(&notes.join("; ")),
    }
}

impl ReportRow {
    fn attendance_fields(&self) -> [String; 8] {
        [
            self.date.clone(),
            self.punch_in.clone().unwrap_or_else(|| NO_VALUE.into()),
            self.punch_in_location.clone(),
            self.punch_out.clone().unwrap_or_else(|| NO_VALUE.into()),
            self.punch_out_location.clone(),
            self.hours
                .map(|h| format_decimal2(h.gross))
                .unwrap_or_else(|| NO_VALUE.into()),
            self.status.clone(),
            self.notes.clone(),
        ]
    }

    /// Net hours, when the day has a positive amount of them.
    fn net_hours(&self) -> Option<Decimal> {
        self.hours.map(|h| h.net).filter(|net| *net > Decimal::ZERO)
    }

    fn employee_fields(&self, t: &Translations) -> [String; 10] {
        let with_seconds = |time: &Option<String>| match time {
            Some(time) => format!("{}:00", time),
            None => NO_VALUE.to_string(),
        };
        let weekday = NaiveDate::parse_from_str(self.date.get(..10).unwrap_or(&self.date), "%Y-%m-%d")
            .map(|d| weekday_name(d, t))
            .unwrap_or_default();
        let net = self.net_hours();
        [
            self.date.clone(),
            weekday,
            with_seconds(&self.punch_in),
            self.punch_in_location.clone(),
            with_seconds(&self.punch_out),
            self.punch_out_location.clone(),
            net.map(format_hours_minutes)
                .unwrap_or_else(|| NO_VALUE.into()),
            net.map(format_decimal2).unwrap_or_else(|| NO_VALUE.into()),
            self.status.clone(),
            self.notes.clone(),
        ]
    }
}

/// Days with worked hours, their total and average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportSummary {
    pub days: usize,
    pub total_hours: Decimal,
}

impl ReportSummary {
    pub fn of(rows: &[ReportRow]) -> Self {
        rows.iter()
            .filter_map(ReportRow::net_hours)
            .fold(Self::default(), |acc, net| Self {
                days: acc.days + 1,
                total_hours: acc.total_hours + net,
            })
    }

    pub fn average(&self) -> Decimal {
        if self.days == 0 {
            Decimal::ZERO
        } else {
            self.total_hours / Decimal::from(self.days)
        }
    }
}

pub fn write_attendance_csv<W: io::Write>(
    writer: W,
    records: &[AttendanceRecord],
    t: &Translations,
) -> Result<(), CheckinError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(ATTENDANCE_HEADERS)?;
    for record in records {
        csv.write_record(flatten_record(record, t).attendance_fields())?;
    }
    csv.flush()
        .map_err(|e| io_context(e, "Failed to flush attendance report"))?;
    Ok(())
}

/// The detailed punch report, ending with a blank row and a summary row.
pub fn write_employee_csv<W: io::Write>(
    writer: W,
    records: &[AttendanceRecord],
    t: &Translations,
) -> Result<ReportSummary, CheckinError> {
    let rows: Vec<ReportRow> = records.iter().map(|r| flatten_record(r, t)).collect();
    let summary = ReportSummary::of(&rows);

    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(EMPLOYEE_HEADERS)?;
    for row in &rows {
        csv.write_record(row.employee_fields(t))?;
    }
    csv.write_record([""; 10])?;
    csv.write_record([
        "統計".to_string(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        format!("共 {} 天", summary.days),
        format_decimal2(summary.total_hours),
        format!("平均: {}", format_decimal2(summary.average())),
        String::new(),
    ])?;
    csv.flush()
        .map_err(|e| io_context(e, "Failed to flush employee report"))?;
    Ok(summary)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeGroup {
    pub user_id: String,
    pub name: String,
    pub records: Vec<AttendanceRecord>,
}

impl EmployeeGroup {
    pub fn sheet_name(&self) -> String {
        self.name.chars().take(MAX_SHEET_NAME_CHARS).collect()
    }
}

/// Groups records by employee, in order of first appearance.
pub fn group_by_employee(records: Vec<AttendanceRecord>) -> Vec<EmployeeGroup> {
    let mut groups: Vec<EmployeeGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        let user_id = if record.user_id.is_empty() {
            UNKNOWN_USER_ID.to_string()
        } else {
            record.user_id.clone()
        };
        let slot = *index.entry(user_id.clone()).or_insert_with(|| {
            let name = if record.name.is_empty() {
                UNKNOWN_USER_NAME.to_string()
            } else {
                record.name.clone()
            };
            groups.push(EmployeeGroup {
                user_id,
                name,
                records: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].records.push(record);
    }
    groups
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

fn year_month(month: MonthKey) -> String {
    format!("{}年{:02}月", month.year(), month.month())
}

pub fn personal_report_name(month: MonthKey) -> String {
    format!("出勤記錄_{}.csv", year_month(month))
}

pub fn all_employees_dir_name(month: MonthKey) -> String {
    format!("所有員工出勤記錄_{}", year_month(month))
}

pub fn employee_report_name(name: &str, month: MonthKey) -> String {
    format!("{}_{}_打卡記錄.csv", file_safe(name), year_month(month))
}

fn create_file(path: &Path) -> Result<File, CheckinError> {
    File::create(path).map_err(|e| io_context(e, format!("Failed to create report: {:?}", path)))
}

pub struct ExportService {
    ctx: AppContext,
}

impl ExportService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Reads the month; an `ok:false` reply counts as no data.
    async fn month_records(
        &self,
        month: MonthKey,
        user_id: Option<&str>,
    ) -> Result<Vec<AttendanceRecord>, CheckinError> {
        match self.ctx.client.fetch_month(month, user_id).await {
            Ok(records) => Ok(records),
            Err(CheckinError::Backend { code, .. }) => {
                info!("No attendance data for {} (code {})", month, code);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn no_data(&self) {
        self.ctx
            .notifier
            .warning(&self.ctx.t_or("EXPORT_NO_DATA", "本月沒有出勤記錄"));
    }

    fn finish<T>(&self, result: Result<T, CheckinError>) -> Result<T, CheckinError> {
        match &result {
            Ok(_) => self
                .ctx
                .notifier
                .success(&self.ctx.t_or("EXPORT_SUCCESS", "報表已成功匯出！")),
            Err(e) => {
                error!("Export failed: {}", e);
                self.ctx
                    .notifier
                    .error(&self.ctx.t_or("EXPORT_FAILED", "匯出失敗，請稍後再試"));
            }
        }
        result
    }

    /// The logged-in user's month. `None` when there was nothing to write.
    pub async fn export_personal(
        &self,
        month: MonthKey,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, CheckinError> {
        let result = self.write_personal(month, out_dir).await;
        self.report_outcome(result)
    }

    /// Every employee's month, one CSV each under a month directory.
    pub async fn export_all_employees(
        &self,
        month: MonthKey,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, CheckinError> {
        let result = self.write_all_employees(month, out_dir).await;
        self.report_outcome(result)
    }

    /// One employee's detailed punch report. The file is named after the
    /// employee, falling back to the name carried in the records.
    pub async fn export_employee(
        &self,
        employee_id: &str,
        employee_name: Option<&str>,
        month: MonthKey,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, CheckinError> {
        let result = self
            .write_employee(employee_id, employee_name, month, out_dir)
            .await;
        self.report_outcome(result)
    }

    async fn write_personal(
        &self,
        month: MonthKey,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, CheckinError> {
        let user_id = self.ctx.session_user_id().await;
        let records = self.month_records(month, user_id.as_deref()).await?;
        if records.is_empty() {
            return Ok(None);
        }
        let path = out_dir.join(personal_report_name(month));
        write_attendance_csv(create_file(&path)?, &records, &self.ctx.i18n)?;
        info!("Wrote {} days to {:?}", records.len(), path);
        Ok(Some(path))
    }

    async fn write_all_employees(
        &self,
        month: MonthKey,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, CheckinError> {
        let records = self.month_records(month, None).await?;
        if records.is_empty() {
            return Ok(None);
        }
        let dir = out_dir.join(all_employees_dir_name(month));
        fs::create_dir_all(&dir)
            .map_err(|e| io_context(e, format!("Failed to create {:?}", dir)))?;

        let mut used: HashMap<String, usize> = HashMap::new();
        for group in group_by_employee(records) {
            let base = file_safe(&group.sheet_name());
            let seen = used.entry(base.clone()).or_insert(0);
            *seen += 1;
            let file_name = if *seen == 1 {
                format!("{}.csv", base)
            } else {
                format!("{}_{}.csv", base, group.user_id)
            };
            let path = dir.join(file_name);
            write_attendance_csv(create_file(&path)?, &group.records, &self.ctx.i18n)?;
            info!(
                "Wrote {} days for {} to {:?}",
                group.records.len(),
                group.user_id,
                path
            );
        }
        Ok(Some(dir))
    }

    async fn write_employee(
        &self,
        employee_id: &str,
        employee_name: Option<&str>,
        month: MonthKey,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, CheckinError> {
        let records = self.month_records(month, Some(employee_id)).await?;
        if records.is_empty() {
            return Ok(None);
        }
        let name = employee_name
            .map(str::to_string)
            .or_else(|| records.iter().map(|r| r.name.clone()).find(|n| !n.is_empty()))
            .unwrap_or_else(|| employee_id.to_string());
        let path = out_dir.join(employee_report_name(&name, month));
        let summary = write_employee_csv(create_file(&path)?, &records, &self.ctx.i18n)?;
        info!(
            "Wrote employee report for {}: {} days, {} h",
            employee_id, summary.days, summary.total_hours
        );
        Ok(Some(path))
    }

    fn report_outcome(
        &self,
        result: Result<Option<PathBuf>, CheckinError>,
    ) -> Result<Option<PathBuf>, CheckinError> {
        match result {
            Ok(None) => {
                self.no_data();
                Ok(None)
            }
            other => self.finish(other),
        }
    }
}
