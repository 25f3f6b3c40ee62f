// src/applications.rs
//
// Overtime and leave applications, and their admin review queues.

use crate::api_client::{ApiResponse, CheckinError};
use crate::context::AppContext;
use crate::i18n::Translations;
use crate::models::{
    AttendanceRecord, LeaveApplication, OvertimeApplication, PunchKind, ReviewDecision,
};
use crate::validation::{require_field, require_reason, ValidationError};
use crate::work_hours::{find_punch, parse_time, record_work_hours, round2};
use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt::Write;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct OvertimeForm {
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub hours: Decimal,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaveForm {
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

pub fn validate_overtime(form: &OvertimeForm) -> Result<String, ValidationError> {
    let start = parse_time(&form.start_time).ok_or(ValidationError::MissingField("startTime"))?;
    let end = parse_time(&form.end_time).ok_or(ValidationError::MissingField("endTime"))?;
    if end <= start {
        return Err(ValidationError::InvalidTimeRange);
    }
    if form.hours <= Decimal::ZERO {
        return Err(ValidationError::InvalidHours);
    }
    require_reason(&form.reason)
}

pub fn validate_leave(form: &LeaveForm) -> Result<String, ValidationError> {
    require_field(&form.leave_type, "leaveType")?;
    if form.end_date < form.start_date {
        return Err(ValidationError::InvalidDateRange);
    }
    require_reason(&form.reason)
}

/// Prefills an overtime application from a day whose punches show overtime.
/// The period ends at punch-out and spans the detected overtime.
pub fn quick_apply_form(record: &AttendanceRecord, reason: &str) -> Option<OvertimeForm> {
    let hours = record_work_hours(record)?;
    if !hours.has_overtime() {
        return None;
    }
    let date = NaiveDate::parse_from_str(record.date_key(), "%Y-%m-%d").ok()?;
    let punch_out = parse_time(&find_punch(record, PunchKind::Out)?.time)?;
    let minutes = (hours.overtime * dec!(60)).round().to_i64()?;
    let start = punch_out - Duration::minutes(minutes);

    Some(OvertimeForm {
        date,
        start_time: start.format("%H:%M").to_string(),
        end_time: punch_out.format("%H:%M").to_string(),
        hours: round2(hours.overtime),
        reason: reason.to_string(),
    })
}

pub struct ApplicationService {
    ctx: AppContext,
}

impl ApplicationService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn submit_overtime(&self, form: &OvertimeForm) -> Result<ApiResponse, CheckinError> {
        let reason = validate_overtime(form).map_err(|e| {
            let e = CheckinError::from(e);
            self.ctx.report_error("submitOvertime", &e);
            e
        })?;
        info!("Submitting overtime for {} ({} h)", form.date, form.hours);
        self.ctx
            .submit(
                "submitOvertime",
                &[
                    ("date", form.date.format("%Y-%m-%d").to_string()),
                    ("startTime", form.start_time.clone()),
                    ("endTime", form.end_time.clone()),
                    ("hours", form.hours.to_string()),
                    ("reason", reason),
                ],
            )
            .await
    }

    pub async fn submit_leave(&self, form: &LeaveForm) -> Result<ApiResponse, CheckinError> {
        let reason = validate_leave(form).map_err(|e| {
            let e = CheckinError::from(e);
            self.ctx.report_error("submitLeave", &e);
            e
        })?;
        info!(
            "Submitting {} leave {} to {}",
            form.leave_type, form.start_date, form.end_date
        );
        self.ctx
            .submit(
                "submitLeave",
                &[
                    ("leaveType", form.leave_type.trim().to_string()),
                    ("startDate", form.start_date.format("%Y-%m-%d").to_string()),
                    ("endDate", form.end_date.format("%Y-%m-%d").to_string()),
                    ("reason", reason),
                ],
            )
            .await
    }

    pub async fn pending_overtime(&self) -> Result<Vec<OvertimeApplication>, CheckinError> {
        let response = self.ctx.fetch("getPendingOvertimeRequests", &[]).await?;
        Ok(response.records())
    }

    pub async fn pending_leave(&self) -> Result<Vec<LeaveApplication>, CheckinError> {
        let response = self.ctx.fetch("getPendingLeaveRequests", &[]).await?;
        Ok(response.records())
    }

    pub async fn review_overtime(
        &self,
        id: &str,
        decision: ReviewDecision,
        comment: &str,
        reviewer_id: &str,
    ) -> Result<ApiResponse, CheckinError> {
        self.review("reviewOvertime", id, decision, comment, reviewer_id)
            .await
    }

    pub async fn review_leave(
        &self,
        id: &str,
        decision: ReviewDecision,
        comment: &str,
        reviewer_id: &str,
    ) -> Result<ApiResponse, CheckinError> {
        self.review("reviewLeave", id, decision, comment, reviewer_id)
            .await
    }

    async fn review(
        &self,
        action: &str,
        id: &str,
        decision: ReviewDecision,
        comment: &str,
        reviewer_id: &str,
    ) -> Result<ApiResponse, CheckinError> {
        info!("{} {} -> {}", action, id, decision.as_api_str());
        self.ctx
            .submit(
                action,
                &[
                    ("id", id.to_string()),
                    ("action", decision.as_api_str().to_string()),
                    ("comment", comment.trim().to_string()),
                    ("reviewerId", reviewer_id.to_string()),
                ],
            )
            .await
    }
}

pub fn render_pending_overtime(items: &[OvertimeApplication], t: &Translations) -> String {
    if items.is_empty() {
        return format!("{}\n", t.t_or("NO_PENDING_REQUESTS", "目前沒有待審核的申請"));
    }
    let mut out = String::new();
    for item in items {
        let hours = item
            .hours
            .map(|h| h.normalize().to_string())
            .unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "[{}] {} {} {}-{} ({} h) {}",
            item.id, item.user_name, item.date, item.start_time, item.end_time, hours, item.reason
        );
    }
    out
}

pub fn render_pending_leave(items: &[LeaveApplication], t: &Translations) -> String {
    if items.is_empty() {
        return format!("{}\n", t.t_or("NO_PENDING_REQUESTS", "目前沒有待審核的申請"));
    }
    let mut out = String::new();
    for item in items {
        let _ = writeln!(
            out,
            "[{}] {} {} {} ~ {} {}",
            item.id,
            item.user_name,
            t.t(&item.leave_type),
            item.start_date,
            item.end_date,
            item.reason
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PunchEntry;
    use crate::notify::NotificationKind;
    use crate::test_support::{logged_in_context, teardown, MockBackend};
    use serde_json::json;

    fn overtime_form() -> OvertimeForm {
        OvertimeForm {
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            start_time: "18:00".into(),
            end_time: "20:30".into(),
            hours: dec!(2.5),
            reason: "趕圖".into(),
        }
    }

    #[test]
    fn test_overtime_validation() {
        assert_eq!(validate_overtime(&overtime_form()), Ok("趕圖".to_string()));

        let mut form = overtime_form();
        form.end_time = "17:00".into();
        assert_eq!(validate_overtime(&form), Err(ValidationError::InvalidTimeRange));

        let mut form = overtime_form();
        form.hours = Decimal::ZERO;
        assert_eq!(validate_overtime(&form), Err(ValidationError::InvalidHours));

        let mut form = overtime_form();
        form.reason = "a".into();
        assert_eq!(validate_overtime(&form), Err(ValidationError::ReasonTooShort));
    }

    #[test]
    fn test_leave_validation() {
        let form = LeaveForm {
            leave_type: "ANNUAL_LEAVE".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
            reason: "家庭旅遊".into(),
        };
        assert_eq!(validate_leave(&form), Err(ValidationError::InvalidDateRange));

        let form = LeaveForm {
            end_date: form.start_date,
            ..form
        };
        assert!(validate_leave(&form).is_ok());
    }

    #[test]
    fn test_quick_apply_uses_detected_overtime() {
        let record = AttendanceRecord {
            date: "2025-03-03".into(),
            record: vec![
                PunchEntry {
                    punch_type: "上班".into(),
                    time: "08:00".into(),
                    ..Default::default()
                },
                PunchEntry {
                    punch_type: "下班".into(),
                    time: "19:30".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let form = quick_apply_form(&record, "加班").unwrap();
        assert_eq!(form.hours, dec!(2.5));
        assert_eq!(form.start_time, "17:00");
        assert_eq!(form.end_time, "19:30");

        let mut short_day = record.clone();
        short_day.record[1].time = "17:00".into();
        assert!(quick_apply_form(&short_day, "加班").is_none());
    }

    #[tokio::test]
    async fn test_submit_overtime_sends_form() {
        let backend = MockBackend::start().await;
        backend.reply("submitOvertime", json!({ "ok": true, "code": "OVERTIME_SUBMITTED" }));
        let (ctx, notifier, path) = logged_in_context(&backend, "apps_overtime").await;
        let service = ApplicationService::new(ctx);

        service.submit_overtime(&overtime_form()).await.unwrap();
        let call = &backend.calls_to("submitOvertime")[0];
        assert_eq!(call.params.get("date").map(String::as_str), Some("2025-03-03"));
        assert_eq!(call.params.get("hours").map(String::as_str), Some("2.5"));
        assert_eq!(call.params.get("reason").map(String::as_str), Some("趕圖"));
        assert!(notifier.has(NotificationKind::Success, "OVERTIME_SUBMITTED"));
        teardown(&path);
    }

    #[tokio::test]
    async fn test_review_leave_and_pending_list() {
        let backend = MockBackend::start().await;
        backend.reply(
            "getPendingLeaveRequests",
            json!({ "ok": true, "data": [{ "id": 5, "userName": "Amy", "leaveType": "SICK_LEAVE" }] }),
        );
        backend.reply("reviewLeave", json!({ "ok": false, "code": "ERR_ALREADY_REVIEWED" }));
        let (ctx, notifier, path) = logged_in_context(&backend, "apps_review_leave").await;
        let service = ApplicationService::new(ctx);

        let pending = service.pending_leave().await.unwrap();
        assert_eq!(pending[0].id, "5");

        let result = service
            .review_leave("5", ReviewDecision::Reject, " 人力不足 ", "U1")
            .await;
        assert!(matches!(result, Err(CheckinError::Backend { .. })));
        assert!(notifier.has(NotificationKind::Error, "ERR_ALREADY_REVIEWED"));

        let call = &backend.calls_to("reviewLeave")[0];
        assert_eq!(call.params.get("action").map(String::as_str), Some("reject"));
        assert_eq!(call.params.get("comment").map(String::as_str), Some("人力不足"));
        assert_eq!(call.params.get("reviewerId").map(String::as_str), Some("U1"));
        teardown(&path);
    }
}
