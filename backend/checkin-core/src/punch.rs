// src/punch.rs

use crate::api_client::{ApiResponse, CheckinError, USER_AGENT};
use crate::cache::{AttendanceBook, AttendanceSource, SharedShiftCache};
use crate::calendar::MonthKey;
use crate::context::AppContext;
use crate::geo;
use crate::models::{AttendanceRecord, Coordinates, PunchKind};
use crate::validation::{check_adjust_window, require_reason, ValidationError};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

pub const ADJUST_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Holds an in-flight flag for as long as it lives.
pub(crate) struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Result<Self, CheckinError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlightGuard(flag))
            .map_err(|_| CheckinError::InFlight)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Time a makeup punch defaults to when the user only picks a date.
pub fn default_adjust_time(kind: PunchKind) -> NaiveTime {
    match kind {
        PunchKind::In => NaiveTime::from_hms_opt(8, 30, 0).unwrap_or_default(),
        PunchKind::Out => NaiveTime::from_hms_opt(17, 30, 0).unwrap_or_default(),
    }
}

pub fn default_adjust_datetime(date: NaiveDate, kind: PunchKind) -> NaiveDateTime {
    date.and_time(default_adjust_time(kind))
}

#[derive(Debug, Clone)]
pub struct AdjustRequest {
    pub kind: PunchKind,
    pub datetime: Option<NaiveDateTime>,
    pub reason: String,
    pub coords: Coordinates,
}

/// Checks a makeup punch form; returns the datetime and trimmed reason.
pub fn validate_adjust(
    request: &AdjustRequest,
    today: NaiveDate,
) -> Result<(NaiveDateTime, String), ValidationError> {
    let datetime = request
        .datetime
        .ok_or(ValidationError::MissingField("datetime"))?;
    let reason = require_reason(&request.reason)?;
    check_adjust_window(datetime, today)?;
    Ok((datetime, reason))
}

/// `getAbnormalRecords` for the session user.
pub async fn fetch_abnormal_records(
    ctx: &AppContext,
    month: MonthKey,
) -> Result<Vec<AttendanceRecord>, CheckinError> {
    let user_id = ctx.session_user_id().await.unwrap_or_default();
    info!("Fetching abnormal records for {} ({})", user_id, month);
    let response = ctx
        .client
        .call(
            "getAbnormalRecords",
            &[("month", month.to_string()), ("userId", user_id)],
        )
        .await?
        .into_result("getAbnormalRecords")?;
    Ok(response.records())
}

pub struct PunchService {
    ctx: AppContext,
    shift_cache: SharedShiftCache,
    in_flight: AtomicBool,
}

impl PunchService {
    pub fn new(ctx: AppContext, shift_cache: SharedShiftCache) -> Self {
        Self {
            ctx,
            shift_cache,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Punches in or out at `coords`. The note defaults to the client's
    /// user agent.
    pub async fn punch(
        &self,
        kind: PunchKind,
        coords: Coordinates,
        note: Option<&str>,
    ) -> Result<ApiResponse, CheckinError> {
        let _guard = InFlightGuard::acquire(&self.in_flight).inspect_err(|_| {
            warn!("Punch already in progress, ignoring second submission");
        })?;

        let ip = geo::public_ip(&self.ctx).await.unwrap_or_default();
        info!(
            "Punching {:?} at ({}, {}) from ip '{}'",
            kind, coords.lat, coords.lng, ip
        );

        let params = [
            ("type", kind.as_api_str().to_string()),
            ("lat", coords.lat.to_string()),
            ("lng", coords.lng.to_string()),
            ("note", note.unwrap_or(USER_AGENT).to_string()),
            ("ip", ip),
        ];
        let response = match self.ctx.client.call("punch", &params).await {
            Ok(response) => response,
            Err(e) => {
                self.ctx.report_error("punch", &e);
                return Err(e);
            }
        };

        self.ctx.notify_response(&response);
        if response.ok() && kind == PunchKind::In {
            self.shift_cache.lock().await.clear();
        }
        Ok(response)
    }

    /// Submits a makeup punch for review. On success the month cache is
    /// dropped and the current abnormal list is fetched again; `None` means
    /// that refresh failed and was already reported.
    pub async fn adjust_punch<S: AttendanceSource>(
        &self,
        request: &AdjustRequest,
        today: NaiveDate,
        book: &mut AttendanceBook<S>,
    ) -> Result<Option<Vec<AttendanceRecord>>, CheckinError> {
        let (datetime, reason) = match validate_adjust(request, today) {
            Ok(valid) => valid,
            Err(e) => {
                let e = CheckinError::from(e);
                self.ctx.report_error("adjustPunch", &e);
                return Err(e);
            }
        };
        let _guard = InFlightGuard::acquire(&self.in_flight)?;

        let params = [
            ("type", request.kind.as_api_str().to_string()),
            ("lat", request.coords.lat.to_string()),
            ("lng", request.coords.lng.to_string()),
            ("datetime", datetime.format(ADJUST_DATETIME_FORMAT).to_string()),
            ("note", reason),
        ];
        let response = match self.ctx.client.call("adjustPunch", &params).await {
            Ok(response) => response,
            Err(e) => {
                error!("adjustPunch failed: {}", e);
                self.ctx.notifier.error(&self.ctx.t_or("ADJUST_FAILED", "補打卡失敗"));
                return Err(e);
            }
        };

        if !response.ok() {
            let message = match response.code() {
                Some(code) => self.ctx.t(code),
                None => self.ctx.t_or("ADJUST_FAILED", "補打卡失敗"),
            };
            self.ctx.notifier.error(&message);
            return Err(CheckinError::Backend {
                action: "adjustPunch".into(),
                code: response.code().unwrap_or_default().to_string(),
                msg: response.msg().unwrap_or_default().to_string(),
            });
        }

        self.ctx
            .notifier
            .success(&self.ctx.t_or("ADJUST_SUCCESS", "補打卡申請成功！等待管理員審核"));
        book.invalidate();

        match fetch_abnormal_records(&self.ctx, MonthKey::of(today)).await {
            Ok(records) => Ok(Some(records)),
            Err(e) => {
                self.ctx.report_error("getAbnormalRecords", &e);
                Ok(None)
            }
        }
    }
}
