// src/validation.rs

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use thiserror::Error;

pub const MIN_REASON_CHARS: usize = 2;
pub const MIN_EMPLOYEE_NAME_CHARS: usize = 2;
pub const MAX_EMPLOYEE_NAME_CHARS: usize = 50;

/// Form errors caught before anything is sent to the backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Reason must be at least {MIN_REASON_CHARS} characters")]
    ReasonTooShort,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Punch time before the start of the current month: {0}")]
    BeforeMonthStart(NaiveDateTime),

    #[error("Punch time after today: {0}")]
    AfterToday(NaiveDateTime),

    #[error("Amount must be a number greater than zero: '{0}'")]
    InvalidAmount(String),

    #[error("End time must be after start time")]
    InvalidTimeRange,

    #[error("End date must not be before start date")]
    InvalidDateRange,

    #[error("Hours must be greater than zero")]
    InvalidHours,

    #[error("Employee name must be {MIN_EMPLOYEE_NAME_CHARS}-{MAX_EMPLOYEE_NAME_CHARS} characters")]
    NameLength,

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("File too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("Location coordinates are required")]
    MissingCoordinates,
}

impl ValidationError {
    /// Translation key shown to the user.
    pub fn message_key(&self) -> &'static str {
        match self {
            ValidationError::ReasonTooShort => "ADJUST_REASON_REQUIRED",
            ValidationError::MissingField(_) => "ERR_MISSING_FIELDS",
            ValidationError::BeforeMonthStart(_) => "ERR_BEFORE_MONTH_START",
            ValidationError::AfterToday(_) => "ERR_AFTER_TODAY",
            ValidationError::InvalidAmount(_) => "ERR_INVALID_AMOUNT",
            ValidationError::InvalidTimeRange => "ERR_INVALID_TIME_RANGE",
            ValidationError::InvalidDateRange => "ERR_INVALID_DATE_RANGE",
            ValidationError::InvalidHours => "ERR_INVALID_HOURS",
            ValidationError::NameLength => "ERR_NAME_LENGTH",
            ValidationError::UnsupportedFileType(_) => "ERR_INVALID_FILE_TYPE",
            ValidationError::FileTooLarge(_) => "ERR_FILE_TOO_LARGE",
            ValidationError::MissingCoordinates => "ERROR_GEOLOCATION",
        }
    }

    /// Text used when the translation table has no entry for the key.
    pub fn fallback_text(&self) -> &'static str {
        match self {
            ValidationError::ReasonTooShort => "請填寫理由（至少 2 個字）",
            ValidationError::MissingField(_) => "請填寫所有必填欄位",
            ValidationError::BeforeMonthStart(_) => "不能補打本月以前的卡",
            ValidationError::AfterToday(_) => "不能補打今天以後的卡",
            ValidationError::InvalidAmount(_) => "請輸入有效的金額",
            ValidationError::InvalidTimeRange => "結束時間必須晚於開始時間",
            ValidationError::InvalidDateRange => "結束日期不可早於開始日期",
            ValidationError::InvalidHours => "時數必須大於 0",
            ValidationError::NameLength => "姓名長度需為 2-50 個字",
            ValidationError::UnsupportedFileType(_) => "只支援 JPG、PNG、GIF、WEBP 圖片",
            ValidationError::FileTooLarge(_) => "檔案大小不可超過 5MB",
            ValidationError::MissingCoordinates => "請取得位置",
        }
    }
}

pub fn require_reason(reason: &str) -> Result<String, ValidationError> {
    let trimmed = reason.trim();
    if trimmed.chars().count() < MIN_REASON_CHARS {
        return Err(ValidationError::ReasonTooShort);
    }
    Ok(trimmed.to_string())
}

pub fn require_field(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

pub fn parse_positive_amount(raw: &str) -> Result<f64, ValidationError> {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount > 0.0 => Ok(amount),
        _ => Err(ValidationError::InvalidAmount(trimmed.to_string())),
    }
}

/// Makeup punches may only target the current month, up to (and including)
/// the start of today.
pub fn check_adjust_window(
    datetime: NaiveDateTime,
    today: NaiveDate,
) -> Result<(), ValidationError> {
    let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
        .unwrap_or(today)
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();
    let today_start = today.and_hms_opt(0, 0, 0).unwrap_or_default();

    if datetime < month_start {
        return Err(ValidationError::BeforeMonthStart(datetime));
    }
    if datetime > today_start {
        return Err(ValidationError::AfterToday(datetime));
    }
    Ok(())
}

pub fn check_employee_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if !(MIN_EMPLOYEE_NAME_CHARS..=MAX_EMPLOYEE_NAME_CHARS).contains(&len) {
        return Err(ValidationError::NameLength);
    }
    Ok(trimmed.to_string())
}
