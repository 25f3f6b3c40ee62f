// src/models.rs
//
// Backend DTOs. Every field is optional or defaulted: replies are read as
// they come and renderers substitute placeholders for missing values.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const ADMIN_DEPT: &str = "管理員";
pub const DISABLED_STATUS: &str = "停用";
pub const PUNCH_IN_LABEL: &str = "上班";
pub const PUNCH_OUT_LABEL: &str = "下班";
pub const DEFAULT_LOCATION_SCOPE_METERS: f64 = 50.0;

/// Tolerant field readers: the backend mixes numbers, numeric strings,
/// empty strings and nulls for the same field.
pub(crate) mod lenient {
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::str::FromStr;

    pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(crate::api_client::value_to_string(&value))
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let s = crate::api_client::value_to_string(&value);
        Ok(if s.is_empty() { None } else { Some(s) })
    }

    pub fn opt_decimal<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Decimal>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        })
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
    }

    /// `null` reads as an empty list.
    pub fn vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }

    pub fn bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(crate::api_client::is_truthy(&value))
    }
}

/// Punch direction. The wire values are the backend's own labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum PunchKind {
    #[serde(rename = "上班")]
    In,
    #[serde(rename = "下班")]
    Out,
}

impl PunchKind {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            PunchKind::In => PUNCH_IN_LABEL,
            PunchKind::Out => PUNCH_OUT_LABEL,
        }
    }

    pub fn from_api_str(raw: &str) -> Option<Self> {
        match raw.trim() {
            PUNCH_IN_LABEL => Some(PunchKind::In),
            PUNCH_OUT_LABEL => Some(PunchKind::Out),
            _ => None,
        }
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            PunchKind::In => "PUNCH_IN",
            PunchKind::Out => "PUNCH_OUT",
        }
    }

    pub fn adjust_button_key(&self) -> &'static str {
        match self {
            PunchKind::In => "BTN_ADJUST_IN",
            PunchKind::Out => "BTN_ADJUST_OUT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PunchEntry {
    #[serde(rename = "type", deserialize_with = "lenient::string")]
    pub punch_type: String,
    #[serde(deserialize_with = "lenient::string")]
    pub time: String,
    #[serde(deserialize_with = "lenient::string")]
    pub location: String,
    #[serde(deserialize_with = "lenient::string")]
    pub note: String,
}

impl PunchEntry {
    pub fn kind(&self) -> Option<PunchKind> {
        PunchKind::from_api_str(&self.punch_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OvertimeInfo {
    #[serde(deserialize_with = "lenient::opt_decimal")]
    pub hours: Option<Decimal>,
    #[serde(deserialize_with = "lenient::string")]
    pub start_time: String,
    #[serde(deserialize_with = "lenient::string")]
    pub end_time: String,
    #[serde(deserialize_with = "lenient::string")]
    pub reason: String,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub review_status: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub approval_status: Option<String>,
}

impl OvertimeInfo {
    /// First non-empty of `status`, `reviewStatus`, `approvalStatus`,
    /// lowercased and trimmed.
    pub fn effective_status(&self) -> String {
        self.status
            .as_deref()
            .or(self.review_status.as_deref())
            .or(self.approval_status.as_deref())
            .unwrap_or_default()
            .trim()
            .to_lowercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaveInfo {
    #[serde(deserialize_with = "lenient::string")]
    pub leave_type: String,
    #[serde(deserialize_with = "lenient::opt_decimal")]
    pub days: Option<Decimal>,
    #[serde(deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(deserialize_with = "lenient::string")]
    pub reason: String,
    #[serde(deserialize_with = "lenient::string")]
    pub review_comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendanceRecord {
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub user_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::vec")]
    pub record: Vec<PunchEntry>,
    #[serde(deserialize_with = "lenient::string")]
    pub reason: String,
    #[serde(deserialize_with = "lenient::string")]
    pub punch_types: String,
    pub overtime: Option<OvertimeInfo>,
    pub leave: Option<LeaveInfo>,
}

impl AttendanceRecord {
    /// The date part only; some replies carry a full timestamp.
    pub fn date_key(&self) -> &str {
        self.date.get(..10).unwrap_or(&self.date)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    #[serde(deserialize_with = "lenient::string")]
    pub user_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub dept: String,
    #[serde(deserialize_with = "lenient::string")]
    pub picture: String,
    #[serde(deserialize_with = "lenient::string")]
    pub rate: String,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.dept == ADMIN_DEPT
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSummary {
    #[serde(deserialize_with = "lenient::string")]
    pub user_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub dept: String,
    #[serde(deserialize_with = "lenient::string")]
    pub picture: String,
    #[serde(deserialize_with = "lenient::string")]
    pub rate: String,
    #[serde(deserialize_with = "lenient::string")]
    pub status: String,
}

impl UserSummary {
    pub fn is_admin(&self) -> bool {
        self.dept == ADMIN_DEPT
    }

    pub fn is_disabled(&self) -> bool {
        self.status == DISABLED_STATUS
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewRequest {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(rename = "type", deserialize_with = "lenient::string")]
    pub request_type: String,
    #[serde(deserialize_with = "lenient::string")]
    pub application_period: String,
    #[serde(deserialize_with = "lenient::string")]
    pub remark: String,
    #[serde(deserialize_with = "lenient::string")]
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub lat: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub lng: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub scope: Option<f64>,
}

impl Location {
    pub fn scope_meters(&self) -> f64 {
        self.scope.unwrap_or(DEFAULT_LOCATION_SCOPE_METERS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Shift {
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub shift_type: String,
    #[serde(deserialize_with = "lenient::string")]
    pub start_time: String,
    #[serde(deserialize_with = "lenient::string")]
    pub end_time: String,
    #[serde(deserialize_with = "lenient::string")]
    pub location: String,
}

/// Review state of an application as the backend reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "APPROVED" => ApplicationStatus::Approved,
            "REJECTED" => ApplicationStatus::Rejected,
            _ => ApplicationStatus::Pending,
        }
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "PENDING",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Rejected => "REJECTED",
        }
    }

    pub fn fallback_label(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "審核中",
            ApplicationStatus::Approved => "已核准",
            ApplicationStatus::Rejected => "已拒絕",
        }
    }
}

/// An admin's verdict on a pending application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            ReviewDecision::Approve => "approve",
            ReviewDecision::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvanceApplication {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub user_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    #[serde(deserialize_with = "lenient::opt_decimal")]
    pub amount: Option<Decimal>,
    #[serde(deserialize_with = "lenient::string")]
    pub purpose: String,
    #[serde(deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(deserialize_with = "lenient::string")]
    pub review_comment: String,
    #[serde(deserialize_with = "lenient::string")]
    pub applied_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReimbursementApplication {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub user_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    #[serde(deserialize_with = "lenient::opt_decimal")]
    pub amount: Option<Decimal>,
    #[serde(deserialize_with = "lenient::string")]
    pub summary: String,
    #[serde(deserialize_with = "lenient::string")]
    pub invoice_number: String,
    #[serde(deserialize_with = "lenient::string")]
    pub note: String,
    #[serde(deserialize_with = "lenient::string")]
    pub invoice_url: String,
    #[serde(deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(deserialize_with = "lenient::string")]
    pub review_comment: String,
    #[serde(deserialize_with = "lenient::string")]
    pub applied_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OvertimeApplication {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub user_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub start_time: String,
    #[serde(deserialize_with = "lenient::string")]
    pub end_time: String,
    #[serde(deserialize_with = "lenient::opt_decimal")]
    pub hours: Option<Decimal>,
    #[serde(deserialize_with = "lenient::string")]
    pub reason: String,
    #[serde(deserialize_with = "lenient::string")]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaveApplication {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub user_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub leave_type: String,
    #[serde(deserialize_with = "lenient::string")]
    pub start_date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub end_date: String,
    #[serde(deserialize_with = "lenient::opt_decimal")]
    pub days: Option<Decimal>,
    #[serde(deserialize_with = "lenient::string")]
    pub reason: String,
    #[serde(deserialize_with = "lenient::string")]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Announcement {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(deserialize_with = "lenient::string")]
    pub content: String,
    #[serde(deserialize_with = "lenient::string")]
    pub priority: String,
    #[serde(deserialize_with = "lenient::string")]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpWhitelistEntry {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub row_number: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub ip_range: String,
    #[serde(deserialize_with = "lenient::string")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonthlyPunchPoint {
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub punch_in: String,
    #[serde(deserialize_with = "lenient::string")]
    pub punch_out: String,
    #[serde(deserialize_with = "lenient::opt_decimal")]
    pub work_hours: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OcrInvoice {
    #[serde(deserialize_with = "lenient::string")]
    pub invoice_number: String,
    #[serde(deserialize_with = "lenient::string")]
    pub invoice_date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub invoice_time: String,
    #[serde(deserialize_with = "lenient::string")]
    pub amount: String,
    #[serde(deserialize_with = "lenient::string")]
    pub store_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub period: String,
    #[serde(deserialize_with = "lenient::string")]
    pub random_code: String,
    #[serde(deserialize_with = "lenient::string")]
    pub seller_tax_id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub store_address: String,
    #[serde(deserialize_with = "lenient::string")]
    pub store_phone: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_day_with_null_record_survives_list_parsing() {
        let response = crate::api_client::ApiResponse::from_value(json!({
            "ok": true,
            "records": [
                { "date": "2025-03-03", "record": null, "reason": "STATUS_PUNCH_IN_MISSING" },
                { "date": "2025-03-04", "record": [{ "type": "上班", "time": "08:30" }] }
            ]
        }));
        let records: Vec<AttendanceRecord> = response.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, "2025-03-03");
        assert!(records[0].record.is_empty());
        assert_eq!(records[0].reason, "STATUS_PUNCH_IN_MISSING");
        assert_eq!(records[1].record.len(), 1);
    }

    #[test]
    fn test_attendance_record_tolerates_missing_and_odd_fields() {
        let record: AttendanceRecord = serde_json::from_value(json!({
            "date": "2025-03-03T00:00:00.000Z",
            "record": [{ "type": "上班", "time": "08:55", "location": null }],
            "reason": "STATUS_PUNCH_OUT_MISSING",
            "overtime": { "hours": "2.5", "reviewStatus": "Approved " }
        }))
        .unwrap();

        assert_eq!(record.date_key(), "2025-03-03");
        assert_eq!(record.record[0].kind(), Some(PunchKind::In));
        assert_eq!(record.record[0].location, "");
        let overtime = record.overtime.unwrap();
        assert_eq!(overtime.hours, Some(dec!(2.5)));
        assert_eq!(overtime.effective_status(), "approved");
        assert!(record.leave.is_none());
    }

    #[test]
    fn test_punch_kind_wire_values() {
        assert_eq!(serde_json::to_value(PunchKind::In).unwrap(), json!("上班"));
        assert_eq!(PunchKind::from_api_str("下班"), Some(PunchKind::Out));
        assert_eq!(PunchKind::from_api_str("午休"), None);
    }

    #[test]
    fn test_user_flags() {
        let admin: UserSummary =
            serde_json::from_value(json!({ "userId": "U1", "dept": "管理員", "status": "啟用" }))
                .unwrap();
        assert!(admin.is_admin());
        assert!(!admin.is_disabled());

        let disabled: UserSummary =
            serde_json::from_value(json!({ "userId": 7, "status": "停用" })).unwrap();
        assert_eq!(disabled.user_id, "7");
        assert!(disabled.is_disabled());
    }

    #[test]
    fn test_location_scope_defaults_to_fifty_meters() {
        let location: Location =
            serde_json::from_value(json!({ "name": "HQ", "lat": "25.0", "lng": 121.5 })).unwrap();
        assert_eq!(location.lat, Some(25.0));
        assert_eq!(location.scope_meters(), 50.0);
    }

    #[test]
    fn test_application_status_mapping() {
        assert_eq!(ApplicationStatus::from_raw("approved"), ApplicationStatus::Approved);
        assert_eq!(ApplicationStatus::from_raw("REJECTED"), ApplicationStatus::Rejected);
        assert_eq!(ApplicationStatus::from_raw(""), ApplicationStatus::Pending);
        assert_eq!(ApplicationStatus::Rejected.fallback_label(), "已拒絕");
    }
}
