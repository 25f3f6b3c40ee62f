// src/admin.rs
//
// Admin dashboard operations: the makeup-punch review queue, user
// management, announcements, punch locations, the IP whitelist and the
// monthly punch analysis.

use crate::api_client::{ActionParams, ApiResponse, CheckinError};
use crate::calendar::MonthKey;
use crate::context::AppContext;
use crate::i18n::Translations;
use crate::models::{
    Announcement, IpWhitelistEntry, Location, MonthlyPunchPoint, ReviewDecision, ReviewRequest,
    UserSummary,
};
use crate::validation::{check_employee_name, require_field, ValidationError};
use crate::work_hours::time_to_decimal;
use std::fmt::Write;
use tracing::{error, info, warn};

pub const DEFAULT_LOCATION_RADIUS: u32 = 200;
pub const DASHBOARD_ANNOUNCEMENTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum UserRole {
    Admin,
    Employee,
}

impl UserRole {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Employee => "employee",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            UserRole::Admin => "管理員",
            UserRole::Employee => "員工",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AccountAction {
    Enable,
    Disable,
}

impl AccountAction {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            AccountAction::Enable => "enable",
            AccountAction::Disable => "disable",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AccountAction::Enable => "啟用",
            AccountAction::Disable => "停用",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserStats {
    pub total: usize,
    pub admins: usize,
    pub employees: usize,
}

impl UserStats {
    pub fn of(users: &[UserSummary]) -> Self {
        let admins = users.iter().filter(|u| u.is_admin()).count();
        Self {
            total: users.len(),
            admins,
            employees: users.len() - admins,
        }
    }
}

/// Case-insensitive substring match on name or department. An empty query
/// keeps everyone.
pub fn filter_users<'a>(users: &'a [UserSummary], query: &str) -> Vec<&'a UserSummary> {
    let needle = query.trim().to_lowercase();
    users
        .iter()
        .filter(|u| {
            needle.is_empty()
                || u.name.to_lowercase().contains(&needle)
                || u.dept.to_lowercase().contains(&needle)
        })
        .collect()
}

pub fn priority_icon(priority: &str) -> &'static str {
    match priority {
        "high" => "🔴",
        "medium" => "🟡",
        _ => "🔵",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationForm {
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius: Option<u32>,
}

pub struct AdminService {
    ctx: AppContext,
}

impl AdminService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Runs a management action. Success shows `done`; a rejection shows the
    /// backend's message or `failed`.
    async fn act(
        &self,
        action: &str,
        params: &ActionParams<'_>,
        done: &str,
        failed: &str,
    ) -> Result<ApiResponse, CheckinError> {
        let response = match self.ctx.client.call(action, params).await {
            Ok(response) => response,
            Err(e) => {
                error!("{} failed: {}", action, e);
                self.ctx.notifier.error(&format!("{}，請稍後再試", failed));
                return Err(e);
            }
        };
        if response.ok() {
            self.ctx.notifier.success(done);
        } else {
            self.ctx.notifier.error(response.msg().unwrap_or(failed));
        }
        response.into_result(action)
    }

    fn reject_form(&self, action: &str, e: ValidationError) -> CheckinError {
        let e = CheckinError::from(e);
        self.ctx.report_error(action, &e);
        e
    }

    pub async fn review_requests(&self) -> Result<Vec<ReviewRequest>, CheckinError> {
        let response = match self.ctx.client.call("getReviewRequest", &[]).await {
            Ok(response) => response,
            Err(e) => {
                error!("getReviewRequest failed: {}", e);
                self.ctx.notifier.error("取得待審核請求失敗，請檢查網路。");
                return Err(e);
            }
        };
        if !response.ok() {
            self.ctx.notifier.error(&format!(
                "取得待審核請求失敗：{}",
                response.msg().unwrap_or_default()
            ));
            return response.into_result("getReviewRequest").map(|_| Vec::new());
        }
        Ok(response.list("reviewRequest"))
    }

    /// Approves or rejects a makeup punch, then returns the refreshed queue.
    pub async fn review_request(
        &self,
        id: &str,
        decision: ReviewDecision,
    ) -> Result<Vec<ReviewRequest>, CheckinError> {
        let action = match decision {
            ReviewDecision::Approve => "approveReview",
            ReviewDecision::Reject => "rejectReview",
        };
        info!("{} {}", action, id);
        let response = match self.ctx.client.call(action, &[("id", id.to_string())]).await {
            Ok(response) => response,
            Err(e) => {
                error!("{} failed: {}", action, e);
                self.ctx.notifier.error(&self.ctx.t("REVIEW_NETWORK_ERROR"));
                return Err(e);
            }
        };
        if !response.ok() {
            self.ctx.notifier.error(&self.ctx.i18n.t_params(
                "REVIEW_FAILED",
                &[("msg", response.msg().unwrap_or_default().to_string())],
            ));
            return response.into_result(action).map(|_| Vec::new());
        }

        let key = match decision {
            ReviewDecision::Approve => "REQUEST_APPROVED",
            ReviewDecision::Reject => "REQUEST_REJECTED",
        };
        self.ctx.notifier.success(&self.ctx.t(key));
        self.review_requests().await
    }

    pub async fn users(&self) -> Result<Vec<UserSummary>, CheckinError> {
        let response = self.ctx.fetch("getAllUsers", &[]).await?;
        Ok(response.list("users"))
    }

    pub async fn update_role(
        &self,
        user: &UserSummary,
        role: UserRole,
    ) -> Result<ApiResponse, CheckinError> {
        let response = self
            .act(
                "updateUserRole",
                &[
                    ("userId", user.user_id.clone()),
                    ("role", role.as_api_str().to_string()),
                ],
                &format!("已成功將「{}」設為{}", user.name, role.label()),
                "操作失敗",
            )
            .await?;
        if self.ctx.session_user_id().await.as_deref() == Some(user.user_id.as_str()) {
            self.ctx
                .notifier
                .warning("您的權限已變更，請重新登入以套用");
        }
        Ok(response)
    }

    pub async fn delete_user(&self, user: &UserSummary) -> Result<ApiResponse, CheckinError> {
        self.act(
            "deleteUser",
            &[("userId", user.user_id.clone())],
            &format!("已成功刪除「{}」", user.name),
            "刪除失敗",
        )
        .await
    }

    /// Disabling your own account ends the session.
    pub async fn set_account_status(
        &self,
        user: &UserSummary,
        action: AccountAction,
    ) -> Result<ApiResponse, CheckinError> {
        let response = self
            .act(
                "toggleUserStatus",
                &[
                    ("userId", user.user_id.clone()),
                    ("action", action.as_api_str().to_string()),
                ],
                &format!("已成功{}「{}」", action.label(), user.name),
                "操作失敗",
            )
            .await?;

        let is_self =
            self.ctx.session_user_id().await.as_deref() == Some(user.user_id.as_str());
        if is_self && action == AccountAction::Disable {
            warn!("Current account {} was disabled; clearing session", user.user_id);
            self.ctx.notifier.warning("您的帳號已被停用，即將登出...");
            let mut session = self.ctx.client.session().lock().await;
            session.clear_session();
            session.save()?;
        }
        Ok(response)
    }

    pub async fn rename_employee(
        &self,
        user_id: &str,
        new_name: &str,
    ) -> Result<ApiResponse, CheckinError> {
        let name = check_employee_name(new_name)
            .map_err(|e| self.reject_form("updateEmployeeName", e))?;
        let response = self
            .ctx
            .client
            .call(
                "updateEmployeeName",
                &[("userId", user_id.to_string()), ("newName", name.clone())],
            )
            .await
            .inspect_err(|e| self.ctx.report_error("updateEmployeeName", e))?;
        if response.ok() {
            let updated = response.field::<String>("newName").unwrap_or(name);
            self.ctx
                .notifier
                .success(&format!("✅ 姓名已更新為「{}」", updated));
        } else {
            self.ctx.notifier.error(response.msg().unwrap_or("更新失敗"));
        }
        response.into_result("updateEmployeeName")
    }

    /// Announcements are readable by everyone. Failures yield an empty list.
    pub async fn announcements(&self) -> Vec<Announcement> {
        match self.ctx.client.call("getAnnouncements", &[]).await {
            Ok(response) if response.ok() => response.list("announcements"),
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!("Could not load announcements: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn add_announcement(
        &self,
        title: &str,
        content: &str,
        priority: &str,
    ) -> Result<ApiResponse, CheckinError> {
        let title =
            require_field(title, "title").map_err(|e| self.reject_form("addAnnouncement", e))?;
        let content = require_field(content, "content")
            .map_err(|e| self.reject_form("addAnnouncement", e))?;
        self.act(
            "addAnnouncement",
            &[
                ("title", title),
                ("content", content),
                ("priority", priority.to_string()),
            ],
            &self.ctx.t_or("ANNOUNCEMENT_ADDED", "公告已發布"),
            "發布失敗",
        )
        .await
    }

    pub async fn delete_announcement(&self, id: &str) -> Result<ApiResponse, CheckinError> {
        self.act(
            "deleteAnnouncement",
            &[("id", id.to_string())],
            &self.ctx.t_or("ANNOUNCEMENT_DELETED", "公告已刪除"),
            "刪除失敗",
        )
        .await
    }

    pub async fn locations(&self) -> Result<Vec<Location>, CheckinError> {
        let response = self.ctx.fetch("getLocations", &[]).await?;
        Ok(response.list("locations"))
    }

    pub async fn add_location(&self, form: &LocationForm) -> Result<ApiResponse, CheckinError> {
        let (name, lat, lng) = match (form.name.trim(), form.lat, form.lng) {
            (name, Some(lat), Some(lng)) if !name.is_empty() => (name.to_string(), lat, lng),
            _ => {
                self.ctx.notifier.error("請填寫所有欄位並取得位置");
                return Err(ValidationError::MissingCoordinates.into());
            }
        };
        let radius = form.radius.unwrap_or(DEFAULT_LOCATION_RADIUS);
        info!("Adding location {} ({}, {}) r={}", name, lat, lng, radius);
        self.act(
            "addLocation",
            &[
                ("name", name),
                ("lat", lat.to_string()),
                ("lng", lng.to_string()),
                ("radius", radius.to_string()),
            ],
            "地點新增成功！",
            "新增地點失敗",
        )
        .await
    }

    pub async fn ip_whitelist(&self) -> Result<Vec<IpWhitelistEntry>, CheckinError> {
        let response = self.ctx.fetch("getIPWhitelist", &[]).await?;
        Ok(response.list("whitelist"))
    }

    pub async fn add_ip(
        &self,
        ip_range: &str,
        description: &str,
    ) -> Result<ApiResponse, CheckinError> {
        let ip_range = require_field(ip_range, "ipRange").map_err(|e| {
            self.ctx.notifier.error("請輸入 IP 範圍");
            CheckinError::from(e)
        })?;
        self.act(
            "addIPToWhitelist",
            &[
                ("ipRange", ip_range),
                ("description", description.trim().to_string()),
            ],
            "IP 白名單已新增",
            "新增失敗",
        )
        .await
    }

    pub async fn delete_ip(&self, row_number: &str) -> Result<ApiResponse, CheckinError> {
        self.act(
            "deleteIPFromWhitelist",
            &[("rowNumber", row_number.to_string())],
            "IP 白名單已刪除",
            "刪除失敗",
        )
        .await
    }

    pub async fn punch_analysis(
        &self,
        employee_id: &str,
        month: MonthKey,
    ) -> Result<Vec<MonthlyPunchPoint>, CheckinError> {
        let response = self
            .ctx
            .fetch(
                "getEmployeeMonthlyPunchData",
                &[
                    ("employeeId", employee_id.to_string()),
                    ("yearMonth", month.to_string()),
                ],
            )
            .await?;
        Ok(response.list("data"))
    }

    /// Connectivity check against the backend's test action.
    pub async fn test_endpoint(&self) -> Result<String, CheckinError> {
        let response = match self.ctx.client.call("testEndpoint", &[]).await {
            Ok(response) => response,
            Err(e) => {
                error!("testEndpoint failed: {}", e);
                self.ctx
                    .notifier
                    .error("API 呼叫失敗，請檢查網路連線或後端服務。");
                return Err(e);
            }
        };
        if !response.ok() {
            self.ctx.notifier.error(&format!(
                "API 測試失敗：{}",
                response.msg().unwrap_or("無回應資料")
            ));
            return response.into_result("testEndpoint").map(|_| String::new());
        }
        let body = serde_json::to_string(response.as_map())?;
        let message = format!("API 測試成功！回應：{}", body);
        self.ctx.notifier.success(&message);
        Ok(message)
    }
}

pub fn render_review_requests(requests: &[ReviewRequest], t: &Translations) -> String {
    if requests.is_empty() {
        return format!("{}\n", t.t_or("NO_PENDING_REQUESTS", "目前沒有待審核的申請"));
    }
    let mut out = String::new();
    for request in requests {
        let _ = writeln!(
            out,
            "[{}] {} ({}) {}",
            request.id,
            request.name,
            request.remark,
            t.t(&request.request_type)
        );
        let _ = writeln!(out, "    {}", request.application_period);
        if !request.note.is_empty() {
            let _ = writeln!(out, "    📝 補打卡理由：{}", request.note);
        }
    }
    out
}

pub fn render_users(users: &[&UserSummary], stats: UserStats) -> String {
    let mut out = format!(
        "總人數 {} / 管理員 {} / 員工 {}\n",
        stats.total, stats.admins, stats.employees
    );
    for user in users {
        let role = if user.is_admin() { "管理員" } else { "員工" };
        let state = if user.is_disabled() { " [停用]" } else { "" };
        let _ = writeln!(
            out,
            "{:<10} {:<12} {:<8} {}{}",
            user.user_id, user.name, user.dept, role, state
        );
    }
    out
}

/// The dashboard shows the newest few announcements.
pub fn render_announcements(items: &[Announcement], limit: Option<usize>) -> String {
    let shown = limit.unwrap_or(items.len()).min(items.len());
    if shown == 0 {
        return "目前沒有公告\n".to_string();
    }
    let mut out = String::new();
    for a in &items[..shown] {
        let date = a.created_at.get(..10).unwrap_or(&a.created_at);
        let _ = writeln!(out, "{} {}  ({}) [{}]", priority_icon(&a.priority), a.title, date, a.id);
        let _ = writeln!(out, "    {}", a.content);
    }
    out
}

pub fn render_locations(locations: &[Location]) -> String {
    let mut out = String::new();
    for location in locations {
        let coord = |v: Option<f64>| v.map(|v| format!("{:.6}", v)).unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "{:<16} {}, {}  r={}m",
            location.name,
            coord(location.lat),
            coord(location.lng),
            location.scope_meters()
        );
    }
    out
}

pub fn render_ip_whitelist(entries: &[IpWhitelistEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "#{:<4} {:<20} {}",
            entry.row_number.as_deref().unwrap_or("-"),
            entry.ip_range,
            entry.description
        );
    }
    out
}

/// Date, work hours and punch times as decimal hours.
pub fn render_punch_analysis(points: &[MonthlyPunchPoint]) -> String {
    if points.is_empty() {
        return "本月無打卡資料\n".to_string();
    }
    let decimal = |raw: &str| {
        time_to_decimal(raw)
            .map(|d| format!("{:.2}", d))
            .unwrap_or_else(|| "-".into())
    };
    let mut out = String::from("日期   工時   上班   下班\n");
    for point in points {
        let day = point.date.get(5..).unwrap_or(&point.date);
        let hours = point
            .work_hours
            .map(|h| h.normalize().to_string())
            .unwrap_or_else(|| "0".into());
        let _ = writeln!(
            out,
            "{:<6} {:<6} {:<6} {}",
            day,
            hours,
            decimal(&point.punch_in),
            decimal(&point.punch_out)
        );
    }
    out
}
