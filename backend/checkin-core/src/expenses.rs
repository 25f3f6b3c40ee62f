// src/expenses.rs
//
// Advance and reimbursement applications, their review queues, and the
// invoice OCR helper.

use crate::api_client::{io_context, ApiResponse, CheckinError};
use crate::context::AppContext;
use crate::i18n::Translations;
use crate::models::{
    AdvanceApplication, ApplicationStatus, OcrInvoice, ReimbursementApplication, ReviewDecision,
};
use crate::punch::InFlightGuard;
use crate::validation::{parse_positive_amount, require_field, require_reason, ValidationError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::fmt::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use tracing::{info, warn};

pub const MAX_INVOICE_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
pub const INVOICE_IMAGE_EXTENSIONS: [&str; 5] = ["jpeg", "jpg", "png", "gif", "webp"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceForm {
    pub date: String,
    pub amount: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReimbursementForm {
    pub date: String,
    pub summary: String,
    pub amount: String,
    pub invoice_number: String,
    pub note: String,
}

impl OcrInvoice {
    /// Prefills a reimbursement with what the receipt shows. Only digits
    /// are kept from the amount.
    pub fn reimbursement_draft(&self) -> ReimbursementForm {
        ReimbursementForm {
            date: self.invoice_date.clone(),
            summary: self.store_name.clone(),
            amount: self.amount.chars().filter(char::is_ascii_digit).collect(),
            invoice_number: self.invoice_number.clone(),
            note: String::new(),
        }
    }
}

/// Returns the trimmed purpose.
pub fn validate_advance(form: &AdvanceForm) -> Result<String, ValidationError> {
    require_field(&form.date, "date")?;
    require_field(&form.amount, "amount")?;
    require_field(&form.purpose, "purpose")?;
    parse_positive_amount(&form.amount)?;
    require_reason(&form.purpose)
}

pub fn validate_reimbursement(form: &ReimbursementForm) -> Result<(), ValidationError> {
    require_field(&form.summary, "summary")?;
    require_field(&form.amount, "amount")?;
    require_field(&form.date, "date")?;
    Ok(())
}

/// Checks the file extension and size before anything is read.
pub fn check_invoice_image(path: &Path, size: u64) -> Result<(), ValidationError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !INVOICE_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ValidationError::UnsupportedFileType(extension));
    }
    if size > MAX_INVOICE_IMAGE_BYTES {
        return Err(ValidationError::FileTooLarge(size));
    }
    Ok(())
}

/// The OCR result sits in `data.data`, or in `data` on older deployments.
pub fn unwrap_ocr_payload(response: &ApiResponse) -> Option<OcrInvoice> {
    let data = response.get("data")?;
    let inner = match data.get("data") {
        Some(nested @ Value::Object(_)) => nested,
        _ => data,
    };
    if !inner.is_object() {
        return None;
    }
    serde_json::from_value(inner.clone()).ok()
}

pub struct ExpenseService {
    ctx: AppContext,
    reimbursement_in_flight: AtomicBool,
}

impl ExpenseService {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            reimbursement_in_flight: AtomicBool::new(false),
        }
    }

    fn notify_msg(&self, response: &ApiResponse, success: &str, failure: &str) {
        if response.ok() {
            self.ctx.notifier.success(response.msg().unwrap_or(success));
        } else {
            self.ctx.notifier.error(response.msg().unwrap_or(failure));
        }
    }

    fn fail_validation(&self, action: &str, e: ValidationError) -> CheckinError {
        let e = CheckinError::from(e);
        self.ctx.report_error(action, &e);
        e
    }

    pub async fn submit_advance(&self, form: &AdvanceForm) -> Result<ApiResponse, CheckinError> {
        let purpose =
            validate_advance(form).map_err(|e| self.fail_validation("submitAdvanceApplication", e))?;
        let user_id = self.ctx.session_user_id().await.unwrap_or_default();
        info!("Submitting advance of {} for {}", form.amount.trim(), user_id);

        let response = self
            .ctx
            .client
            .call(
                "submitAdvanceApplication",
                &[
                    ("date", form.date.trim().to_string()),
                    ("amount", form.amount.trim().to_string()),
                    ("purpose", purpose),
                    ("userId", user_id),
                ],
            )
            .await
            .inspect_err(|e| self.ctx.report_error("submitAdvanceApplication", e))?;

        self.notify_msg(&response, "預支申請已送出，等待審核", "申請失敗，請稍後再試");
        response.into_result("submitAdvanceApplication")
    }

    /// POSTs the reimbursement as JSON. A second call while one is pending
    /// is rejected.
    pub async fn submit_reimbursement(
        &self,
        form: &ReimbursementForm,
    ) -> Result<ApiResponse, CheckinError> {
        let _guard = InFlightGuard::acquire(&self.reimbursement_in_flight).inspect_err(|_| {
            warn!("Reimbursement submission already in progress");
        })?;

        validate_reimbursement(form).map_err(|e| self.fail_validation("submitReimbursement", e))?;
        if !self.ctx.has_token().await {
            self.ctx
                .notifier
                .error(&self.ctx.t_or("ERR_SESSION_EXPIRED", "未登入或 Session 已過期，請重新登入"));
            return Err(CheckinError::NotLoggedIn);
        }

        info!("Submitting reimbursement '{}' ({})", form.summary.trim(), form.amount.trim());
        let body = json!({
            "date": form.date.trim(),
            "summary": form.summary.trim(),
            "amount": form.amount.trim(),
            "invoiceNumber": form.invoice_number.trim(),
            "note": form.note.trim(),
        });
        let response = self
            .ctx
            .client
            .post_json("submitReimbursement", body)
            .await
            .inspect_err(|e| self.ctx.report_error("submitReimbursement", e))?;

        if response.ok() {
            self.ctx.notifier.success("報銷申請已送出！");
        } else {
            self.ctx.notifier.error(&format!(
                "系統錯誤：{}",
                response.msg().unwrap_or("提交失敗")
            ));
        }
        response.into_result("submitReimbursement")
    }

    pub async fn advance_records(&self) -> Result<Vec<AdvanceApplication>, CheckinError> {
        let user_id = self.ctx.session_user_id().await.unwrap_or_default();
        let response = self
            .ctx
            .fetch("getAdvanceRecords", &[("userId", user_id)])
            .await?;
        Ok(response.records())
    }

    pub async fn reimbursement_records(
        &self,
    ) -> Result<Vec<ReimbursementApplication>, CheckinError> {
        let user_id = self.ctx.session_user_id().await.unwrap_or_default();
        let response = self
            .ctx
            .fetch("getReimbursementRecords", &[("userId", user_id)])
            .await?;
        Ok(response.records())
    }

    pub async fn pending_advances(&self) -> Result<Vec<AdvanceApplication>, CheckinError> {
        let response = self.ctx.fetch("getPendingAdvanceRequests", &[]).await?;
        Ok(response.records())
    }

    pub async fn pending_reimbursements(
        &self,
    ) -> Result<Vec<ReimbursementApplication>, CheckinError> {
        let response = self
            .ctx
            .fetch("getPendingReimbursementRequests", &[])
            .await?;
        Ok(response.records())
    }

    pub async fn review_advance(
        &self,
        id: &str,
        decision: ReviewDecision,
        comment: &str,
    ) -> Result<ApiResponse, CheckinError> {
        self.review("reviewAdvanceApplication", id, decision, comment)
            .await
    }

    pub async fn review_reimbursement(
        &self,
        id: &str,
        decision: ReviewDecision,
        comment: &str,
    ) -> Result<ApiResponse, CheckinError> {
        self.review("reviewReimbursement", id, decision, comment)
            .await
    }

    async fn review(
        &self,
        action: &str,
        id: &str,
        decision: ReviewDecision,
        comment: &str,
    ) -> Result<ApiResponse, CheckinError> {
        let reviewer_id = self.ctx.session_user_id().await.unwrap_or_default();
        info!("{} {} -> {} by {}", action, id, decision.as_api_str(), reviewer_id);
        let response = self
            .ctx
            .client
            .call(
                action,
                &[
                    ("id", id.to_string()),
                    ("action", decision.as_api_str().to_string()),
                    ("comment", comment.trim().to_string()),
                    ("reviewerId", reviewer_id),
                ],
            )
            .await
            .inspect_err(|e| self.ctx.report_error(action, e))?;

        let done = match decision {
            ReviewDecision::Approve => "已核准申請",
            ReviewDecision::Reject => "已拒絕申請",
        };
        self.notify_msg(&response, done, "操作失敗");
        response.into_result(action)
    }

    /// Sends a receipt image for recognition and returns what was read.
    pub async fn recognize_invoice(&self, path: &Path) -> Result<OcrInvoice, CheckinError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| io_context(e, format!("Failed to stat invoice image: {:?}", path)))?;
        check_invoice_image(path, metadata.len())
            .map_err(|e| self.fail_validation("invoiceOCR", e))?;
        if !self.ctx.has_token().await {
            self.ctx.notifier.error(&self.ctx.t_or("ERR_LOGIN_REQUIRED", "請先登入"));
            return Err(CheckinError::NotLoggedIn);
        }

        let bytes = std::fs::read(path)
            .map_err(|e| io_context(e, format!("Failed to read invoice image: {:?}", path)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("Sending {} ({} bytes) for OCR", file_name, bytes.len());

        let body = json!({
            "imageData": STANDARD.encode(&bytes),
            "fileName": file_name,
        });
        let response = self
            .ctx
            .client
            .post_json("invoiceOCR", body)
            .await
            .inspect_err(|e| self.ctx.report_error("invoiceOCR", e))?;

        let invoice = if response.ok() {
            unwrap_ocr_payload(&response)
        } else {
            None
        };
        match invoice {
            Some(invoice) => {
                self.ctx.notifier.success("✅ 發票辨識成功！");
                Ok(invoice)
            }
            None => {
                let msg = response.msg().unwrap_or("OCR 資料格式錯誤").to_string();
                self.ctx.notifier.error(&format!("辨識失敗：{}", msg));
                Err(CheckinError::Backend {
                    action: "invoiceOCR".into(),
                    code: response.code().unwrap_or_default().to_string(),
                    msg,
                })
            }
        }
    }
}

pub fn status_label(raw: &str, t: &Translations) -> String {
    let status = ApplicationStatus::from_raw(raw);
    let icon = match status {
        ApplicationStatus::Pending => "⏳",
        ApplicationStatus::Approved => "✅",
        ApplicationStatus::Rejected => "❌",
    };
    format!("{} {}", icon, t.t_or(status.label_key(), status.fallback_label()))
}

fn amount_text(amount: Option<Decimal>) -> String {
    amount
        .map(|a| format!("NT$ {}", a.normalize()))
        .unwrap_or_else(|| "NT$ -".into())
}

pub fn render_advance_records(records: &[AdvanceApplication], t: &Translations) -> String {
    if records.is_empty() {
        return format!("{}\n", t.t_or("NO_RECORDS", "尚無申請記錄"));
    }
    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            out,
            "{} {} {}  {}",
            record.date,
            amount_text(record.amount),
            status_label(&record.status, t),
            record.purpose
        );
        if !record.review_comment.is_empty() {
            let _ = writeln!(out, "    審核意見：{}", record.review_comment);
        }
    }
    out
}

pub fn render_reimbursement_records(
    records: &[ReimbursementApplication],
    t: &Translations,
) -> String {
    if records.is_empty() {
        return format!("{}\n", t.t_or("NO_RECORDS", "尚無申請記錄"));
    }
    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            out,
            "{} {} {}  {}",
            record.date,
            amount_text(record.amount),
            status_label(&record.status, t),
            record.summary
        );
        if !record.invoice_number.is_empty() {
            let _ = writeln!(out, "    發票號碼：{}", record.invoice_number);
        }
        if !record.review_comment.is_empty() {
            let _ = writeln!(out, "    審核意見：{}", record.review_comment);
        }
    }
    out
}

pub fn render_pending_expenses<'a, I>(items: I, t: &Translations) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a str, Option<Decimal>, &'a str)>,
{
    let mut out = String::new();
    for (id, user, date, amount, text) in items {
        let _ = writeln!(out, "[{}] {} {} {}  {}", id, user, date, amount_text(amount), text);
    }
    if out.is_empty() {
        out = format!("{}\n", t.t_or("NO_PENDING_REQUESTS", "目前沒有待審核的申請"));
    }
    out
}

pub fn render_invoice(invoice: &OcrInvoice) -> String {
    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
    let mut out = String::new();
    let _ = writeln!(out, "發票號碼: {}", or_dash(&invoice.invoice_number));
    let _ = writeln!(out, "日期:     {}", or_dash(&invoice.invoice_date));
    let _ = writeln!(out, "時間:     {}", or_dash(&invoice.invoice_time));
    let _ = writeln!(out, "金額:     {}", or_dash(&invoice.amount));
    let _ = writeln!(out, "商店:     {}", or_dash(&invoice.store_name));
    let _ = writeln!(out, "期別:     {}", or_dash(&invoice.period));
    let _ = writeln!(out, "隨機碼:   {}", or_dash(&invoice.random_code));
    let _ = writeln!(out, "統編:     {}", or_dash(&invoice.seller_tax_id));
    let _ = writeln!(out, "地址:     {}", or_dash(&invoice.store_address));
    let _ = writeln!(out, "電話:     {}", or_dash(&invoice.store_phone));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;
    use crate::test_support::{logged_in_context, logged_out_context, teardown, MockBackend};
    use std::path::PathBuf;

    fn advance_form() -> AdvanceForm {
        AdvanceForm {
            date: "2025-03-10".into(),
            amount: "1500".into(),
            purpose: " 出差住宿 ".into(),
        }
    }

    fn reimbursement_form() -> ReimbursementForm {
        ReimbursementForm {
            date: "2025-03-08".into(),
            summary: "計程車".into(),
            amount: "320".into(),
            invoice_number: "AB12345678".into(),
            note: String::new(),
        }
    }

    fn write_image(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}_{}", std::process::id(), name));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_advance_validation() {
        assert_eq!(validate_advance(&advance_form()), Ok("出差住宿".to_string()));

        let mut form = advance_form();
        form.amount = "0".into();
        assert!(matches!(
            validate_advance(&form),
            Err(ValidationError::InvalidAmount(_))
        ));

        let mut form = advance_form();
        form.purpose = "車".into();
        assert_eq!(validate_advance(&form), Err(ValidationError::ReasonTooShort));

        let mut form = advance_form();
        form.date = " ".into();
        assert_eq!(
            validate_advance(&form),
            Err(ValidationError::MissingField("date"))
        );
    }

    #[test]
    fn test_invoice_image_checks() {
        assert!(check_invoice_image(Path::new("r.JPG"), 1024).is_ok());
        assert!(matches!(
            check_invoice_image(Path::new("r.pdf"), 1024),
            Err(ValidationError::UnsupportedFileType(_))
        ));
        assert_eq!(
            check_invoice_image(Path::new("r.png"), MAX_INVOICE_IMAGE_BYTES + 1),
            Err(ValidationError::FileTooLarge(MAX_INVOICE_IMAGE_BYTES + 1))
        );
    }

    #[test]
    fn test_reimbursement_draft_keeps_digits_only() {
        let invoice = OcrInvoice {
            invoice_number: "AB12345678".into(),
            invoice_date: "2025-03-08".into(),
            amount: "NT$1,280".into(),
            store_name: "全家便利商店".into(),
            ..Default::default()
        };
        let draft = invoice.reimbursement_draft();
        assert_eq!(draft.amount, "1280");
        assert_eq!(draft.summary, "全家便利商店");
        assert_eq!(draft.date, "2025-03-08");
    }

    #[test]
    fn test_status_label() {
        let t = Translations::default();
        assert_eq!(status_label("approved", &t), "✅ 已核准");
        assert_eq!(status_label("", &t), "⏳ 審核中");
    }

    #[tokio::test]
    async fn test_submit_advance_uses_backend_msg() {
        let backend = MockBackend::start().await;
        backend.reply(
            "submitAdvanceApplication",
            serde_json::json!({ "ok": true, "msg": "已送出" }),
        );
        let (ctx, notifier, path) = logged_in_context(&backend, "expense_advance").await;
        let service = ExpenseService::new(ctx);

        service.submit_advance(&advance_form()).await.unwrap();
        let call = &backend.calls_to("submitAdvanceApplication")[0];
        assert_eq!(call.params.get("purpose").map(String::as_str), Some("出差住宿"));
        assert_eq!(call.params.get("userId").map(String::as_str), Some("U100"));
        assert!(notifier.has(NotificationKind::Success, "已送出"));
        teardown(&path);
    }

    #[tokio::test]
    async fn test_submit_reimbursement_posts_json() {
        let backend = MockBackend::start().await;
        backend.reply("submitReimbursement", serde_json::json!({ "ok": true }));
        let (ctx, notifier, path) = logged_in_context(&backend, "expense_reimburse").await;
        let service = ExpenseService::new(ctx);

        service
            .submit_reimbursement(&reimbursement_form())
            .await
            .unwrap();
        let body = backend.calls_to("submitReimbursement")[0]
            .body
            .clone()
            .unwrap();
        assert_eq!(body["summary"], "計程車");
        assert_eq!(body["invoiceNumber"], "AB12345678");
        assert_eq!(body["token"], "tok-1");
        assert!(notifier.has(NotificationKind::Success, "報銷申請已送出！"));
        teardown(&path);
    }

    #[tokio::test]
    async fn test_reimbursement_requires_login() {
        let backend = MockBackend::start().await;
        let (ctx, notifier, path) = logged_out_context(&backend, "expense_no_login").await;
        let service = ExpenseService::new(ctx);

        let result = service.submit_reimbursement(&reimbursement_form()).await;
        assert!(matches!(result, Err(CheckinError::NotLoggedIn)));
        assert!(notifier.has(
            NotificationKind::Error,
            "未登入或 Session 已過期，請重新登入"
        ));
        assert!(backend.calls().is_empty());
        teardown(&path);
    }

    #[tokio::test]
    async fn test_review_failure_falls_back_to_generic_message() {
        let backend = MockBackend::start().await;
        backend.reply("reviewReimbursement", serde_json::json!({ "ok": false }));
        let (ctx, notifier, path) = logged_in_context(&backend, "expense_review").await;
        let service = ExpenseService::new(ctx);

        let result = service
            .review_reimbursement("R7", ReviewDecision::Approve, "")
            .await;
        assert!(result.is_err());
        assert!(notifier.has(NotificationKind::Error, "操作失敗"));
        let call = &backend.calls_to("reviewReimbursement")[0];
        assert_eq!(call.params.get("action").map(String::as_str), Some("approve"));
        assert_eq!(call.params.get("reviewerId").map(String::as_str), Some("U100"));
        teardown(&path);
    }

    #[tokio::test]
    async fn test_recognize_invoice_unwraps_nested_data() {
        let backend = MockBackend::start().await;
        backend.reply(
            "invoiceOCR",
            serde_json::json!({
                "ok": true,
                "data": { "data": { "invoiceNumber": "CD87654321", "amount": 85 } }
            }),
        );
        let (ctx, notifier, path) = logged_in_context(&backend, "expense_ocr").await;
        let image = write_image("receipt.png", &[0x89, b'P', b'N', b'G']);
        let service = ExpenseService::new(ctx);

        let invoice = service.recognize_invoice(&image).await.unwrap();
        assert_eq!(invoice.invoice_number, "CD87654321");
        assert_eq!(invoice.amount, "85");
        assert!(notifier.has(NotificationKind::Success, "✅ 發票辨識成功！"));

        let body = backend.calls_to("invoiceOCR")[0].body.clone().unwrap();
        assert_eq!(body["imageData"], STANDARD.encode([0x89, b'P', b'N', b'G']));
        assert!(body["fileName"].as_str().unwrap().ends_with("receipt.png"));
        let _ = std::fs::remove_file(&image);
        teardown(&path);
    }
}
