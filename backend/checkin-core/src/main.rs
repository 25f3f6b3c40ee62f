use anyhow::{anyhow, bail, Context};
use chrono::{Local, NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod admin;
mod api_client;
mod applications;
mod auth;
mod cache;
mod calendar;
mod config;
mod context;
mod expenses;
mod export;
mod geo;
mod holidays;
mod i18n;
mod models;
mod notify;
mod punch;
mod session_check;
mod session_store;
mod shifts;
mod status;
mod validation;
mod work_hours;

#[cfg(test)]
mod auth_tests;
#[cfg(test)]
mod test_support;

use admin::{AccountAction, AdminService, LocationForm, UserRole, UserStats};
use api_client::{CheckinClient, CheckinError};
use applications::{ApplicationService, LeaveForm, OvertimeForm};
use auth::LoginState;
use cache::{AttendanceBook, ShiftCache};
use calendar::{CalendarView, MonthKey};
use config::AppConfig;
use context::AppContext;
use expenses::{AdvanceForm, ExpenseService, ReimbursementForm};
use export::ExportService;
use i18n::{detect_language, is_supported_language, Translations, SUPPORTED_LANGUAGES};
use models::{Coordinates, PunchKind, ReviewDecision, UserProfile, UserSummary};
use notify::{ConsoleNotifier, Notifier};
use punch::{AdjustRequest, PunchService};
use session_check::SessionCheckOutcome;
use session_store::SessionStore;
use shifts::ShiftService;
use validation::ValidationError;
use work_hours::{round2, time_difference_minutes, MonthlyStats};

#[derive(Parser)]
#[command(name = "checkin")]
#[command(about = "Attendance client: punches, calendar, applications and admin review")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Default)]
struct LocationArgs {
    /// Latitude; falls back to CHECKIN_DEFAULT_LAT
    #[arg(long, allow_negative_numbers = true)]
    lat: Option<f64>,
    /// Longitude; falls back to CHECKIN_DEFAULT_LNG
    #[arg(long, allow_negative_numbers = true)]
    lng: Option<f64>,
}

#[derive(Subcommand)]
enum Command {
    /// Log in through the identity provider
    Login {
        /// One-time code from the login redirect; skips the local callback listener
        #[arg(long)]
        code: Option<String>,
    },
    Logout,
    /// Show the logged-in user
    Whoami,
    Punch {
        #[arg(value_enum)]
        kind: PunchKind,
        #[command(flatten)]
        location: LocationArgs,
        #[arg(long)]
        note: Option<String>,
    },
    /// Month grid with attendance markers
    Calendar {
        /// YYYY-MM, defaults to the current month
        #[arg(long)]
        month: Option<MonthKey>,
    },
    /// Punches and status for one day
    Day { date: NaiveDate },
    /// Days the backend flags as abnormal
    Abnormal {
        #[arg(long)]
        month: Option<MonthKey>,
    },
    /// Request a makeup punch
    Adjust {
        #[arg(value_enum)]
        kind: PunchKind,
        #[arg(long)]
        date: NaiveDate,
        /// HH:MM, defaults to 08:30 for in and 17:30 for out
        #[arg(long)]
        time: Option<NaiveTime>,
        #[arg(long)]
        reason: String,
        #[command(flatten)]
        location: LocationArgs,
    },
    Shifts {
        #[command(subcommand)]
        command: ShiftCommand,
    },
    Overtime {
        #[command(subcommand)]
        command: OvertimeCommand,
    },
    Leave {
        #[command(subcommand)]
        command: LeaveCommand,
    },
    Expense {
        #[command(subcommand)]
        command: ExpenseCommand,
    },
    /// Write this month's attendance as CSV
    Export {
        #[arg(long)]
        month: Option<MonthKey>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
    /// Latest announcements
    Announcements,
    /// Show or change the display language
    Lang { lang: Option<String> },
    Biometric {
        #[command(subcommand)]
        command: BiometricCommand,
    },
}

#[derive(Subcommand)]
enum ShiftCommand {
    Today,
    Week,
}

#[derive(Subcommand)]
enum OvertimeCommand {
    Apply {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Derived from start and end when omitted
        #[arg(long)]
        hours: Option<Decimal>,
        #[arg(long)]
        reason: String,
    },
    /// Apply for the overtime detected from a day's punches
    Quick {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
enum LeaveCommand {
    Apply {
        #[arg(long)]
        leave_type: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
enum ExpenseCommand {
    Advance {
        #[arg(long)]
        date: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        purpose: String,
    },
    Reimburse {
        #[arg(long)]
        date: String,
        #[arg(long)]
        summary: String,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "")]
        invoice_number: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Your advance and reimbursement applications
    Records,
    /// Read a receipt image
    Ocr {
        file: PathBuf,
        /// Submit a reimbursement prefilled from the receipt
        #[arg(long)]
        submit: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ApplicationKind {
    Overtime,
    Leave,
    Advance,
    Reimbursement,
}

#[derive(Subcommand)]
enum AdminCommand {
    /// Pending makeup punches
    Reviews,
    Approve { id: String },
    Reject { id: String },
    Users {
        /// Name or department substring
        #[arg(long, default_value = "")]
        filter: String,
    },
    SetRole {
        user_id: String,
        #[arg(value_enum)]
        role: UserRole,
    },
    DeleteUser { user_id: String },
    SetStatus {
        user_id: String,
        #[arg(value_enum)]
        action: AccountAction,
    },
    Rename { user_id: String, name: String },
    Announcements,
    AddAnnouncement {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long, default_value = "medium")]
        priority: String,
    },
    DeleteAnnouncement { id: String },
    Locations,
    AddLocation {
        #[arg(long)]
        name: String,
        #[command(flatten)]
        location: LocationArgs,
        #[arg(long)]
        radius: Option<u32>,
    },
    SearchLocation { query: String },
    Ip,
    AddIp {
        ip_range: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    DeleteIp { row_number: String },
    /// Monthly punch times for one employee
    Analysis {
        employee_id: String,
        #[arg(long)]
        month: Option<MonthKey>,
    },
    Pending {
        #[arg(value_enum)]
        kind: ApplicationKind,
    },
    Review {
        #[arg(value_enum)]
        kind: ApplicationKind,
        id: String,
        #[arg(value_enum)]
        decision: ReviewDecision,
        #[arg(long, default_value = "")]
        comment: String,
    },
    ExportAll {
        #[arg(long)]
        month: Option<MonthKey>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    ExportEmployee {
        employee_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        month: Option<MonthKey>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    TestEndpoint,
}

#[derive(Subcommand)]
enum BiometricCommand {
    Status,
    /// Bind a platform credential id to the logged-in user
    Bind {
        #[arg(long)]
        credential: String,
    },
    Reset,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn month_or_current(month: Option<MonthKey>) -> MonthKey {
    month.unwrap_or_else(|| MonthKey::of(today()))
}

fn resolve_coordinates(
    ctx: &AppContext,
    args: &LocationArgs,
) -> Result<Coordinates, CheckinError> {
    let coords = match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => Some((lat, lng)),
        _ => ctx.client.config().default_coordinates(),
    };
    coords
        .map(|(lat, lng)| Coordinates { lat, lng })
        .ok_or_else(|| {
            let e = CheckinError::from(ValidationError::MissingCoordinates);
            ctx.report_error("geolocation", &e);
            e
        })
}

/// Resolves the current user or stops with a login hint. A background
/// session check, if one was started, is parked in `pending_check`.
async fn require_user(
    ctx: &AppContext,
    pending_check: &mut Option<JoinHandle<SessionCheckOutcome>>,
) -> anyhow::Result<UserProfile> {
    let outcome = auth::ensure_login(ctx).await;
    *pending_check = outcome.session_check;
    match outcome.state {
        LoginState::LoggedIn(info) => Ok(info.user),
        LoginState::LoggedOut => bail!("Not logged in. Run `checkin login` first."),
    }
}

async fn find_user(admin: &AdminService, user_id: &str) -> anyhow::Result<UserSummary> {
    admin
        .users()
        .await?
        .into_iter()
        .find(|u| u.user_id == user_id)
        .ok_or_else(|| anyhow!("No user with id {}", user_id))
}

async fn run(
    command: Command,
    ctx: &AppContext,
    pending_check: &mut Option<JoinHandle<SessionCheckOutcome>>,
) -> anyhow::Result<()> {
    let t = ctx.i18n.clone();
    match command {
        Command::Login { code } => {
            let code = match code {
                Some(code) => code,
                None => {
                    let url = auth::login_url(ctx).await.context("Failed to get login URL")?;
                    println!("Open this URL in a browser to log in:\n{}", url);
                    auth::wait_for_login_code(ctx.client.config())
                        .await
                        .context("Login callback failed")?
                }
            };
            let info = auth::complete_login(ctx, &code).await?;
            println!("{} ({})", info.user.name, info.user.dept);
            if !info.abnormal_records.is_empty() {
                let entries = status::abnormal_entries(&info.abnormal_records);
                print!("{}", status::render_abnormal_list(&entries, &t));
            }
        }
        Command::Logout => {
            auth::logout(ctx).await?;
            println!("{}", t.t_or("LOGOUT_SUCCESS", "已登出"));
        }
        Command::Whoami => {
            let outcome = auth::ensure_login(ctx).await;
            *pending_check = outcome.session_check;
            match outcome.state {
                LoginState::LoggedIn(info) => {
                    let role = if info.user.is_admin() { "管理員" } else { "員工" };
                    println!(
                        "{} [{}] {} / {}{}",
                        info.user.name,
                        info.user.user_id,
                        info.user.dept,
                        role,
                        if info.from_cache { " (cached)" } else { "" }
                    );
                    if !info.abnormal_records.is_empty() {
                        let entries = status::abnormal_entries(&info.abnormal_records);
                        print!("{}", status::render_abnormal_list(&entries, &t));
                    }
                }
                LoginState::LoggedOut => println!("{}", t.t_or("SUBTITLE_LOGIN", "請先登入")),
            }
        }
        Command::Punch {
            kind,
            location,
            note,
        } => {
            require_user(ctx, pending_check).await?;
            let coords = resolve_coordinates(ctx, &location)?;
            let service = PunchService::new(ctx.clone(), ShiftCache::shared());
            service.punch(kind, coords, note.as_deref()).await?;
        }
        Command::Calendar { month } => {
            let user = require_user(ctx, pending_check).await?;
            let month = month_or_current(month);
            let mut book = AttendanceBook::new(ctx.client.clone(), Some(user.user_id));
            let records = book.month_records(month).await?;
            let view = CalendarView::build(month, today(), records);
            print!("{}", view.render_text(&t));
            let stats = MonthlyStats::from_records(records);
            println!(
                "{} {} / {} {} / {} {} / {} {}",
                t.t_or("WORK_DAYS", "出勤天數"),
                stats.work_days,
                t.t_or("NORMAL_DAYS", "正常"),
                stats.normal_days,
                t.t_or("ABNORMAL_DAYS", "異常"),
                stats.abnormal_count,
                t.t_or("TOTAL_OVERTIME", "加班時數"),
                stats.overtime_display()
            );
        }
        Command::Day { date } => {
            let user = require_user(ctx, pending_check).await?;
            let mut book = AttendanceBook::new(ctx.client.clone(), Some(user.user_id));
            let records = book.records_for_day(date).await?;
            let refs: Vec<_> = records.iter().collect();
            print!(
                "{}",
                calendar::render_day(&date.format("%Y-%m-%d").to_string(), &refs, &t)
            );
        }
        Command::Abnormal { month } => {
            require_user(ctx, pending_check).await?;
            let records = punch::fetch_abnormal_records(ctx, month_or_current(month)).await?;
            let entries = status::abnormal_entries(&records);
            print!("{}", status::render_abnormal_list(&entries, &t));
        }
        Command::Adjust {
            kind,
            date,
            time,
            reason,
            location,
        } => {
            let user = require_user(ctx, pending_check).await?;
            let coords = resolve_coordinates(ctx, &location)?;
            let request = AdjustRequest {
                kind,
                datetime: Some(date.and_time(time.unwrap_or_else(|| punch::default_adjust_time(kind)))),
                reason,
                coords,
            };
            let mut book = AttendanceBook::new(ctx.client.clone(), Some(user.user_id));
            let service = PunchService::new(ctx.clone(), ShiftCache::shared());
            match service.adjust_punch(&request, today(), &mut book).await? {
                Some(refreshed) => {
                    let entries = status::abnormal_entries(&refreshed);
                    print!("{}", status::render_abnormal_list(&entries, &t));
                }
                None => println!(
                    "{}",
                    t.t_or("ABNORMAL_REFRESH_FAILED", "異常記錄更新失敗，請執行 `checkin abnormal` 重新查詢")
                ),
            }
        }
        Command::Shifts { command } => {
            require_user(ctx, pending_check).await?;
            let service = ShiftService::new(ctx.clone(), ShiftCache::shared());
            match command {
                ShiftCommand::Today => {
                    let shift = service.today_shift(today()).await?;
                    print!("{}", shifts::render_today_shift(shift.as_ref(), &t));
                }
                ShiftCommand::Week => {
                    let week = service.week_shifts(today()).await?;
                    print!("{}", shifts::render_week_shifts(&week, &t));
                }
            }
        }
        Command::Overtime { command } => {
            let user = require_user(ctx, pending_check).await?;
            let service = ApplicationService::new(ctx.clone());
            match command {
                OvertimeCommand::Apply {
                    date,
                    start,
                    end,
                    hours,
                    reason,
                } => {
                    let hours = hours.unwrap_or_else(|| {
                        time_difference_minutes(&start, &end)
                            .map(|m| round2(Decimal::from(m) / Decimal::from(60)))
                            .unwrap_or(Decimal::ZERO)
                    });
                    let form = OvertimeForm {
                        date,
                        start_time: start,
                        end_time: end,
                        hours,
                        reason,
                    };
                    service.submit_overtime(&form).await?;
                }
                OvertimeCommand::Quick { date, reason } => {
                    let mut book = AttendanceBook::new(ctx.client.clone(), Some(user.user_id));
                    let records = book.records_for_day(date).await?;
                    let form = records
                        .iter()
                        .find_map(|r| applications::quick_apply_form(r, &reason));
                    match form {
                        Some(form) => {
                            println!(
                                "{} {}-{} ({} h)",
                                form.date, form.start_time, form.end_time, form.hours
                            );
                            service.submit_overtime(&form).await?;
                        }
                        None => ctx
                            .notifier
                            .info(&t.t_or("NO_OVERTIME_DETECTED", "該日沒有可申請的加班時數")),
                    }
                }
            }
        }
        Command::Leave {
            command:
                LeaveCommand::Apply {
                    leave_type,
                    start,
                    end,
                    reason,
                },
        } => {
            require_user(ctx, pending_check).await?;
            let form = LeaveForm {
                leave_type,
                start_date: start,
                end_date: end,
                reason,
            };
            ApplicationService::new(ctx.clone()).submit_leave(&form).await?;
        }
        Command::Expense { command } => {
            require_user(ctx, pending_check).await?;
            let service = ExpenseService::new(ctx.clone());
            match command {
                ExpenseCommand::Advance {
                    date,
                    amount,
                    purpose,
                } => {
                    let form = AdvanceForm {
                        date,
                        amount,
                        purpose,
                    };
                    service.submit_advance(&form).await?;
                }
                ExpenseCommand::Reimburse {
                    date,
                    summary,
                    amount,
                    invoice_number,
                    note,
                } => {
                    let form = ReimbursementForm {
                        date,
                        summary,
                        amount,
                        invoice_number,
                        note,
                    };
                    service.submit_reimbursement(&form).await?;
                }
                ExpenseCommand::Records => {
                    println!("== {} ==", t.t_or("ADVANCE_RECORDS", "預支申請"));
                    let advances = service.advance_records().await?;
                    print!("{}", expenses::render_advance_records(&advances, &t));
                    println!("== {} ==", t.t_or("REIMBURSEMENT_RECORDS", "報銷申請"));
                    let reimbursements = service.reimbursement_records().await?;
                    print!(
                        "{}",
                        expenses::render_reimbursement_records(&reimbursements, &t)
                    );
                }
                ExpenseCommand::Ocr { file, submit } => {
                    let invoice = service.recognize_invoice(&file).await?;
                    print!("{}", expenses::render_invoice(&invoice));
                    if submit {
                        service
                            .submit_reimbursement(&invoice.reimbursement_draft())
                            .await?;
                    }
                }
            }
        }
        Command::Export { month, out_dir } => {
            require_user(ctx, pending_check).await?;
            let written = ExportService::new(ctx.clone())
                .export_personal(month_or_current(month), &out_dir)
                .await?;
            if let Some(path) = written {
                println!("{}", path.display());
            }
        }
        Command::Admin { command } => {
            require_user(ctx, pending_check).await?;
            let admin_user = auth::require_admin(ctx).await?;
            run_admin(command, ctx, &admin_user).await?;
        }
        Command::Announcements => {
            require_user(ctx, pending_check).await?;
            let items = AdminService::new(ctx.clone()).announcements().await;
            print!(
                "{}",
                admin::render_announcements(&items, Some(admin::DASHBOARD_ANNOUNCEMENTS))
            );
        }
        // A requested language was validated and persisted before loading.
        Command::Lang { .. } => {
            println!("{} ({})", t.lang(), SUPPORTED_LANGUAGES.join(", "));
        }
        Command::Biometric { command } => {
            let user_id = match command {
                BiometricCommand::Bind { .. } => Some(require_user(ctx, pending_check).await?.user_id),
                _ => ctx.session_user_id().await,
            };
            let mut session = ctx.client.session().lock().await;
            match command {
                BiometricCommand::Status => match session.biometric_binding() {
                    Some((credential, user)) => {
                        let ready = user_id
                            .as_deref()
                            .is_some_and(|id| session.biometric_ready_for(id));
                        println!("{} -> {}", user, credential);
                        if !ready {
                            println!(
                                "{}",
                                t.t_or("BIOMETRIC_OTHER_USER", "綁定的帳號與目前登入者不同")
                            );
                        }
                    }
                    None => println!("{}", t.t_or("BIOMETRIC_NOT_BOUND", "尚未綁定生物辨識")),
                },
                BiometricCommand::Bind { credential } => {
                    let user_id = user_id.unwrap_or_default();
                    session.bind_biometric(credential, user_id);
                    session.save()?;
                    println!("{}", t.t_or("BIOMETRIC_SETUP_SUCCESS", "生物辨識設定成功"));
                }
                BiometricCommand::Reset => {
                    session.reset_biometric();
                    session.save()?;
                    println!("{}", t.t_or("BIOMETRIC_RESET", "已清除生物辨識綁定"));
                }
            }
        }
    }
    Ok(())
}

async fn run_admin(
    command: AdminCommand,
    ctx: &AppContext,
    admin_user: &UserProfile,
) -> anyhow::Result<()> {
    let t = ctx.i18n.clone();
    let admin = AdminService::new(ctx.clone());
    match command {
        AdminCommand::Reviews => {
            let requests = admin.review_requests().await?;
            print!("{}", admin::render_review_requests(&requests, &t));
        }
        AdminCommand::Approve { id } => {
            let remaining = admin.review_request(&id, ReviewDecision::Approve).await?;
            print!("{}", admin::render_review_requests(&remaining, &t));
        }
        AdminCommand::Reject { id } => {
            let remaining = admin.review_request(&id, ReviewDecision::Reject).await?;
            print!("{}", admin::render_review_requests(&remaining, &t));
        }
        AdminCommand::Users { filter } => {
            let users = admin.users().await?;
            let shown = admin::filter_users(&users, &filter);
            print!("{}", admin::render_users(&shown, UserStats::of(&users)));
        }
        AdminCommand::SetRole { user_id, role } => {
            let user = find_user(&admin, &user_id).await?;
            admin.update_role(&user, role).await?;
        }
        AdminCommand::DeleteUser { user_id } => {
            let user = find_user(&admin, &user_id).await?;
            admin.delete_user(&user).await?;
        }
        AdminCommand::SetStatus { user_id, action } => {
            let user = find_user(&admin, &user_id).await?;
            admin.set_account_status(&user, action).await?;
        }
        AdminCommand::Rename { user_id, name } => {
            admin.rename_employee(&user_id, &name).await?;
        }
        AdminCommand::Announcements => {
            let items = admin.announcements().await;
            print!("{}", admin::render_announcements(&items, None));
        }
        AdminCommand::AddAnnouncement {
            title,
            content,
            priority,
        } => {
            admin.add_announcement(&title, &content, &priority).await?;
        }
        AdminCommand::DeleteAnnouncement { id } => {
            admin.delete_announcement(&id).await?;
        }
        AdminCommand::Locations => {
            let locations = admin.locations().await?;
            print!("{}", admin::render_locations(&locations));
        }
        AdminCommand::AddLocation {
            name,
            location,
            radius,
        } => {
            let form = LocationForm {
                name,
                lat: location.lat,
                lng: location.lng,
                radius,
            };
            admin.add_location(&form).await?;
        }
        AdminCommand::SearchLocation { query } => {
            for place in geo::search_location(ctx, &query).await {
                println!(
                    "{}, {}  {}",
                    place.lat.map(|v| v.to_string()).unwrap_or_default(),
                    place.lng.map(|v| v.to_string()).unwrap_or_default(),
                    place.display_name
                );
            }
        }
        AdminCommand::Ip => {
            let entries = admin.ip_whitelist().await?;
            print!("{}", admin::render_ip_whitelist(&entries));
        }
        AdminCommand::AddIp {
            ip_range,
            description,
        } => {
            admin.add_ip(&ip_range, &description).await?;
        }
        AdminCommand::DeleteIp { row_number } => {
            admin.delete_ip(&row_number).await?;
        }
        AdminCommand::Analysis { employee_id, month } => {
            let points = admin
                .punch_analysis(&employee_id, month_or_current(month))
                .await?;
            print!("{}", admin::render_punch_analysis(&points));
        }
        AdminCommand::Pending { kind } => {
            let applications = ApplicationService::new(ctx.clone());
            let expenses = ExpenseService::new(ctx.clone());
            let text = match kind {
                ApplicationKind::Overtime => {
                    applications::render_pending_overtime(&applications.pending_overtime().await?, &t)
                }
                ApplicationKind::Leave => {
                    applications::render_pending_leave(&applications.pending_leave().await?, &t)
                }
                ApplicationKind::Advance => {
                    let items = expenses.pending_advances().await?;
                    expenses::render_pending_expenses(
                        items.iter().map(|a| {
                            (a.id.as_str(), a.user_name.as_str(), a.date.as_str(), a.amount, a.purpose.as_str())
                        }),
                        &t,
                    )
                }
                ApplicationKind::Reimbursement => {
                    let items = expenses.pending_reimbursements().await?;
                    expenses::render_pending_expenses(
                        items.iter().map(|r| {
                            (r.id.as_str(), r.user_name.as_str(), r.date.as_str(), r.amount, r.summary.as_str())
                        }),
                        &t,
                    )
                }
            };
            print!("{}", text);
        }
        AdminCommand::Review {
            kind,
            id,
            decision,
            comment,
        } => match kind {
            ApplicationKind::Overtime => {
                ApplicationService::new(ctx.clone())
                    .review_overtime(&id, decision, &comment, &admin_user.user_id)
                    .await?;
            }
            ApplicationKind::Leave => {
                ApplicationService::new(ctx.clone())
                    .review_leave(&id, decision, &comment, &admin_user.user_id)
                    .await?;
            }
            ApplicationKind::Advance => {
                ExpenseService::new(ctx.clone())
                    .review_advance(&id, decision, &comment)
                    .await?;
            }
            ApplicationKind::Reimbursement => {
                ExpenseService::new(ctx.clone())
                    .review_reimbursement(&id, decision, &comment)
                    .await?;
            }
        },
        AdminCommand::ExportAll { month, out_dir } => {
            let written = ExportService::new(ctx.clone())
                .export_all_employees(month_or_current(month), &out_dir)
                .await?;
            if let Some(dir) = written {
                println!("{}", dir.display());
            }
        }
        AdminCommand::ExportEmployee {
            employee_id,
            name,
            month,
            out_dir,
        } => {
            let written = ExportService::new(ctx.clone())
                .export_employee(&employee_id, name.as_deref(), month_or_current(month), &out_dir)
                .await?;
            if let Some(path) = written {
                println!("{}", path.display());
            }
        }
        AdminCommand::TestEndpoint => {
            let message = admin.test_endpoint().await?;
            println!("{}", message);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- Setup ---
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // --- Configuration & session ---
    let config = AppConfig::from_env().context("Failed to load CHECKIN_* configuration")?;
    let mut session = SessionStore::load(config.session_file.clone())
        .with_context(|| format!("Failed to load session file {:?}", config.session_file))?;

    // --- Language ---
    let requested = match &cli.command {
        Command::Lang { lang: Some(lang) } => {
            if !is_supported_language(lang) {
                bail!(
                    "Unsupported language '{}'. Choose one of: {}",
                    lang,
                    SUPPORTED_LANGUAGES.join(", ")
                );
            }
            Some(lang.clone())
        }
        _ => None,
    };
    let lang = requested
        .or_else(|| session.lang().map(str::to_string))
        .unwrap_or_else(|| detect_language(std::env::var("LANG").ok().as_deref()).to_string());
    if session.lang() != Some(lang.as_str()) {
        session.set_lang(lang.clone());
        session.save().context("Failed to persist language")?;
    }

    let client = CheckinClient::new(config, session.shared()).context("Failed to build HTTP client")?;
    let i18n = Translations::load(
        client.http(),
        &client.config().i18n_base_url,
        &lang,
        Translations::default(),
    )
    .await;
    info!("Using language {}", i18n.lang());

    let ctx = AppContext::new(client, Arc::new(ConsoleNotifier), i18n);

    // --- Run ---
    let mut pending_check = None;
    let result = run(cli.command, &ctx, &mut pending_check).await;

    if let Some(handle) = pending_check {
        match handle.await {
            Ok(SessionCheckOutcome::Expired) => {
                warn!("Session expired; run `checkin login` again")
            }
            Ok(outcome) => info!("Background session check: {:?}", outcome),
            Err(e) => error!("Session check task failed: {}", e),
        }
    }

    result
}
