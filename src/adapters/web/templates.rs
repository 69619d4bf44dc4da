//! HTML templates using Askama.
//!
//! Page templates render the `#content` fragment only; `BasePage` wraps a
//! fragment in the site layout for full page loads.

use askama::Template;

use crate::domain::admin::{AccountSummary, AdminOverview};
use crate::domain::challenge::{Challenge, PhaseRule};
use crate::domain::enrollment::{EnrollmentStatus, EnrollmentView};

use super::auth::User;
use super::notice::Notice;

/// Header links that depend on who is signed in.
#[derive(Debug, Clone, Default)]
pub struct Nav {
    pub signed_in: bool,
    pub is_admin: bool,
    pub email: String,
}

impl Nav {
    pub fn for_user(user: Option<&User>) -> Self {
        match user {
            Some(u) => Self {
                signed_in: true,
                is_admin: u.is_admin,
                email: u.email.clone(),
            },
            None => Self::default(),
        }
    }
}

#[derive(Template)]
#[template(path = "base.html")]
pub struct BasePage<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub nav: &'a Nav,
    pub notice: Option<&'a Notice>,
}

/// Notice banner sent ahead of an HTMX fragment.
#[derive(Template)]
#[template(path = "notice.html")]
pub struct NoticeTemplate<'a> {
    pub notice: &'a Notice,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub starting_price: Option<String>,
    pub tier_count: usize,
}

#[derive(Template)]
#[template(path = "about.html")]
pub struct AboutTemplate;

#[derive(Template)]
#[template(path = "evaluation_process.html")]
pub struct EvaluationProcessTemplate;

pub struct PlanOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

pub struct BalanceOption {
    pub plan: &'static str,
    /// Query-string value, e.g. `10000`.
    pub value: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "challenges.html")]
pub struct ChallengesTemplate<'a> {
    pub plans: Vec<PlanOption>,
    pub balances: Vec<BalanceOption>,
    pub selected: Option<&'a Challenge>,
    pub phases: Vec<PhaseRule>,
    pub signed_in: bool,
}

#[derive(Template)]
#[template(path = "auth.html")]
pub struct AuthTemplate<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub next: &'a str,
    pub error: Option<&'a str>,
    pub sign_up: bool,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate<'a> {
    pub display_name: &'a str,
    pub active: &'a [EnrollmentView],
    pub completed: &'a [EnrollmentView],
    pub total: usize,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: &'a str,
}

#[derive(Template)]
#[template(path = "admin_overview.html")]
pub struct AdminOverviewTemplate<'a> {
    pub overview: &'a AdminOverview,
    pub recent: &'a [EnrollmentView],
}

#[derive(Template)]
#[template(path = "admin_challenges.html")]
pub struct AdminChallengesTemplate<'a> {
    pub challenges: &'a [Challenge],
}

pub struct StatusFilter {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "admin_enrollments.html")]
pub struct AdminEnrollmentsTemplate<'a> {
    pub enrollments: &'a [EnrollmentView],
    pub filters: Vec<StatusFilter>,
    pub statuses: &'a [EnrollmentStatus],
}

impl AdminEnrollmentsTemplate<'_> {
    pub fn status_filters(selected: Option<EnrollmentStatus>) -> Vec<StatusFilter> {
        let mut filters = vec![StatusFilter {
            value: "",
            label: "all",
            selected: selected.is_none(),
        }];
        filters.extend(EnrollmentStatus::ALL.into_iter().map(|s| StatusFilter {
            value: s.as_str(),
            label: s.as_str(),
            selected: selected == Some(s),
        }));
        filters
    }
}

#[derive(Template)]
#[template(path = "admin_users.html")]
pub struct AdminUsersTemplate<'a> {
    pub users: &'a [AccountSummary],
    /// Accounts before the search narrowed them.
    pub total: usize,
    pub query: &'a str,
    pub current_user: i64,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate<'a> {
    pub message: &'a str,
    pub status: u16,
}
