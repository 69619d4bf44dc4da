//! Back-office aggregates.

use chrono::{DateTime, Utc};

use crate::domain::challenge::Challenge;
use crate::domain::enrollment::{EnrollmentStatus, EnrollmentView};
use crate::domain::progress::{format_money, format_percent};

#[derive(Debug, Clone, PartialEq)]
pub struct StatusCount {
    pub status: EnrollmentStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminOverview {
    pub total_enrollments: usize,
    pub by_status: Vec<StatusCount>,
    pub revenue: f64,
    pub active_challenges: usize,
    pub inactive_challenges: usize,
    /// Share of decided attempts (passed or failed) that passed, in percent.
    pub pass_rate: f64,
}

impl AdminOverview {
    pub fn compute(enrollments: &[EnrollmentView], challenges: &[Challenge]) -> Self {
        let count = |status: EnrollmentStatus| {
            enrollments
                .iter()
                .filter(|v| v.enrollment.status == status)
                .count()
        };

        let by_status = EnrollmentStatus::ALL
            .into_iter()
            .map(|status| StatusCount {
                status,
                count: count(status),
            })
            .collect();

        let passed = count(EnrollmentStatus::Passed);
        let failed = count(EnrollmentStatus::Failed);
        let pass_rate = if passed + failed > 0 {
            passed as f64 / (passed + failed) as f64 * 100.0
        } else {
            0.0
        };

        let active_challenges = challenges.iter().filter(|c| c.is_active).count();

        Self {
            total_enrollments: enrollments.len(),
            by_status,
            revenue: enrollments.iter().map(|v| v.enrollment.total_paid).sum(),
            active_challenges,
            inactive_challenges: challenges.len() - active_challenges,
            pass_rate,
        }
    }

    pub fn revenue_display(&self) -> String {
        format_money(self.revenue)
    }

    pub fn pass_rate_display(&self) -> String {
        format_percent(self.pass_rate)
    }
}

/// Enrollment rows for the admin table, optionally narrowed to one status.
pub fn filter_by_status(
    enrollments: Vec<EnrollmentView>,
    status: Option<EnrollmentStatus>,
) -> Vec<EnrollmentView> {
    match status {
        Some(s) => enrollments
            .into_iter()
            .filter(|v| v.enrollment.status == s)
            .collect(),
        None => enrollments,
    }
}

/// One row of the admin user table: an account joined with its profile
/// name and how many challenges it has bought.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSummary {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub enrollment_count: usize,
}

impl AccountSummary {
    /// First and last name joined; empty when neither is set.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn joined_display(&self) -> String {
        self.created_at.format("%Y-%m-%d").to_string()
    }
}

/// Case-insensitive substring match on email or name. A blank term keeps
/// every row.
pub fn search_accounts(accounts: Vec<AccountSummary>, term: &str) -> Vec<AccountSummary> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return accounts;
    }
    accounts
        .into_iter()
        .filter(|a| {
            a.email.to_lowercase().contains(&term) || a.full_name().to_lowercase().contains(&term)
        })
        .collect()
}
