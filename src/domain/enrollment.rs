//! Enrollments: a user's attempt at a challenge tier.
//!
//! Status transitions are decided outside this crate (the evaluation feed);
//! the web layer only renders the latest snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::challenge::Challenge;
use crate::domain::error::ValidationError;
use crate::domain::progress::{format_money, format_percent, progress_percent, win_rate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Pending,
    Active,
    Passed,
    Failed,
    Cancelled,
}

impl EnrollmentStatus {
    pub const ALL: [EnrollmentStatus; 5] = [
        EnrollmentStatus::Pending,
        EnrollmentStatus::Active,
        EnrollmentStatus::Passed,
        EnrollmentStatus::Failed,
        EnrollmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Passed => "passed",
            EnrollmentStatus::Failed => "failed",
            EnrollmentStatus::Cancelled => "cancelled",
        }
    }

    /// CSS class for the status badge.
    pub fn badge_class(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "badge badge-green",
            EnrollmentStatus::Pending => "badge badge-yellow",
            EnrollmentStatus::Passed => "badge badge-blue",
            EnrollmentStatus::Failed => "badge badge-red",
            EnrollmentStatus::Cancelled => "badge badge-gray",
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrollmentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| ValidationError::new("status", format!("unknown status '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub challenge_id: i64,
    pub status: EnrollmentStatus,
    pub current_phase: u8,
    pub total_paid: f64,
    pub current_balance: f64,
    pub max_balance: f64,
    pub current_profit: f64,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub enrolled_at: DateTime<Utc>,
}

/// Row to insert when a user buys a tier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEnrollment {
    pub user_id: i64,
    pub challenge_id: i64,
    pub status: EnrollmentStatus,
    pub total_paid: f64,
    pub current_balance: f64,
    pub max_balance: f64,
}

impl NewEnrollment {
    /// Purchase of `challenge` by `user_id`: pays the base price and starts
    /// both balances at the tier's starting balance.
    pub fn for_purchase(user_id: i64, challenge: &Challenge) -> Self {
        Self {
            user_id,
            challenge_id: challenge.id,
            status: EnrollmentStatus::Active,
            total_paid: challenge.base_price,
            current_balance: challenge.balance,
            max_balance: challenge.balance,
        }
    }
}

/// Snapshot pushed by the evaluation feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub status: EnrollmentStatus,
    pub current_phase: u8,
    pub current_profit: f64,
    pub total_trades: u32,
    pub winning_trades: u32,
}

impl ProgressSnapshot {
    pub fn validate(&self, challenge: &Challenge) -> Result<(), ValidationError> {
        if self.winning_trades > self.total_trades {
            return Err(ValidationError::new(
                "winning_trades",
                "cannot exceed total trades",
            ));
        }
        if self.current_phase == 0 || self.current_phase > challenge.steps {
            return Err(ValidationError::new(
                "current_phase",
                format!("must be between 1 and {}", challenge.steps),
            ));
        }
        if !self.current_profit.is_finite() {
            return Err(ValidationError::new("current_profit", "must be a number"));
        }
        Ok(())
    }

    /// Balance fields implied by this snapshot: current balance is the
    /// starting balance plus profit, max balance is the running peak.
    pub fn balances(&self, challenge: &Challenge, previous_max: f64) -> (f64, f64) {
        let current = challenge.balance + self.current_profit;
        (current, previous_max.max(current))
    }
}

/// An enrollment joined with its challenge, as listed on the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentView {
    pub enrollment: Enrollment,
    pub challenge: Challenge,
}

impl EnrollmentView {
    pub fn phase_target(&self) -> Option<f64> {
        self.challenge.phase_target(self.enrollment.current_phase)
    }

    pub fn progress(&self) -> f64 {
        progress_percent(self.enrollment.current_profit, self.phase_target())
    }

    pub fn win_rate(&self) -> f64 {
        win_rate(self.enrollment.winning_trades, self.enrollment.total_trades)
    }

    pub fn progress_display(&self) -> String {
        format_percent(self.progress())
    }

    pub fn win_rate_display(&self) -> String {
        format_percent(self.win_rate())
    }

    /// Target amount, or `"n/a"` when the phase has none.
    pub fn target_display(&self) -> String {
        match self.phase_target() {
            Some(t) => format_money(t),
            None => "n/a".to_string(),
        }
    }

    pub fn profit_display(&self) -> String {
        format_money(self.enrollment.current_profit)
    }

    pub fn losing_trades(&self) -> u32 {
        self.enrollment
            .total_trades
            .saturating_sub(self.enrollment.winning_trades)
    }
}

/// Dashboard tabs: active attempts and passed ones.
pub fn partition_for_dashboard(
    views: Vec<EnrollmentView>,
) -> (Vec<EnrollmentView>, Vec<EnrollmentView>) {
    let mut active = Vec::new();
    let mut completed = Vec::new();
    for view in views {
        match view.enrollment.status {
            EnrollmentStatus::Active => active.push(view),
            EnrollmentStatus::Passed => completed.push(view),
            _ => {}
        }
    }
    (active, completed)
}
