//! Challenge tiers: the purchasable evaluation packages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::ValidationError;
use crate::domain::progress::format_money;

/// Plan family a tier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Standard,
    Pro,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Standard => "standard",
            PlanType::Pro => "pro",
        }
    }

    /// Heading shown on the plan selector.
    pub fn label(&self) -> &'static str {
        match self {
            PlanType::Standard => "Standard (2-Step)",
            PlanType::Pro => "Pro (3-Step)",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(PlanType::Standard),
            "pro" => Ok(PlanType::Pro),
            other => Err(ValidationError::new(
                "plan_type",
                format!("unknown plan type '{other}'"),
            )),
        }
    }
}

/// A challenge tier as stored. Targets and drawdown are absolute currency
/// deltas from `balance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: i64,
    pub name: String,
    pub balance: f64,
    pub base_price: f64,
    pub plan_type: PlanType,
    pub steps: u8,
    pub phase1_target: f64,
    pub phase2_target: f64,
    pub phase3_target: Option<f64>,
    pub max_drawdown: f64,
    pub reward_split: f64,
    pub is_active: bool,
}

/// Phase rows rendered on the challenge detail card.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseRule {
    pub phase: u8,
    pub profit_target: f64,
    pub max_drawdown: f64,
}

impl PhaseRule {
    pub fn target_display(&self) -> String {
        format_money(self.profit_target)
    }

    pub fn drawdown_display(&self) -> String {
        format_money(self.max_drawdown)
    }
}

impl Challenge {
    /// Target for the given 1-based phase. Phase 1 and 2 map to their own
    /// targets; anything else falls through to the phase-3 target.
    pub fn phase_target(&self, phase: u8) -> Option<f64> {
        match phase {
            1 => Some(self.phase1_target),
            2 => Some(self.phase2_target),
            _ => self.phase3_target,
        }
    }

    pub fn balance_display(&self) -> String {
        format_money(self.balance)
    }

    pub fn price_display(&self) -> String {
        format_money(self.base_price)
    }

    pub fn drawdown_display(&self) -> String {
        format_money(self.max_drawdown)
    }

    pub fn phases(&self) -> Vec<PhaseRule> {
        (1..=self.steps)
            .filter_map(|phase| {
                self.phase_target(phase).map(|profit_target| PhaseRule {
                    phase,
                    profit_target,
                    max_drawdown: self.max_drawdown,
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("name", "must not be empty"));
        }
        require_positive("balance", self.balance)?;
        require_positive("base_price", self.base_price)?;
        require_positive("phase1_target", self.phase1_target)?;
        require_positive("phase2_target", self.phase2_target)?;
        require_positive("max_drawdown", self.max_drawdown)?;
        if !(self.reward_split > 0.0 && self.reward_split <= 100.0) {
            return Err(ValidationError::new(
                "reward_split",
                "must be greater than 0 and at most 100",
            ));
        }
        match (self.steps, self.phase3_target) {
            (2, None) => Ok(()),
            (2, Some(_)) => Err(ValidationError::new(
                "phase3_target",
                "only 3-step plans have a phase 3 target",
            )),
            (3, Some(t)) => require_positive("phase3_target", t),
            (3, None) => Err(ValidationError::new(
                "phase3_target",
                "3-step plans require a phase 3 target",
            )),
            (n, _) => Err(ValidationError::new(
                "steps",
                format!("must be 2 or 3, got {n}"),
            )),
        }
    }
}

fn require_positive(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new(field, "must be a positive amount"))
    }
}

/// Distinct starting balances offered for a plan, ascending.
pub fn available_balances(challenges: &[Challenge], plan: PlanType) -> Vec<f64> {
    let mut balances: Vec<f64> = challenges
        .iter()
        .filter(|c| c.plan_type == plan)
        .map(|c| c.balance)
        .collect();
    balances.sort_by(|a, b| a.total_cmp(b));
    balances.dedup();
    balances
}

/// The tier matching a plan/balance selection.
pub fn find_tier(challenges: &[Challenge], plan: PlanType, balance: f64) -> Option<&Challenge> {
    challenges
        .iter()
        .find(|c| c.plan_type == plan && c.balance == balance)
}
