//! CSV challenge-catalog reader.
//!
//! Expected header:
//! `name,plan_type,balance,base_price,steps,phase1_target,phase2_target,phase3_target,max_drawdown,reward_split,is_active`
//!
//! `phase3_target` may be left empty for 2-step plans; `is_active` defaults
//! to true when the column is empty.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::domain::challenge::{Challenge, PlanType};
use crate::domain::error::SportfundError;

#[derive(Debug, Deserialize)]
struct CatalogRecord {
    name: String,
    plan_type: String,
    balance: f64,
    base_price: f64,
    steps: u8,
    phase1_target: f64,
    phase2_target: f64,
    phase3_target: Option<f64>,
    max_drawdown: f64,
    reward_split: f64,
    is_active: Option<bool>,
}

impl CatalogRecord {
    fn into_challenge(self) -> Result<Challenge, SportfundError> {
        let challenge = Challenge {
            id: 0,
            name: self.name.trim().to_string(),
            balance: self.balance,
            base_price: self.base_price,
            plan_type: self.plan_type.parse::<PlanType>()?,
            steps: self.steps,
            phase1_target: self.phase1_target,
            phase2_target: self.phase2_target,
            phase3_target: self.phase3_target,
            max_drawdown: self.max_drawdown,
            reward_split: self.reward_split,
            is_active: self.is_active.unwrap_or(true),
        };
        challenge.validate()?;
        Ok(challenge)
    }
}

pub struct CsvCatalogAdapter {
    path: PathBuf,
}

impl CsvCatalogAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates every tier in the file. Stops at the first bad
    /// row, naming its line.
    pub fn load(&self) -> Result<Vec<Challenge>, SportfundError> {
        let content = fs::read_to_string(&self.path).map_err(|e| SportfundError::Catalog {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;
        let challenges = parse_catalog(&content)?;
        debug!(path = %self.path.display(), count = challenges.len(), "loaded challenge catalog");
        Ok(challenges)
    }
}

pub fn parse_catalog(content: &str) -> Result<Vec<Challenge>, SportfundError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut challenges: Vec<Challenge> = Vec::new();
    for (idx, result) in rdr.deserialize::<CatalogRecord>().enumerate() {
        // header is line 1
        let line = idx + 2;
        let record = result.map_err(|e| SportfundError::Catalog {
            reason: format!("line {line}: {e}"),
        })?;
        let challenge = record
            .into_challenge()
            .map_err(|e| SportfundError::Catalog {
                reason: format!("line {line}: {e}"),
            })?;
        if challenges.iter().any(|c| c.name == challenge.name) {
            return Err(SportfundError::Catalog {
                reason: format!("line {line}: duplicate tier name '{}'", challenge.name),
            });
        }
        challenges.push(challenge);
    }
    Ok(challenges)
}
