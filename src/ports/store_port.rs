//! Store port traits: the row-level operations the application needs from
//! its backing database.

use crate::domain::account::{Account, NewAccount};
use crate::domain::admin::AccountSummary;
use crate::domain::challenge::Challenge;
use crate::domain::enrollment::{
    Enrollment, EnrollmentStatus, EnrollmentView, NewEnrollment, ProgressSnapshot,
};
use crate::domain::error::SportfundError;
use crate::domain::profile::{Profile, ProfileUpdate};

pub trait ChallengeStore {
    /// Active tiers ordered by starting balance, ascending.
    fn list_active_challenges(&self) -> Result<Vec<Challenge>, SportfundError>;

    /// Every tier, active or not, ordered by plan then balance.
    fn list_all_challenges(&self) -> Result<Vec<Challenge>, SportfundError>;

    fn get_challenge(&self, id: i64) -> Result<Option<Challenge>, SportfundError>;

    /// Inserts a tier, or replaces the one with the same name. Returns its id.
    fn upsert_challenge(&self, challenge: &Challenge) -> Result<i64, SportfundError>;

    fn set_challenge_active(&self, id: i64, active: bool) -> Result<(), SportfundError>;
}

pub trait EnrollmentStore {
    fn create_enrollment(&self, new: &NewEnrollment) -> Result<Enrollment, SportfundError>;

    /// A user's enrollments joined with their challenge, newest first.
    fn list_enrollments_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<EnrollmentView>, SportfundError>;

    /// All enrollments joined with their challenge, newest first.
    fn list_all_enrollments(&self) -> Result<Vec<EnrollmentView>, SportfundError>;

    fn get_enrollment(&self, id: i64) -> Result<Option<EnrollmentView>, SportfundError>;

    /// Writes an evaluation snapshot with the balances it implies.
    fn record_progress(
        &self,
        id: i64,
        snapshot: &ProgressSnapshot,
        current_balance: f64,
        max_balance: f64,
    ) -> Result<(), SportfundError>;

    fn set_enrollment_status(
        &self,
        id: i64,
        status: EnrollmentStatus,
    ) -> Result<(), SportfundError>;
}

pub trait ProfileStore {
    fn get_profile(&self, user_id: i64) -> Result<Option<Profile>, SportfundError>;

    fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<(), SportfundError>;
}

pub trait AccountStore {
    /// Creates the account and its profile together.
    fn create_account(&self, new: &NewAccount) -> Result<Account, SportfundError>;

    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, SportfundError>;

    fn get_account(&self, id: i64) -> Result<Option<Account>, SportfundError>;

    /// Every account with its profile name and enrollment count, newest
    /// first.
    fn list_accounts(&self) -> Result<Vec<AccountSummary>, SportfundError>;

    fn set_admin(&self, email: &str, is_admin: bool) -> Result<(), SportfundError>;
}

/// Everything the web layer and CLI need, behind one object.
pub trait StorePort: ChallengeStore + EnrollmentStore + ProfileStore + AccountStore {}

impl<T> StorePort for T where T: ChallengeStore + EnrollmentStore + ProfileStore + AccountStore {}
