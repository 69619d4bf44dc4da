//! PostgreSQL store adapter.
//!
//! Same tables as the SQLite adapter, using native `BIGSERIAL`, `BOOLEAN`
//! and `TIMESTAMPTZ` columns. The synchronous client must not run on an
//! async executor thread; the web layer calls it through `spawn_blocking`.

use chrono::{DateTime, Utc};
use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::{NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use tracing::debug;

use crate::domain::account::{Account, NewAccount};
use crate::domain::admin::AccountSummary;
use crate::domain::challenge::{Challenge, PlanType};
use crate::domain::enrollment::{
    Enrollment, EnrollmentStatus, EnrollmentView, NewEnrollment, ProgressSnapshot,
};
use crate::domain::error::SportfundError;
use crate::domain::profile::{Profile, ProfileUpdate};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{AccountStore, ChallengeStore, EnrollmentStore, ProfileStore};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS accounts (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        is_admin BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    CREATE TABLE IF NOT EXISTS profiles (
        user_id BIGINT PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT '',
        email TEXT NOT NULL,
        phone TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS challenges (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        balance DOUBLE PRECISION NOT NULL,
        base_price DOUBLE PRECISION NOT NULL,
        plan_type TEXT NOT NULL,
        steps INTEGER NOT NULL,
        phase1_target DOUBLE PRECISION NOT NULL,
        phase2_target DOUBLE PRECISION NOT NULL,
        phase3_target DOUBLE PRECISION,
        max_drawdown DOUBLE PRECISION NOT NULL,
        reward_split DOUBLE PRECISION NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    );
    CREATE TABLE IF NOT EXISTS enrollments (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        challenge_id BIGINT NOT NULL REFERENCES challenges(id),
        status TEXT NOT NULL,
        current_phase INTEGER NOT NULL DEFAULT 1,
        total_paid DOUBLE PRECISION NOT NULL,
        current_balance DOUBLE PRECISION NOT NULL,
        max_balance DOUBLE PRECISION NOT NULL,
        current_profit DOUBLE PRECISION NOT NULL DEFAULT 0,
        total_trades BIGINT NOT NULL DEFAULT 0,
        winning_trades BIGINT NOT NULL DEFAULT 0,
        enrolled_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    CREATE INDEX IF NOT EXISTS idx_enrollments_user ON enrollments(user_id);";

const CHALLENGE_COLUMNS: &str = "c.id, c.name, c.balance, c.base_price, c.plan_type, c.steps, \
     c.phase1_target, c.phase2_target, c.phase3_target, c.max_drawdown, c.reward_split, c.is_active";

const ENROLLMENT_COLUMNS: &str = "e.id, e.user_id, e.challenge_id, e.status, e.current_phase, \
     e.total_paid, e.current_balance, e.max_balance, e.current_profit, e.total_trades, \
     e.winning_trades, e.enrolled_at";

pub struct PostgresAdapter {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SportfundError> {
        let connection_string = config.require_string("postgres", "connection_string")?;
        let pool_size = config.get_int("database", "pool_size", 4) as u32;

        let pg_config = connection_string
            .parse::<postgres::Config>()
            .map_err(|e| SportfundError::ConfigInvalid {
                section: "postgres".into(),
                key: "connection_string".into(),
                reason: e.to_string(),
            })?;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| SportfundError::Database {
                reason: e.to_string(),
            })?;

        debug!(pool_size, "opened postgres pool");
        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), SportfundError> {
        self.conn()?
            .batch_execute(SCHEMA)
            .map_err(SportfundError::query)
    }

    fn conn(&self) -> Result<PooledConnection<PostgresConnectionManager<NoTls>>, SportfundError> {
        self.pool.get().map_err(|e| SportfundError::Database {
            reason: e.to_string(),
        })
    }

    fn query_views(
        &self,
        filter: &str,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<EnrollmentView>, SportfundError> {
        let query = format!(
            "SELECT {ENROLLMENT_COLUMNS}, {CHALLENGE_COLUMNS}
             FROM enrollments e JOIN challenges c ON c.id = e.challenge_id
             {filter}
             ORDER BY e.enrolled_at DESC, e.id DESC"
        );
        let rows = self
            .conn()?
            .query(query.as_str(), args)
            .map_err(SportfundError::query)?;
        rows.iter().map(view_from_row).collect()
    }

    fn query_challenges(&self, query: &str) -> Result<Vec<Challenge>, SportfundError> {
        let rows = self
            .conn()?
            .query(query, &[])
            .map_err(SportfundError::query)?;
        rows.iter().map(|row| challenge_from_row(row, 0)).collect()
    }
}

fn challenge_from_row(row: &Row, offset: usize) -> Result<Challenge, SportfundError> {
    let plan: String = row.get(offset + 4);
    let steps: i32 = row.get(offset + 5);
    Ok(Challenge {
        id: row.get(offset),
        name: row.get(offset + 1),
        balance: row.get(offset + 2),
        base_price: row.get(offset + 3),
        plan_type: plan.parse::<PlanType>()?,
        steps: u8::try_from(steps).map_err(SportfundError::query)?,
        phase1_target: row.get(offset + 6),
        phase2_target: row.get(offset + 7),
        phase3_target: row.get(offset + 8),
        max_drawdown: row.get(offset + 9),
        reward_split: row.get(offset + 10),
        is_active: row.get(offset + 11),
    })
}

fn enrollment_from_row(row: &Row) -> Result<Enrollment, SportfundError> {
    let status: String = row.get(3);
    let phase: i32 = row.get(4);
    let total_trades: i64 = row.get(9);
    let winning_trades: i64 = row.get(10);
    Ok(Enrollment {
        id: row.get(0),
        user_id: row.get(1),
        challenge_id: row.get(2),
        status: status.parse::<EnrollmentStatus>()?,
        current_phase: u8::try_from(phase).map_err(SportfundError::query)?,
        total_paid: row.get(5),
        current_balance: row.get(6),
        max_balance: row.get(7),
        current_profit: row.get(8),
        total_trades: u32::try_from(total_trades).map_err(SportfundError::query)?,
        winning_trades: u32::try_from(winning_trades).map_err(SportfundError::query)?,
        enrolled_at: row.get(11),
    })
}

fn view_from_row(row: &Row) -> Result<EnrollmentView, SportfundError> {
    Ok(EnrollmentView {
        enrollment: enrollment_from_row(row)?,
        challenge: challenge_from_row(row, 12)?,
    })
}

fn account_from_row(row: &Row) -> Account {
    Account {
        id: row.get(0),
        email: row.get(1),
        password_hash: row.get(2),
        is_admin: row.get(3),
        created_at: row.get(4),
    }
}

fn summary_from_row(row: &Row) -> AccountSummary {
    let count: i64 = row.get(6);
    AccountSummary {
        id: row.get(0),
        email: row.get(1),
        first_name: row.get(2),
        last_name: row.get(3),
        is_admin: row.get(4),
        created_at: row.get(5),
        enrollment_count: count as usize,
    }
}

fn expect_updated(rows: u64, entity: &'static str, id: impl ToString) -> Result<(), SportfundError> {
    if rows == 0 {
        Err(SportfundError::not_found(entity, id))
    } else {
        Ok(())
    }
}

impl ChallengeStore for PostgresAdapter {
    fn list_active_challenges(&self) -> Result<Vec<Challenge>, SportfundError> {
        self.query_challenges(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges c
             WHERE c.is_active
             ORDER BY c.balance ASC, c.id ASC"
        ))
    }

    fn list_all_challenges(&self) -> Result<Vec<Challenge>, SportfundError> {
        self.query_challenges(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges c
             ORDER BY c.plan_type ASC, c.balance ASC, c.id ASC"
        ))
    }

    fn get_challenge(&self, id: i64) -> Result<Option<Challenge>, SportfundError> {
        let row = self
            .conn()?
            .query_opt(
                format!("SELECT {CHALLENGE_COLUMNS} FROM challenges c WHERE c.id = $1").as_str(),
                &[&id],
            )
            .map_err(SportfundError::query)?;
        row.map(|r| challenge_from_row(&r, 0)).transpose()
    }

    fn upsert_challenge(&self, c: &Challenge) -> Result<i64, SportfundError> {
        let steps = i32::from(c.steps);
        let row = self
            .conn()?
            .query_one(
                "INSERT INTO challenges (name, balance, base_price, plan_type, steps,
                     phase1_target, phase2_target, phase3_target, max_drawdown, reward_split, is_active)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 ON CONFLICT (name) DO UPDATE SET
                     balance = EXCLUDED.balance,
                     base_price = EXCLUDED.base_price,
                     plan_type = EXCLUDED.plan_type,
                     steps = EXCLUDED.steps,
                     phase1_target = EXCLUDED.phase1_target,
                     phase2_target = EXCLUDED.phase2_target,
                     phase3_target = EXCLUDED.phase3_target,
                     max_drawdown = EXCLUDED.max_drawdown,
                     reward_split = EXCLUDED.reward_split,
                     is_active = EXCLUDED.is_active
                 RETURNING id",
                &[
                    &c.name,
                    &c.balance,
                    &c.base_price,
                    &c.plan_type.as_str(),
                    &steps,
                    &c.phase1_target,
                    &c.phase2_target,
                    &c.phase3_target,
                    &c.max_drawdown,
                    &c.reward_split,
                    &c.is_active,
                ],
            )
            .map_err(SportfundError::query)?;
        Ok(row.get(0))
    }

    fn set_challenge_active(&self, id: i64, active: bool) -> Result<(), SportfundError> {
        let rows = self
            .conn()?
            .execute(
                "UPDATE challenges SET is_active = $1 WHERE id = $2",
                &[&active, &id],
            )
            .map_err(SportfundError::query)?;
        expect_updated(rows, "challenge", id)
    }
}

impl EnrollmentStore for PostgresAdapter {
    fn create_enrollment(&self, new: &NewEnrollment) -> Result<Enrollment, SportfundError> {
        let row = self
            .conn()?
            .query_one(
                "INSERT INTO enrollments (user_id, challenge_id, status, total_paid,
                     current_balance, max_balance)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id, enrolled_at",
                &[
                    &new.user_id,
                    &new.challenge_id,
                    &new.status.as_str(),
                    &new.total_paid,
                    &new.current_balance,
                    &new.max_balance,
                ],
            )
            .map_err(SportfundError::query)?;
        let enrolled_at: DateTime<Utc> = row.get(1);

        Ok(Enrollment {
            id: row.get(0),
            user_id: new.user_id,
            challenge_id: new.challenge_id,
            status: new.status,
            current_phase: 1,
            total_paid: new.total_paid,
            current_balance: new.current_balance,
            max_balance: new.max_balance,
            current_profit: 0.0,
            total_trades: 0,
            winning_trades: 0,
            enrolled_at,
        })
    }

    fn list_enrollments_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<EnrollmentView>, SportfundError> {
        self.query_views("WHERE e.user_id = $1", &[&user_id])
    }

    fn list_all_enrollments(&self) -> Result<Vec<EnrollmentView>, SportfundError> {
        self.query_views("", &[])
    }

    fn get_enrollment(&self, id: i64) -> Result<Option<EnrollmentView>, SportfundError> {
        Ok(self.query_views("WHERE e.id = $1", &[&id])?.into_iter().next())
    }

    fn record_progress(
        &self,
        id: i64,
        snapshot: &ProgressSnapshot,
        current_balance: f64,
        max_balance: f64,
    ) -> Result<(), SportfundError> {
        let phase = i32::from(snapshot.current_phase);
        let total = i64::from(snapshot.total_trades);
        let winning = i64::from(snapshot.winning_trades);
        let rows = self
            .conn()?
            .execute(
                "UPDATE enrollments SET status = $1, current_phase = $2, current_profit = $3,
                     total_trades = $4, winning_trades = $5, current_balance = $6, max_balance = $7
                 WHERE id = $8",
                &[
                    &snapshot.status.as_str(),
                    &phase,
                    &snapshot.current_profit,
                    &total,
                    &winning,
                    &current_balance,
                    &max_balance,
                    &id,
                ],
            )
            .map_err(SportfundError::query)?;
        expect_updated(rows, "enrollment", id)
    }

    fn set_enrollment_status(
        &self,
        id: i64,
        status: EnrollmentStatus,
    ) -> Result<(), SportfundError> {
        let rows = self
            .conn()?
            .execute(
                "UPDATE enrollments SET status = $1 WHERE id = $2",
                &[&status.as_str(), &id],
            )
            .map_err(SportfundError::query)?;
        expect_updated(rows, "enrollment", id)
    }
}

impl ProfileStore for PostgresAdapter {
    fn get_profile(&self, user_id: i64) -> Result<Option<Profile>, SportfundError> {
        let row = self
            .conn()?
            .query_opt(
                "SELECT user_id, first_name, last_name, email, phone FROM profiles WHERE user_id = $1",
                &[&user_id],
            )
            .map_err(SportfundError::query)?;
        Ok(row.map(|r| Profile {
            user_id: r.get(0),
            first_name: r.get(1),
            last_name: r.get(2),
            email: r.get(3),
            phone: r.get(4),
        }))
    }

    fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<(), SportfundError> {
        let rows = self
            .conn()?
            .execute(
                "UPDATE profiles SET first_name = $1, last_name = $2, phone = $3 WHERE user_id = $4",
                &[&update.first_name, &update.last_name, &update.phone, &user_id],
            )
            .map_err(SportfundError::query)?;
        expect_updated(rows, "profile", user_id)
    }
}

impl AccountStore for PostgresAdapter {
    fn create_account(&self, new: &NewAccount) -> Result<Account, SportfundError> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(SportfundError::query)?;

        let row = tx
            .query_one(
                "INSERT INTO accounts (email, password_hash) VALUES ($1, $2)
                 RETURNING id, email, password_hash, is_admin, created_at",
                &[&new.email, &new.password_hash],
            )
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    SportfundError::DuplicateAccount {
                        email: new.email.clone(),
                    }
                } else {
                    SportfundError::query(e)
                }
            })?;
        let account = account_from_row(&row);

        tx.execute(
            "INSERT INTO profiles (user_id, first_name, last_name, email) VALUES ($1, $2, $3, $4)",
            &[&account.id, &new.first_name, &new.last_name, &new.email],
        )
        .map_err(SportfundError::query)?;

        tx.commit().map_err(SportfundError::query)?;
        Ok(account)
    }

    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, SportfundError> {
        let row = self
            .conn()?
            .query_opt(
                "SELECT id, email, password_hash, is_admin, created_at FROM accounts WHERE email = $1",
                &[&email],
            )
            .map_err(SportfundError::query)?;
        Ok(row.as_ref().map(account_from_row))
    }

    fn get_account(&self, id: i64) -> Result<Option<Account>, SportfundError> {
        let row = self
            .conn()?
            .query_opt(
                "SELECT id, email, password_hash, is_admin, created_at FROM accounts WHERE id = $1",
                &[&id],
            )
            .map_err(SportfundError::query)?;
        Ok(row.as_ref().map(account_from_row))
    }

    fn list_accounts(&self) -> Result<Vec<AccountSummary>, SportfundError> {
        let rows = self
            .conn()?
            .query(
                "SELECT a.id, a.email, COALESCE(p.first_name, ''), COALESCE(p.last_name, ''),
                        a.is_admin, a.created_at, COUNT(e.id)
                 FROM accounts a
                 LEFT JOIN profiles p ON p.user_id = a.id
                 LEFT JOIN enrollments e ON e.user_id = a.id
                 GROUP BY a.id, p.first_name, p.last_name
                 ORDER BY a.created_at DESC, a.id DESC",
                &[],
            )
            .map_err(SportfundError::query)?;
        Ok(rows.iter().map(summary_from_row).collect())
    }

    fn set_admin(&self, email: &str, is_admin: bool) -> Result<(), SportfundError> {
        let rows = self
            .conn()?
            .execute(
                "UPDATE accounts SET is_admin = $1 WHERE email = $2",
                &[&is_admin, &email],
            )
            .map_err(SportfundError::query)?;
        expect_updated(rows, "account", email)
    }
}
