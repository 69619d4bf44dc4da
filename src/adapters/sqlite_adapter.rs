//! SQLite store adapter.

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
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
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        is_admin INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS profiles (
        user_id INTEGER PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT '',
        email TEXT NOT NULL,
        phone TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS challenges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        balance REAL NOT NULL,
        base_price REAL NOT NULL,
        plan_type TEXT NOT NULL,
        steps INTEGER NOT NULL,
        phase1_target REAL NOT NULL,
        phase2_target REAL NOT NULL,
        phase3_target REAL,
        max_drawdown REAL NOT NULL,
        reward_split REAL NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1
    );
    CREATE TABLE IF NOT EXISTS enrollments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        challenge_id INTEGER NOT NULL REFERENCES challenges(id),
        status TEXT NOT NULL,
        current_phase INTEGER NOT NULL DEFAULT 1,
        total_paid REAL NOT NULL,
        current_balance REAL NOT NULL,
        max_balance REAL NOT NULL,
        current_profit REAL NOT NULL DEFAULT 0,
        total_trades INTEGER NOT NULL DEFAULT 0,
        winning_trades INTEGER NOT NULL DEFAULT 0,
        enrolled_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_enrollments_user ON enrollments(user_id);
    CREATE INDEX IF NOT EXISTS idx_challenges_balance ON challenges(balance);";

const CHALLENGE_COLUMNS: &str = "c.id, c.name, c.balance, c.base_price, c.plan_type, c.steps, \
     c.phase1_target, c.phase2_target, c.phase3_target, c.max_drawdown, c.reward_split, c.is_active";

const ENROLLMENT_COLUMNS: &str = "e.id, e.user_id, e.challenge_id, e.status, e.current_phase, \
     e.total_paid, e.current_balance, e.max_balance, e.current_profit, e.total_trades, \
     e.winning_trades, e.enrolled_at";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SportfundError> {
        let db_path = config.require_string("database", "sqlite_path")?;
        let pool_size = config.get_int("database", "pool_size", 4) as u32;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| SportfundError::Database {
                reason: e.to_string(),
            })?;

        debug!(path = %db_path, pool_size, "opened sqlite pool");
        Ok(Self { pool })
    }

    /// Single-connection in-memory database; every checkout sees the same data.
    pub fn in_memory() -> Result<Self, SportfundError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| SportfundError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), SportfundError> {
        self.conn()?
            .execute_batch(SCHEMA)
            .map_err(SportfundError::query)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, SportfundError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| SportfundError::Database {
                reason: e.to_string(),
            })
    }

    fn query_views(
        &self,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<EnrollmentView>, SportfundError> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {ENROLLMENT_COLUMNS}, {CHALLENGE_COLUMNS}
             FROM enrollments e JOIN challenges c ON c.id = e.challenge_id
             {filter}
             ORDER BY e.enrolled_at DESC, e.id DESC"
        );
        let mut stmt = conn.prepare(&query).map_err(SportfundError::query)?;
        let rows = stmt
            .query_map(args, view_from_row)
            .map_err(SportfundError::query)?;

        let mut views = Vec::new();
        for row in rows {
            views.push(row.map_err(SportfundError::query)?);
        }
        Ok(views)
    }

    fn query_challenges(&self, query: &str) -> Result<Vec<Challenge>, SportfundError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(query).map_err(SportfundError::query)?;
        let rows = stmt
            .query_map([], |row| challenge_from_row(row, 0))
            .map_err(SportfundError::query)?;

        let mut challenges = Vec::new();
        for row in rows {
            challenges.push(row.map_err(SportfundError::query)?);
        }
        Ok(challenges)
    }
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn challenge_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Challenge> {
    let plan: String = row.get(offset + 4)?;
    Ok(Challenge {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        balance: row.get(offset + 2)?,
        base_price: row.get(offset + 3)?,
        plan_type: plan
            .parse::<PlanType>()
            .map_err(|e| conversion_error(offset + 4, e))?,
        steps: row.get(offset + 5)?,
        phase1_target: row.get(offset + 6)?,
        phase2_target: row.get(offset + 7)?,
        phase3_target: row.get(offset + 8)?,
        max_drawdown: row.get(offset + 9)?,
        reward_split: row.get(offset + 10)?,
        is_active: row.get(offset + 11)?,
    })
}

fn enrollment_from_row(row: &Row<'_>) -> rusqlite::Result<Enrollment> {
    let status: String = row.get(3)?;
    let enrolled_at: String = row.get(11)?;
    Ok(Enrollment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        challenge_id: row.get(2)?,
        status: status
            .parse::<EnrollmentStatus>()
            .map_err(|e| conversion_error(3, e))?,
        current_phase: row.get(4)?,
        total_paid: row.get(5)?,
        current_balance: row.get(6)?,
        max_balance: row.get(7)?,
        current_profit: row.get(8)?,
        total_trades: row.get(9)?,
        winning_trades: row.get(10)?,
        enrolled_at: parse_timestamp(11, &enrolled_at)?,
    })
}

fn view_from_row(row: &Row<'_>) -> rusqlite::Result<EnrollmentView> {
    Ok(EnrollmentView {
        enrollment: enrollment_from_row(row)?,
        challenge: challenge_from_row(row, 12)?,
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let created_at: String = row.get(4)?;
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        is_admin: row.get(3)?,
        created_at: parse_timestamp(4, &created_at)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<AccountSummary> {
    let created_at: String = row.get(5)?;
    let count: i64 = row.get(6)?;
    Ok(AccountSummary {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        is_admin: row.get(4)?,
        created_at: parse_timestamp(5, &created_at)?,
        enrollment_count: count as usize,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn expect_updated(rows: usize, entity: &'static str, id: impl ToString) -> Result<(), SportfundError> {
    if rows == 0 {
        Err(SportfundError::not_found(entity, id))
    } else {
        Ok(())
    }
}

impl ChallengeStore for SqliteAdapter {
    fn list_active_challenges(&self) -> Result<Vec<Challenge>, SportfundError> {
        self.query_challenges(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges c
             WHERE c.is_active = 1
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
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {CHALLENGE_COLUMNS} FROM challenges c WHERE c.id = ?1"),
            params![id],
            |row| challenge_from_row(row, 0),
        )
        .optional()
        .map_err(SportfundError::query)
    }

    fn upsert_challenge(&self, c: &Challenge) -> Result<i64, SportfundError> {
        let conn = self.conn()?;
        conn.query_row(
            "INSERT INTO challenges (name, balance, base_price, plan_type, steps,
                 phase1_target, phase2_target, phase3_target, max_drawdown, reward_split, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(name) DO UPDATE SET
                 balance = excluded.balance,
                 base_price = excluded.base_price,
                 plan_type = excluded.plan_type,
                 steps = excluded.steps,
                 phase1_target = excluded.phase1_target,
                 phase2_target = excluded.phase2_target,
                 phase3_target = excluded.phase3_target,
                 max_drawdown = excluded.max_drawdown,
                 reward_split = excluded.reward_split,
                 is_active = excluded.is_active
             RETURNING id",
            params![
                c.name,
                c.balance,
                c.base_price,
                c.plan_type.as_str(),
                c.steps,
                c.phase1_target,
                c.phase2_target,
                c.phase3_target,
                c.max_drawdown,
                c.reward_split,
                c.is_active
            ],
            |row| row.get(0),
        )
        .map_err(SportfundError::query)
    }

    fn set_challenge_active(&self, id: i64, active: bool) -> Result<(), SportfundError> {
        let rows = self
            .conn()?
            .execute(
                "UPDATE challenges SET is_active = ?1 WHERE id = ?2",
                params![active, id],
            )
            .map_err(SportfundError::query)?;
        expect_updated(rows, "challenge", id)
    }
}

impl EnrollmentStore for SqliteAdapter {
    fn create_enrollment(&self, new: &NewEnrollment) -> Result<Enrollment, SportfundError> {
        let conn = self.conn()?;
        let enrolled_at = Utc::now();
        conn.execute(
            "INSERT INTO enrollments (user_id, challenge_id, status, current_phase, total_paid,
                 current_balance, max_balance, current_profit, total_trades, winning_trades, enrolled_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, 0, 0, 0, ?7)",
            params![
                new.user_id,
                new.challenge_id,
                new.status.as_str(),
                new.total_paid,
                new.current_balance,
                new.max_balance,
                enrolled_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            ],
        )
        .map_err(SportfundError::query)?;

        Ok(Enrollment {
            id: conn.last_insert_rowid(),
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
        self.query_views("WHERE e.user_id = ?1", &[&user_id])
    }

    fn list_all_enrollments(&self) -> Result<Vec<EnrollmentView>, SportfundError> {
        self.query_views("", &[])
    }

    fn get_enrollment(&self, id: i64) -> Result<Option<EnrollmentView>, SportfundError> {
        Ok(self.query_views("WHERE e.id = ?1", &[&id])?.into_iter().next())
    }

    fn record_progress(
        &self,
        id: i64,
        snapshot: &ProgressSnapshot,
        current_balance: f64,
        max_balance: f64,
    ) -> Result<(), SportfundError> {
        let rows = self
            .conn()?
            .execute(
                "UPDATE enrollments SET status = ?1, current_phase = ?2, current_profit = ?3,
                     total_trades = ?4, winning_trades = ?5, current_balance = ?6, max_balance = ?7
                 WHERE id = ?8",
                params![
                    snapshot.status.as_str(),
                    snapshot.current_phase,
                    snapshot.current_profit,
                    snapshot.total_trades,
                    snapshot.winning_trades,
                    current_balance,
                    max_balance,
                    id
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
                "UPDATE enrollments SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .map_err(SportfundError::query)?;
        expect_updated(rows, "enrollment", id)
    }
}

impl ProfileStore for SqliteAdapter {
    fn get_profile(&self, user_id: i64) -> Result<Option<Profile>, SportfundError> {
        self.conn()?
            .query_row(
                "SELECT user_id, first_name, last_name, email, phone FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(Profile {
                        user_id: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        email: row.get(3)?,
                        phone: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(SportfundError::query)
    }

    fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<(), SportfundError> {
        let rows = self
            .conn()?
            .execute(
                "UPDATE profiles SET first_name = ?1, last_name = ?2, phone = ?3 WHERE user_id = ?4",
                params![update.first_name, update.last_name, update.phone, user_id],
            )
            .map_err(SportfundError::query)?;
        expect_updated(rows, "profile", user_id)
    }
}

impl AccountStore for SqliteAdapter {
    fn create_account(&self, new: &NewAccount) -> Result<Account, SportfundError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(SportfundError::query)?;
        let created_at = Utc::now();

        tx.execute(
            "INSERT INTO accounts (email, password_hash, is_admin, created_at) VALUES (?1, ?2, 0, ?3)",
            params![new.email, new.password_hash, created_at.to_rfc3339_opts(SecondsFormat::Micros, true)],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                SportfundError::DuplicateAccount {
                    email: new.email.clone(),
                }
            } else {
                SportfundError::query(e)
            }
        })?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO profiles (user_id, first_name, last_name, email, phone) VALUES (?1, ?2, ?3, ?4, '')",
            params![id, new.first_name, new.last_name, new.email],
        )
        .map_err(SportfundError::query)?;

        tx.commit().map_err(SportfundError::query)?;

        Ok(Account {
            id,
            email: new.email.clone(),
            password_hash: new.password_hash.clone(),
            is_admin: false,
            created_at,
        })
    }

    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, SportfundError> {
        self.conn()?
            .query_row(
                "SELECT id, email, password_hash, is_admin, created_at FROM accounts WHERE email = ?1",
                params![email],
                account_from_row,
            )
            .optional()
            .map_err(SportfundError::query)
    }

    fn get_account(&self, id: i64) -> Result<Option<Account>, SportfundError> {
        self.conn()?
            .query_row(
                "SELECT id, email, password_hash, is_admin, created_at FROM accounts WHERE id = ?1",
                params![id],
                account_from_row,
            )
            .optional()
            .map_err(SportfundError::query)
    }

    fn list_accounts(&self) -> Result<Vec<AccountSummary>, SportfundError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT a.id, a.email, COALESCE(p.first_name, ''), COALESCE(p.last_name, ''),
                        a.is_admin, a.created_at, COUNT(e.id)
                 FROM accounts a
                 LEFT JOIN profiles p ON p.user_id = a.id
                 LEFT JOIN enrollments e ON e.user_id = a.id
                 GROUP BY a.id
                 ORDER BY a.created_at DESC, a.id DESC",
            )
            .map_err(SportfundError::query)?;
        let rows = stmt
            .query_map([], summary_from_row)
            .map_err(SportfundError::query)?;

        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row.map_err(SportfundError::query)?);
        }
        Ok(accounts)
    }

    fn set_admin(&self, email: &str, is_admin: bool) -> Result<(), SportfundError> {
        let rows = self
            .conn()?
            .execute(
                "UPDATE accounts SET is_admin = ?1 WHERE email = ?2",
                params![is_admin, email],
            )
            .map_err(SportfundError::query)?;
        expect_updated(rows, "account", email)
    }
}
