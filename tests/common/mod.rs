#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use sportfund::domain::account::{Account, NewAccount};
use sportfund::domain::admin::AccountSummary;
use sportfund::domain::challenge::{Challenge, PlanType};
use sportfund::domain::enrollment::{
    Enrollment, EnrollmentStatus, EnrollmentView, NewEnrollment, ProgressSnapshot,
};
use sportfund::domain::error::SportfundError;
use sportfund::domain::profile::{Profile, ProfileUpdate};
use sportfund::ports::config_port::ConfigPort;
use sportfund::ports::store_port::{AccountStore, ChallengeStore, EnrollmentStore, ProfileStore};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

pub fn standard_tier(id: i64, balance: f64, price: f64) -> Challenge {
    Challenge {
        id,
        name: format!("${} Standard", balance as i64),
        balance,
        base_price: price,
        plan_type: PlanType::Standard,
        steps: 2,
        phase1_target: balance * 0.20,
        phase2_target: balance * 0.20,
        phase3_target: None,
        max_drawdown: balance * 0.15,
        reward_split: 80.0,
        is_active: true,
    }
}

pub fn pro_tier(id: i64, balance: f64, price: f64) -> Challenge {
    Challenge {
        name: format!("${} Pro", balance as i64),
        plan_type: PlanType::Pro,
        steps: 3,
        phase1_target: balance * 0.15,
        phase2_target: balance * 0.15,
        phase3_target: Some(balance * 0.15),
        max_drawdown: balance * 0.10,
        reward_split: 90.0,
        ..standard_tier(id, balance, price)
    }
}

/// Standard tiers at 1K/5K/10K/20K plus one 10K pro tier.
pub fn catalog() -> Vec<Challenge> {
    vec![
        standard_tier(1, 1_000.0, 29.99),
        standard_tier(2, 5_000.0, 144.99),
        standard_tier(3, 10_000.0, 274.99),
        standard_tier(4, 20_000.0, 499.0),
        pro_tier(5, 10_000.0, 299.0),
    ]
}

#[derive(Default)]
struct Tables {
    challenges: Vec<Challenge>,
    enrollments: Vec<Enrollment>,
    profiles: Vec<Profile>,
    accounts: Vec<Account>,
}

/// In-memory store with switchable failures.
#[derive(Default)]
pub struct MockStore {
    tables: Mutex<Tables>,
    pub fail_enrollment_insert: AtomicBool,
    pub fail_catalog: AtomicBool,
    pub fail_profile_update: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_challenges(self, challenges: Vec<Challenge>) -> Self {
        self.tables.lock().unwrap().challenges = challenges;
        self
    }

    pub fn failing_enrollments(self) -> Self {
        self.fail_enrollment_insert.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_catalog(self) -> Self {
        self.fail_catalog.store(true, Ordering::SeqCst);
        self
    }

    pub fn add_account(&self, email: &str, password_hash: &str, is_admin: bool) -> Account {
        let account = self
            .create_account(&NewAccount {
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                first_name: String::new(),
                last_name: String::new(),
            })
            .unwrap();
        if is_admin {
            self.set_admin(email, true).unwrap();
        }
        self.get_account(account.id).unwrap().unwrap()
    }

    /// Inserts an enrollment directly, bypassing failure switches.
    pub fn seed_enrollment(&self, enrollment: Enrollment) {
        self.tables.lock().unwrap().enrollments.push(enrollment);
    }

    pub fn enrollment_count(&self) -> usize {
        self.tables.lock().unwrap().enrollments.len()
    }

    pub fn enrollments(&self) -> Vec<Enrollment> {
        self.tables.lock().unwrap().enrollments.clone()
    }

    pub fn challenge(&self, id: i64) -> Option<Challenge> {
        self.get_challenge(id).unwrap()
    }

    fn fail(flag: &AtomicBool, what: &str) -> Result<(), SportfundError> {
        if flag.load(Ordering::SeqCst) {
            Err(SportfundError::DatabaseQuery {
                reason: format!("injected {what} failure"),
            })
        } else {
            Ok(())
        }
    }

    fn views(tables: &Tables, filter: impl Fn(&Enrollment) -> bool) -> Vec<EnrollmentView> {
        let mut views: Vec<EnrollmentView> = tables
            .enrollments
            .iter()
            .filter(|e| filter(e))
            .filter_map(|e| {
                tables
                    .challenges
                    .iter()
                    .find(|c| c.id == e.challenge_id)
                    .map(|c| EnrollmentView {
                        enrollment: e.clone(),
                        challenge: c.clone(),
                    })
            })
            .collect();
        views.sort_by(|a, b| {
            b.enrollment
                .enrolled_at
                .cmp(&a.enrollment.enrolled_at)
                .then(b.enrollment.id.cmp(&a.enrollment.id))
        });
        views
    }
}

impl ChallengeStore for MockStore {
    fn list_active_challenges(&self) -> Result<Vec<Challenge>, SportfundError> {
        Self::fail(&self.fail_catalog, "catalog")?;
        let mut active: Vec<Challenge> = self
            .tables
            .lock()
            .unwrap()
            .challenges
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.balance.total_cmp(&b.balance).then(a.id.cmp(&b.id)));
        Ok(active)
    }

    fn list_all_challenges(&self) -> Result<Vec<Challenge>, SportfundError> {
        Self::fail(&self.fail_catalog, "catalog")?;
        Ok(self.tables.lock().unwrap().challenges.clone())
    }

    fn get_challenge(&self, id: i64) -> Result<Option<Challenge>, SportfundError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .challenges
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    fn upsert_challenge(&self, challenge: &Challenge) -> Result<i64, SportfundError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(existing) = tables
            .challenges
            .iter_mut()
            .find(|c| c.name == challenge.name)
        {
            let id = existing.id;
            *existing = Challenge {
                id,
                ..challenge.clone()
            };
            return Ok(id);
        }
        let id = tables.challenges.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        tables.challenges.push(Challenge {
            id,
            ..challenge.clone()
        });
        Ok(id)
    }

    fn set_challenge_active(&self, id: i64, active: bool) -> Result<(), SportfundError> {
        let mut tables = self.tables.lock().unwrap();
        let challenge = tables
            .challenges
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SportfundError::not_found("challenge", id))?;
        challenge.is_active = active;
        Ok(())
    }
}

impl EnrollmentStore for MockStore {
    fn create_enrollment(&self, new: &NewEnrollment) -> Result<Enrollment, SportfundError> {
        Self::fail(&self.fail_enrollment_insert, "enrollment insert")?;
        let mut tables = self.tables.lock().unwrap();
        let id = tables.enrollments.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        let enrollment = Enrollment {
            id,
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
            enrolled_at: Utc::now(),
        };
        tables.enrollments.push(enrollment.clone());
        Ok(enrollment)
    }

    fn list_enrollments_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<EnrollmentView>, SportfundError> {
        let tables = self.tables.lock().unwrap();
        Ok(Self::views(&tables, |e| e.user_id == user_id))
    }

    fn list_all_enrollments(&self) -> Result<Vec<EnrollmentView>, SportfundError> {
        let tables = self.tables.lock().unwrap();
        Ok(Self::views(&tables, |_| true))
    }

    fn get_enrollment(&self, id: i64) -> Result<Option<EnrollmentView>, SportfundError> {
        let tables = self.tables.lock().unwrap();
        Ok(Self::views(&tables, |e| e.id == id).into_iter().next())
    }

    fn record_progress(
        &self,
        id: i64,
        snapshot: &ProgressSnapshot,
        current_balance: f64,
        max_balance: f64,
    ) -> Result<(), SportfundError> {
        let mut tables = self.tables.lock().unwrap();
        let e = tables
            .enrollments
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| SportfundError::not_found("enrollment", id))?;
        e.status = snapshot.status;
        e.current_phase = snapshot.current_phase;
        e.current_profit = snapshot.current_profit;
        e.total_trades = snapshot.total_trades;
        e.winning_trades = snapshot.winning_trades;
        e.current_balance = current_balance;
        e.max_balance = max_balance;
        Ok(())
    }

    fn set_enrollment_status(
        &self,
        id: i64,
        status: EnrollmentStatus,
    ) -> Result<(), SportfundError> {
        let mut tables = self.tables.lock().unwrap();
        let e = tables
            .enrollments
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| SportfundError::not_found("enrollment", id))?;
        e.status = status;
        Ok(())
    }
}

impl ProfileStore for MockStore {
    fn get_profile(&self, user_id: i64) -> Result<Option<Profile>, SportfundError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .profiles
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<(), SportfundError> {
        Self::fail(&self.fail_profile_update, "profile update")?;
        let mut tables = self.tables.lock().unwrap();
        let profile = tables
            .profiles
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or_else(|| SportfundError::not_found("profile", user_id))?;
        profile.first_name = update.first_name.clone();
        profile.last_name = update.last_name.clone();
        profile.phone = update.phone.clone();
        Ok(())
    }
}

impl AccountStore for MockStore {
    fn create_account(&self, new: &NewAccount) -> Result<Account, SportfundError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.accounts.iter().any(|a| a.email == new.email) {
            return Err(SportfundError::DuplicateAccount {
                email: new.email.clone(),
            });
        }
        let id = tables.accounts.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        let account = Account {
            id,
            email: new.email.clone(),
            password_hash: new.password_hash.clone(),
            is_admin: false,
            created_at: Utc::now(),
        };
        tables.accounts.push(account.clone());
        tables.profiles.push(Profile {
            user_id: id,
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            email: new.email.clone(),
            phone: String::new(),
        });
        Ok(account)
    }

    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, SportfundError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }

    fn get_account(&self, id: i64) -> Result<Option<Account>, SportfundError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    fn list_accounts(&self) -> Result<Vec<AccountSummary>, SportfundError> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<AccountSummary> = tables
            .accounts
            .iter()
            .map(|a| {
                let profile = tables.profiles.iter().find(|p| p.user_id == a.id);
                AccountSummary {
                    id: a.id,
                    email: a.email.clone(),
                    first_name: profile.map(|p| p.first_name.clone()).unwrap_or_default(),
                    last_name: profile.map(|p| p.last_name.clone()).unwrap_or_default(),
                    is_admin: a.is_admin,
                    created_at: a.created_at,
                    enrollment_count: tables
                        .enrollments
                        .iter()
                        .filter(|e| e.user_id == a.id)
                        .count(),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    fn set_admin(&self, email: &str, is_admin: bool) -> Result<(), SportfundError> {
        let mut tables = self.tables.lock().unwrap();
        let account = tables
            .accounts
            .iter_mut()
            .find(|a| a.email == email)
            .ok_or_else(|| SportfundError::not_found("account", email))?;
        account.is_admin = is_admin;
        Ok(())
    }
}

/// Enrollment row at a fixed time offset so ordering is deterministic.
pub fn enrollment(id: i64, user_id: i64, challenge: &Challenge, minutes_ago: i64) -> Enrollment {
    let base = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    Enrollment {
        id,
        user_id,
        challenge_id: challenge.id,
        status: EnrollmentStatus::Active,
        current_phase: 1,
        total_paid: challenge.base_price,
        current_balance: challenge.balance,
        max_balance: challenge.balance,
        current_profit: 0.0,
        total_trades: 0,
        winning_trades: 0,
        enrolled_at: base - Duration::minutes(minutes_ago),
    }
}

/// Config backed by a map, for tests that need specific keys.
#[derive(Default)]
pub struct MapConfig(HashMap<(String, String), String>);

impl MapConfig {
    pub fn with(mut self, section: &str, key: &str, value: &str) -> Self {
        self.0
            .insert((section.to_string(), key.to_string()), value.to_string());
        self
    }
}

impl ConfigPort for MapConfig {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.0.get(&(section.to_string(), key.to_string())).cloned()
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.get_string(section, key).as_deref() {
            Some("true") | Some("yes") | Some("1") => true,
            Some("false") | Some("no") | Some("0") => false,
            _ => default,
        }
    }
}

pub const TEST_PASSWORD: &str = "testpass123";

/// Argon2 hash of `TEST_PASSWORD` with a fixed salt; hashing is slow, so
/// it happens once per test binary.
pub static TEST_PASSWORD_HASH: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version, password_hash::SaltString};
    let salt = SaltString::from_b64("dGVzdHNhbHR0ZXN0c2FsdA").unwrap();
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
        .hash_password(TEST_PASSWORD.as_bytes(), &salt)
        .unwrap()
        .to_string()
});

pub fn web_config() -> MapConfig {
    MapConfig::default()
        .with(
            "auth",
            "session_secret",
            "00000000000000000000000000000001\
             00000000000000000000000000000001\
             00000000000000000000000000000001\
             00000000000000000000000000000001",
        )
        .with("auth", "session_lifetime", "3600")
        .with("web", "listen", "127.0.0.1:0")
}

#[cfg(feature = "web")]
pub mod web {
    use super::{MockStore, TEST_PASSWORD, web_config};
    use axum::{
        Router,
        body::Body,
        http::{Request, Response, header},
    };
    use http_body_util::BodyExt;
    use sportfund::adapters::web::{AppState, build_router};
    use std::sync::Arc;
    use tower::ServiceExt;

    pub fn app(store: Arc<MockStore>) -> Router {
        build_router(AppState {
            store,
            config: Arc::new(web_config()),
        })
        .unwrap()
    }

    pub fn extract_cookies(response: &Response<Body>) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .collect()
    }

    pub fn build_cookie_header(set_cookies: &[String]) -> String {
        set_cookies
            .iter()
            .map(|sc| sc.split(';').next().unwrap_or("").to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn location(response: &Response<Body>) -> Option<String> {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    pub async fn body_string(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(Body::empty()).unwrap()
    }

    pub fn post_form(uri: &str, form: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(Body::from(form.to_string())).unwrap()
    }

    /// Marks a request as coming from HTMX.
    pub fn htmx(mut request: Request<Body>) -> Request<Body> {
        request
            .headers_mut()
            .insert("HX-Request", header::HeaderValue::from_static("true"));
        request
    }

    /// Signs in with `TEST_PASSWORD` and returns the session cookie header.
    pub async fn sign_in(app: &Router, email: &str) -> String {
        let form = format!("email={}&password={TEST_PASSWORD}", email.replace('@', "%40"));
        let response = app
            .clone()
            .oneshot(post_form("/auth/sign-in", &form, None))
            .await
            .unwrap();
        assert_eq!(response.status(), 303, "sign-in for {email} failed");
        let cookies = extract_cookies(&response);
        assert!(!cookies.is_empty(), "sign-in set no session cookie");
        build_cookie_header(&cookies)
    }
}
