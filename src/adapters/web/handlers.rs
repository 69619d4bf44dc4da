//! HTTP request handlers for the web adapter.

use askama::Template;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::account::{NewAccount, check_password, normalize_email};
use crate::domain::admin::{AdminOverview, filter_by_status, search_accounts};
use crate::domain::challenge::{Challenge, PlanType, available_balances, find_tier};
use crate::domain::enrollment::{EnrollmentStatus, NewEnrollment, partition_for_dashboard};
use crate::domain::error::{SportfundError, ValidationError};
use crate::domain::profile::{Profile, ProfileUpdate};
use crate::domain::progress::format_money;
use crate::ports::store_port::{AccountStore, ChallengeStore, EnrollmentStore, ProfileStore};

use super::auth::{AuthSession, Credentials, User, hash_password};
use super::notice::{self, Notice};
use super::templates::{
    AboutTemplate, AdminChallengesTemplate, AdminEnrollmentsTemplate, AdminOverviewTemplate,
    AdminUsersTemplate, AuthTemplate, BalanceOption, BasePage, ChallengesTemplate, DashboardTemplate,
    EvaluationProcessTemplate, HomeTemplate, Nav, NoticeTemplate, PlanOption, ProfileTemplate,
};
use super::{AppState, WebError, is_htmx_request, run_blocking};

/// Balance preselected on the challenges page when the query names none.
const DEFAULT_BALANCE: f64 = 5_000.0;

const RECENT_ENROLLMENTS: usize = 10;

const HX_REDIRECT: HeaderName = HeaderName::from_static("hx-redirect");

fn render_error(e: askama::Error) -> WebError {
    error!(error = %e, "template render failed");
    WebError::internal("Failed to render page")
}

/// Renders a page fragment, wrapped in the site layout unless HTMX asked
/// for the fragment alone. Any pending notice is consumed here.
async fn render_page<T: Template>(
    auth_session: &AuthSession,
    headers: &HeaderMap,
    title: &str,
    template: &T,
) -> Result<Response, WebError> {
    let content = template.render().map_err(render_error)?;
    let notice = notice::take(&auth_session.session).await;

    if is_htmx_request(headers) {
        let mut html = match &notice {
            Some(n) => NoticeTemplate { notice: n }.render().map_err(render_error)?,
            None => String::new(),
        };
        html.push_str(&content);
        return Ok(Html(html).into_response());
    }

    let nav = Nav::for_user(auth_session.user.as_ref());
    let page = BasePage {
        title,
        content: &content,
        nav: &nav,
        notice: notice.as_ref(),
    };
    Ok(Html(page.render().map_err(render_error)?).into_response())
}

fn signed_in_user(auth_session: &AuthSession) -> Result<User, WebError> {
    auth_session
        .user
        .clone()
        .ok_or_else(|| WebError::new(StatusCode::UNAUTHORIZED, "Please sign in"))
}

/// Only same-site absolute paths are followed after sign-in. Browsers read
/// `/\host` like `//host`, so backslashes are refused outright.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\') =>
        {
            path
        }
        _ => "/dashboard",
    }
}

/// A 303 for plain form posts; HTMX posts get `HX-Redirect` so the browser
/// navigates instead of swapping the target page into `#content`.
fn redirect(headers: &HeaderMap, to: &str) -> Response {
    if is_htmx_request(headers) {
        match HeaderValue::from_str(to) {
            Ok(value) => ([(HX_REDIRECT, value)], StatusCode::OK).into_response(),
            Err(_) => Redirect::to(to).into_response(),
        }
    } else {
        Redirect::to(to).into_response()
    }
}

pub async fn home(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let tiers = match run_blocking(&state.store, |s| s.list_active_challenges()).await {
        Ok(tiers) => tiers,
        Err(e) => {
            error!(error = %e, "failed to load challenges for home page");
            Vec::new()
        }
    };
    let starting_price = tiers
        .iter()
        .map(|c| c.base_price)
        .min_by(|a, b| a.total_cmp(b))
        .map(format_money);

    let template = HomeTemplate {
        starting_price,
        tier_count: tiers.len(),
    };
    render_page(&auth_session, &headers, "Home", &template).await
}

pub async fn about(auth_session: AuthSession, headers: HeaderMap) -> Result<Response, WebError> {
    render_page(&auth_session, &headers, "About", &AboutTemplate).await
}

pub async fn evaluation_process(
    auth_session: AuthSession,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    render_page(
        &auth_session,
        &headers,
        "Evaluation Process",
        &EvaluationProcessTemplate,
    )
    .await
}

#[derive(Debug, Deserialize)]
pub struct ChallengeQuery {
    pub plan: Option<String>,
    pub balance: Option<f64>,
}

pub async fn challenges(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    headers: HeaderMap,
    Query(query): Query<ChallengeQuery>,
) -> Result<Response, WebError> {
    let plan = query
        .plan
        .as_deref()
        .and_then(|p| p.parse::<PlanType>().ok())
        .unwrap_or(PlanType::Standard);
    let tiers = load_catalog(&state, &auth_session).await;
    challenges_page(&auth_session, &headers, &tiers, plan, query.balance).await
}

/// Active tiers, or an empty catalog plus an error notice when the store
/// fails.
async fn load_catalog(state: &AppState, auth_session: &AuthSession) -> Vec<Challenge> {
    match run_blocking(&state.store, |s| s.list_active_challenges()).await {
        Ok(tiers) => tiers,
        Err(e) => {
            error!(error = %e, "failed to load challenges");
            notice::push(
                &auth_session.session,
                Notice::error("Failed to load challenges"),
            )
            .await;
            Vec::new()
        }
    }
}

async fn challenges_page(
    auth_session: &AuthSession,
    headers: &HeaderMap,
    tiers: &[Challenge],
    plan: PlanType,
    balance: Option<f64>,
) -> Result<Response, WebError> {
    let balances = available_balances(tiers, plan);
    let wanted = balance.unwrap_or(DEFAULT_BALANCE);
    let chosen = if balances.contains(&wanted) {
        Some(wanted)
    } else {
        balances.first().copied()
    };
    let selected = chosen.and_then(|b| find_tier(tiers, plan, b));

    let template = ChallengesTemplate {
        plans: [PlanType::Standard, PlanType::Pro]
            .into_iter()
            .map(|p| PlanOption {
                value: p.as_str(),
                label: p.label(),
                selected: p == plan,
            })
            .collect(),
        balances: balances
            .iter()
            .map(|&b| BalanceOption {
                plan: plan.as_str(),
                value: format!("{b}"),
                label: format_money(b),
                selected: Some(b) == chosen,
            })
            .collect(),
        selected,
        phases: selected.map(Challenge::phases).unwrap_or_default(),
        signed_in: auth_session.user.is_some(),
    };
    render_page(auth_session, headers, "Challenges", &template).await
}

#[derive(Debug, Deserialize)]
pub struct EnrollForm {
    pub challenge_id: i64,
}

/// Purchase write path: one enrollment row per successful submission.
/// Failures re-render the catalog with a notice and never redirect.
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    headers: HeaderMap,
    Form(form): Form<EnrollForm>,
) -> Result<Response, WebError> {
    let Some(user) = auth_session.user.clone() else {
        notice::push(
            &auth_session.session,
            Notice::error("Please sign in to enroll in a challenge"),
        )
        .await;
        return Ok(redirect(&headers, "/auth?next=%2Fchallenges"));
    };

    let challenge_id = form.challenge_id;
    let challenge = match run_blocking(&state.store, move |s| s.get_challenge(challenge_id)).await
    {
        Ok(Some(c)) if c.is_active => c,
        Ok(_) => {
            notice::push(&auth_session.session, Notice::error("Challenge not found")).await;
            let tiers = load_catalog(&state, &auth_session).await;
            return challenges_page(&auth_session, &headers, &tiers, PlanType::Standard, None)
                .await;
        }
        Err(e) => {
            error!(error = %e, challenge_id, "failed to look up challenge");
            return enroll_failed(&state, &auth_session, &headers, PlanType::Standard, None).await;
        }
    };

    let new = NewEnrollment::for_purchase(user.id, &challenge);
    match run_blocking(&state.store, move |s| s.create_enrollment(&new)).await {
        Ok(enrollment) => {
            info!(
                enrollment_id = enrollment.id,
                user_id = user.id,
                challenge = %challenge.name,
                "enrolled in challenge"
            );
            notice::push(
                &auth_session.session,
                Notice::success(format!("Successfully enrolled in {}!", challenge.name)),
            )
            .await;
            Ok(redirect(&headers, "/dashboard"))
        }
        Err(e) => {
            error!(error = %e, user_id = user.id, challenge_id, "enrollment insert failed");
            enroll_failed(
                &state,
                &auth_session,
                &headers,
                challenge.plan_type,
                Some(challenge.balance),
            )
            .await
        }
    }
}

async fn enroll_failed(
    state: &AppState,
    auth_session: &AuthSession,
    headers: &HeaderMap,
    plan: PlanType,
    balance: Option<f64>,
) -> Result<Response, WebError> {
    notice::push(
        &auth_session.session,
        Notice::error("Failed to enroll in challenge"),
    )
    .await;
    let tiers = load_catalog(state, auth_session).await;
    challenges_page(auth_session, headers, &tiers, plan, balance).await
}

#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    pub next: Option<String>,
    pub mode: Option<String>,
}

pub async fn auth_form(
    auth_session: AuthSession,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
) -> Result<Response, WebError> {
    if auth_session.user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    let next = query.next.unwrap_or_default();
    let template = AuthTemplate {
        email: "",
        first_name: "",
        last_name: "",
        next: &next,
        error: None,
        sign_up: query.mode.as_deref() == Some("sign-up"),
    };
    render_page(&auth_session, &headers, "Sign In", &template).await
}

pub async fn sign_in(
    mut auth_session: AuthSession,
    headers: HeaderMap,
    Form(creds): Form<Credentials>,
) -> Result<Response, WebError> {
    let next = safe_next(creds.next.as_deref()).to_string();
    let email = creds.email.clone();

    let user = match auth_session.authenticate(creds).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            info!(email = %email, "sign-in rejected");
            let template = AuthTemplate {
                email: &email,
                first_name: "",
                last_name: "",
                next: &next,
                error: Some("Invalid email or password"),
                sign_up: false,
            };
            return render_page(&auth_session, &headers, "Sign In", &template).await;
        }
        Err(e) => {
            error!(error = %e, "authentication backend failed");
            return Err(WebError::internal("Sign-in is unavailable right now"));
        }
    };

    if let Err(e) = auth_session.login(&user).await {
        error!(error = %e, user_id = user.id, "failed to start session");
        return Err(WebError::internal("Failed to start session"));
    }
    info!(user_id = user.id, "signed in");
    Ok(Redirect::to(&next).into_response())
}

#[derive(Debug, Deserialize)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl SignUpForm {
    fn validate(&self) -> Result<(String, ProfileUpdate), ValidationError> {
        let email = normalize_email(&self.email)?;
        check_password(&self.password)?;
        let names = ProfileUpdate {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: String::new(),
        }
        .normalized()?;
        Ok((email, names))
    }
}

async fn sign_up_error(
    auth_session: &AuthSession,
    headers: &HeaderMap,
    form: &SignUpForm,
    message: &str,
) -> Result<Response, WebError> {
    let template = AuthTemplate {
        email: &form.email,
        first_name: &form.first_name,
        last_name: &form.last_name,
        next: "",
        error: Some(message),
        sign_up: true,
    };
    render_page(auth_session, headers, "Sign Up", &template).await
}

pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    mut auth_session: AuthSession,
    headers: HeaderMap,
    Form(form): Form<SignUpForm>,
) -> Result<Response, WebError> {
    let (email, names) = match form.validate() {
        Ok(v) => v,
        Err(e) => return sign_up_error(&auth_session, &headers, &form, &e.to_string()).await,
    };

    let password = form.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| WebError::internal(e.to_string()))??;

    let new = NewAccount {
        email,
        password_hash,
        first_name: names.first_name,
        last_name: names.last_name,
    };
    let account = match run_blocking(&state.store, move |s| s.create_account(&new)).await {
        Ok(account) => account,
        Err(SportfundError::DuplicateAccount { .. }) => {
            return sign_up_error(
                &auth_session,
                &headers,
                &form,
                "An account with this email already exists",
            )
            .await;
        }
        Err(e) => return Err(e.into()),
    };
    info!(user_id = account.id, "account created");

    let user = User::from(account);
    if let Err(e) = auth_session.login(&user).await {
        error!(error = %e, user_id = user.id, "failed to start session");
        return Err(WebError::internal("Failed to start session"));
    }
    notice::push(
        &auth_session.session,
        Notice::success("Account created. Welcome aboard!"),
    )
    .await;
    Ok(Redirect::to("/dashboard").into_response())
}

pub async fn sign_out(mut auth_session: AuthSession) -> Result<Response, WebError> {
    match auth_session.logout().await {
        Ok(Some(user)) => info!(user_id = user.id, "signed out"),
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "failed to end session");
            return Err(WebError::internal("Failed to sign out"));
        }
    }
    Ok(Redirect::to("/").into_response())
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let user_id = signed_in_user(&auth_session)?.id;

    let (profile, enrollments) = tokio::join!(
        run_blocking(&state.store, move |s| s.get_profile(user_id)),
        run_blocking(&state.store, move |s| s.list_enrollments_for_user(user_id)),
    );

    let profile = profile.unwrap_or_else(|e| {
        error!(error = %e, user_id, "failed to load profile");
        None
    });
    let views = match enrollments {
        Ok(views) => views,
        Err(e) => {
            error!(error = %e, user_id, "failed to load enrollments");
            notice::push(
                &auth_session.session,
                Notice::error("Failed to load your challenges"),
            )
            .await;
            Vec::new()
        }
    };

    let display_name = profile
        .as_ref()
        .map_or("Trader", |p| p.display_name())
        .to_string();
    let total = views.len();
    let (active, completed) = partition_for_dashboard(views);

    let template = DashboardTemplate {
        display_name: &display_name,
        active: &active,
        completed: &completed,
        total,
    };
    render_page(&auth_session, &headers, "Dashboard", &template).await
}

pub async fn profile_form(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let user = signed_in_user(&auth_session)?;
    let user_id = user.id;
    let blank = Profile {
        user_id,
        email: user.email.clone(),
        ..Profile::default()
    };

    let profile = match run_blocking(&state.store, move |s| s.get_profile(user_id)).await {
        Ok(Some(profile)) => profile,
        Ok(None) => blank,
        Err(e) => {
            error!(error = %e, user_id, "failed to load profile");
            notice::push(&auth_session.session, Notice::error("Failed to load profile")).await;
            blank
        }
    };

    let template = ProfileTemplate {
        email: &profile.email,
        first_name: &profile.first_name,
        last_name: &profile.last_name,
        phone: &profile.phone,
    };
    render_page(&auth_session, &headers, "Profile", &template).await
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    headers: HeaderMap,
    Form(form): Form<ProfileUpdate>,
) -> Result<Response, WebError> {
    let user = signed_in_user(&auth_session)?;
    let user_id = user.id;

    let failure = match form.normalized() {
        Ok(update) => {
            let for_store = update.clone();
            match run_blocking(&state.store, move |s| s.update_profile(user_id, &for_store)).await
            {
                Ok(()) => {
                    info!(user_id, "profile updated");
                    notice::push(
                        &auth_session.session,
                        Notice::success("Profile updated successfully!"),
                    )
                    .await;
                    return Ok(Redirect::to("/profile").into_response());
                }
                Err(e) => {
                    error!(error = %e, user_id, "profile update failed");
                    "Failed to update profile".to_string()
                }
            }
        }
        Err(e) => e.to_string(),
    };

    notice::push(&auth_session.session, Notice::error(failure)).await;
    let template = ProfileTemplate {
        email: &user.email,
        first_name: &form.first_name,
        last_name: &form.last_name,
        phone: &form.phone,
    };
    render_page(&auth_session, &headers, "Profile", &template).await
}

pub async fn admin_overview(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let (enrollments, challenges) = tokio::join!(
        run_blocking(&state.store, |s| s.list_all_enrollments()),
        run_blocking(&state.store, |s| s.list_all_challenges()),
    );
    let enrollments = enrollments?;
    let challenges = challenges?;

    let overview = AdminOverview::compute(&enrollments, &challenges);
    let recent = &enrollments[..enrollments.len().min(RECENT_ENROLLMENTS)];
    let template = AdminOverviewTemplate {
        overview: &overview,
        recent,
    };
    render_page(&auth_session, &headers, "Admin", &template).await
}

pub async fn admin_challenges(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let challenges = run_blocking(&state.store, |s| s.list_all_challenges()).await?;
    let template = AdminChallengesTemplate {
        challenges: &challenges,
    };
    render_page(&auth_session, &headers, "Admin: Challenges", &template).await
}

pub async fn toggle_challenge(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    let challenge = run_blocking(&state.store, move |s| s.get_challenge(id))
        .await?
        .ok_or_else(|| WebError::not_found("Challenge not found"))?;
    let active = !challenge.is_active;
    run_blocking(&state.store, move |s| s.set_challenge_active(id, active)).await?;

    info!(challenge_id = id, active, "challenge availability changed");
    let state_word = if active { "active" } else { "inactive" };
    notice::push(
        &auth_session.session,
        Notice::success(format!("{} is now {state_word}", challenge.name)),
    )
    .await;
    Ok(Redirect::to("/admin/challenges").into_response())
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

pub async fn admin_enrollments(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> Result<Response, WebError> {
    let status = match query.status.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(
            raw.parse::<EnrollmentStatus>()
                .map_err(|e| WebError::bad_request(e.to_string()))?,
        ),
        _ => None,
    };

    let all = run_blocking(&state.store, |s| s.list_all_enrollments()).await?;
    let rows = filter_by_status(all, status);
    let template = AdminEnrollmentsTemplate {
        enrollments: &rows,
        filters: AdminEnrollmentsTemplate::status_filters(status),
        statuses: &EnrollmentStatus::ALL,
    };
    render_page(&auth_session, &headers, "Admin: Enrollments", &template).await
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
}

pub async fn update_enrollment_status(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    Path(id): Path<i64>,
    Form(form): Form<StatusForm>,
) -> Result<Response, WebError> {
    let status = form
        .status
        .parse::<EnrollmentStatus>()
        .map_err(|e| WebError::bad_request(e.to_string()))?;
    run_blocking(&state.store, move |s| s.set_enrollment_status(id, status)).await?;

    info!(enrollment_id = id, %status, "enrollment status set");
    notice::push(
        &auth_session.session,
        Notice::success(format!("Enrollment #{id} marked {status}")),
    )
    .await;
    Ok(Redirect::to("/admin/enrollments").into_response())
}

#[derive(Debug, Deserialize)]
pub struct UserSearch {
    #[serde(default)]
    pub q: String,
}

pub async fn admin_users(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    headers: HeaderMap,
    Query(search): Query<UserSearch>,
) -> Result<Response, WebError> {
    let current_user = signed_in_user(&auth_session)?.id;
    let all = run_blocking(&state.store, |s| s.list_accounts()).await?;
    let total = all.len();
    let users = search_accounts(all, &search.q);
    let template = AdminUsersTemplate {
        users: &users,
        total,
        query: search.q.trim(),
        current_user,
    };
    render_page(&auth_session, &headers, "Admin: Users", &template).await
}

/// Grants or revokes admin access. An admin cannot demote themselves.
pub async fn toggle_admin(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    let current_user = signed_in_user(&auth_session)?.id;
    let account = run_blocking(&state.store, move |s| s.get_account(id))
        .await?
        .ok_or_else(|| WebError::not_found("User not found"))?;

    if account.id == current_user {
        notice::push(
            &auth_session.session,
            Notice::error("You cannot change your own admin access"),
        )
        .await;
        return Ok(Redirect::to("/admin/users").into_response());
    }

    let grant = !account.is_admin;
    let email = account.email.clone();
    run_blocking(&state.store, move |s| s.set_admin(&email, grant)).await?;

    info!(user_id = id, admin = grant, by = current_user, "admin access changed");
    let message = if grant {
        format!("{} is now an administrator", account.email)
    } else {
        format!("{} is no longer an administrator", account.email)
    };
    notice::push(&auth_session.session, Notice::success(message)).await;
    Ok(Redirect::to("/admin/users").into_response())
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn not_found() -> WebError {
    WebError::not_found("Page not found")
}
