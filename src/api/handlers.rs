use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::application::{require_admin, AppError, LoanRequest, NewUser};
use crate::domain::{parse_amount, Amount, LoanId, LoanPurpose, LoanStatus, User};

use super::response::ApiError;
use super::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Browser forms post numbers as strings; accept either.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum NumberInput {
    Int(i64),
    Text(String),
}

impl NumberInput {
    fn amount(&self) -> ApiResult<Amount> {
        match self {
            NumberInput::Int(value) => Ok(*value),
            NumberInput::Text(text) => parse_amount(text)
                .map_err(|e| ApiError::bad_request(format!("Invalid amount: {}", e))),
        }
    }

    fn months(&self) -> ApiResult<u32> {
        let raw = match self {
            NumberInput::Int(value) => *value,
            NumberInput::Text(text) => text
                .trim()
                .parse::<i64>()
                .map_err(|_| ApiError::bad_request("Loan term must be a whole number of months"))?,
        };
        u32::try_from(raw)
            .map_err(|_| ApiError::bad_request("Loan term must be a whole number of months"))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SignupBody {
    name: String,
    email: String,
    password: String,
    phone: String,
    pan: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LoginBody {
    email: String,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ProfileBody {
    name: Option<String>,
    phone: Option<String>,
    pan: Option<String>,
}

/// Body of quote and apply requests. A client-computed `emi` may be present and is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoanBody {
    amount: NumberInput,
    #[serde(alias = "duration")]
    term_months: NumberInput,
    #[serde(default)]
    purpose: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StatusBody {
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StatusFilter {
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AuditFilter {
    loan_id: Option<String>,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

async fn current_user(state: &AppState, headers: &HeaderMap) -> ApiResult<User> {
    let token = bearer_token(headers).ok_or_else(|| {
        ApiError::from(AppError::Unauthorized(
            "no authentication token provided".to_string(),
        ))
    })?;
    Ok(state.service.authenticate(token).await?)
}

async fn current_admin(state: &AppState, headers: &HeaderMap) -> ApiResult<User> {
    let user = current_user(state, headers).await?;
    require_admin(&user)?;
    Ok(user)
}

fn parse_loan_id(raw: &str) -> ApiResult<LoanId> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::LoanNotFound(raw.to_string()).into())
}

pub(crate) async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ========================
// Auth
// ========================

pub(crate) async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let form = body(payload)?;
    let session = state
        .service
        .register_user(NewUser {
            name: form.name,
            email: form.email,
            password: form.password,
            phone: form.phone,
            pan: form.pan,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Signup successful",
            "token": session.token,
            "user": session.user,
        })),
    ))
}

pub(crate) async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let form = body(payload)?;
    let session = state.service.login(&form.email, &form.password).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "token": session.token,
        "user": session.user,
    })))
}

pub(crate) async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let user = current_user(&state, &headers).await?;
    Ok(Json(json!({ "success": true, "user": user })))
}

pub(crate) async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ProfileBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let user = current_user(&state, &headers).await?;
    let form = body(payload)?;
    let updated = state
        .service
        .update_profile(user.id, form.name, form.phone, form.pan)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Profile updated",
        "user": updated,
    })))
}

// ========================
// Loans
// ========================

pub(crate) async fn rates(State(state): State<AppState>) -> Json<Value> {
    let table = state.service.rates();
    let rates: Vec<Value> = table
        .effective_rates()
        .into_iter()
        .map(|(purpose, rate)| {
            json!({
                "purpose": purpose,
                "label": purpose.label(),
                "annualRatePercent": rate,
            })
        })
        .collect();
    let limits = state.service.limits();

    Json(json!({
        "success": true,
        "defaultRatePercent": table.default_rate_percent,
        "rates": rates,
        "limits": {
            "minAmount": limits.min_amount,
            "maxAmount": limits.max_amount,
            "minTermMonths": limits.min_term_months,
            "maxTermMonths": limits.max_term_months,
        },
    }))
}

pub(crate) async fn quote(
    State(state): State<AppState>,
    payload: Result<Json<LoanBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let form = body(payload)?;
    let amount = form.amount.amount()?;
    let months = form.term_months.months()?;
    let purpose = form.purpose.unwrap_or_default();

    let quote = state.service.quote(amount, months, &purpose)?;
    Ok(Json(json!({
        "success": true,
        "purpose": LoanPurpose::parse_lenient(&purpose),
        "quote": quote,
    })))
}

pub(crate) async fn apply(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LoanBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user = current_user(&state, &headers).await?;
    let form = body(payload)?;
    let purpose = form
        .purpose
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::from(AppError::validation("Loan purpose is required")))?;

    let request = LoanRequest {
        amount: form.amount.amount()?,
        term_months: form.term_months.months()?,
        purpose,
    };
    let loan = state.service.apply_for_loan(user.id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Application submitted",
            "loan": loan,
        })),
    ))
}

pub(crate) async fn my_loans(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let user = current_user(&state, &headers).await?;
    let loans = state.service.list_my_loans(user.id).await?;
    Ok(Json(json!({ "success": true, "loans": loans })))
}

pub(crate) async fn get_loan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let user = current_user(&state, &headers).await?;
    let loan = state.service.get_loan_for(&user, parse_loan_id(&id)?).await?;
    Ok(Json(json!({ "success": true, "loan": loan })))
}

// ========================
// Administration
// ========================

pub(crate) async fn admin_loans(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Json<Value>> {
    current_admin(&state, &headers).await?;
    let status = match filter.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(
            LoanStatus::from_str(raw)
                .ok_or_else(|| ApiError::from(AppError::InvalidStatus(raw.to_string())))?,
        ),
    };
    let loans = state.service.list_all_loans(status).await?;
    Ok(Json(json!({ "success": true, "loans": loans })))
}

pub(crate) async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(loan_id): Path<String>,
    payload: Result<Json<StatusBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let admin = current_admin(&state, &headers).await?;
    let form = body(payload)?;
    let loan = state
        .service
        .update_loan_status(&admin, parse_loan_id(&loan_id)?, &form.status)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Loan status updated",
        "loan": loan,
    })))
}

pub(crate) async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    current_admin(&state, &headers).await?;
    let stats = state.service.admin_stats().await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

pub(crate) async fn users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    current_admin(&state, &headers).await?;
    let users = state.service.list_users().await?;
    Ok(Json(json!({ "success": true, "users": users })))
}

pub(crate) async fn audit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<AuditFilter>,
) -> ApiResult<Json<Value>> {
    current_admin(&state, &headers).await?;
    let loan_id = match filter.loan_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_loan_id(raw)?),
    };
    let entries = state.service.list_audit_log(loan_id).await?;
    Ok(Json(json!({ "success": true, "entries": entries })))
}
