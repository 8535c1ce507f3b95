use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use crate::{error::AppError, service::AccountService};

pub type AppState = Arc<AccountService>;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const OPENAPI_DOC: &str = include_str!("../docs/openapi.yaml");

#[derive(Deserialize)]
struct CreateAccountJson {
    id: String,
    balance: f64,
}

#[derive(Deserialize)]
struct AmountJson {
    amount: f64,
}

#[derive(Serialize)]
struct AccountJson {
    id: String,
    balance: f64,
}

#[derive(Debug, PartialEq)]
pub struct NewAccount {
    pub id: String,
    pub balance: f64,
}

/// A finite, strictly positive amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Amount(f64);

impl Amount {
    pub fn value(self) -> f64 {
        self.0
    }
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, AppError> {
    serde_json::from_str(body).map_err(|err| AppError::validation(format!("Invalid JSON: {err}")))
}

pub fn parse_new_account(body: &str) -> Result<NewAccount, AppError> {
    let CreateAccountJson { id, balance } = parse_json(body)?;
    if id.trim().is_empty() {
        return Err(AppError::validation("id must not be empty"));
    }
    // path segments are matched verbatim, so a padded id could never be reached
    if id.trim() != id {
        return Err(AppError::validation(
            "id must not start or end with whitespace",
        ));
    }
    if !balance.is_finite() || balance < 0.0 {
        return Err(AppError::validation(
            "balance must be a finite, non-negative number",
        ));
    }
    Ok(NewAccount { id, balance })
}

pub fn parse_amount(body: &str) -> Result<Amount, AppError> {
    let AmountJson { amount } = parse_json(body)?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::validation(
            "amount must be a finite, positive number",
        ));
    }
    Ok(Amount(amount))
}

fn request_id(header: &HeaderMap) -> String {
    match header.get(REQUEST_ID_HEADER).and_then(|value| value.to_str().ok()) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn account_response(status: StatusCode, id: String, balance: f64) -> Response {
    (status, Json(AccountJson { id, balance })).into_response()
}

pub async fn create_account(
    State(state): State<AppState>,
    header: HeaderMap,
    body: String,
) -> Response {
    let request_id = request_id(&header);
    let span = tracing::info_span!("create_account", request_id = %request_id);
    let response = async move {
        let NewAccount { id, balance } = parse_new_account(&body)?;
        let balance = state.create(&id, balance).await?;
        Ok::<_, AppError>(account_response(StatusCode::CREATED, id, balance))
    }
    .instrument(span)
    .await
    .unwrap_or_else(|err| err.into_response());
    with_request_id(response, &request_id)
}

pub async fn deposit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    header: HeaderMap,
    body: String,
) -> Response {
    let request_id = request_id(&header);
    let span = tracing::info_span!("deposit", request_id = %request_id, account = %id);
    let response = async move {
        state.resolve(&id).await?;
        let amount = parse_amount(&body)?;
        let balance = state.deposit(&id, amount.value()).await?;
        Ok::<_, AppError>(account_response(StatusCode::OK, id, balance))
    }
    .instrument(span)
    .await
    .unwrap_or_else(|err| {
        tracing::info!("Deposit rejected: {err}");
        err.into_response()
    });
    with_request_id(response, &request_id)
}

pub async fn withdraw(
    State(state): State<AppState>,
    Path(id): Path<String>,
    header: HeaderMap,
    body: String,
) -> Response {
    let request_id = request_id(&header);
    let span = tracing::info_span!("withdraw", request_id = %request_id, account = %id);
    let response = async move {
        state.resolve(&id).await?;
        let amount = parse_amount(&body)?;
        let balance = state.withdraw(&id, amount.value()).await?;
        Ok::<_, AppError>(account_response(StatusCode::OK, id, balance))
    }
    .instrument(span)
    .await
    .unwrap_or_else(|err| {
        tracing::info!("Withdraw rejected: {err}");
        err.into_response()
    });
    with_request_id(response, &request_id)
}

pub async fn get_balance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    header: HeaderMap,
) -> Response {
    let request_id = request_id(&header);
    let span = tracing::info_span!("get_balance", request_id = %request_id, account = %id);
    let response = match state.balance(&id).instrument(span).await {
        Ok(balance) => (StatusCode::OK, Json(json!({"balance": balance}))).into_response(),
        Err(err) => err.into_response(),
    };
    with_request_id(response, &request_id)
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

pub async fn api_doc() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/yaml")], OPENAPI_DOC)
}
