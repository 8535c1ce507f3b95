use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::api::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Account {0} not found")]
    AccountNotFound(String),

    #[error("not enough money: account {id} has {balance}, requested {requested}")]
    InsufficientFunds {
        id: String,
        balance: f64,
        requested: f64,
    },

    #[error("Account {0} already exists")]
    AccountExists(String),

    #[error("Database unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The withdrawal was applied in memory but the store write failed.
    #[error("Withdrawal from account {id} was not persisted: {source}")]
    WithdrawNotPersisted {
        id: String,
        #[source]
        source: StoreError,
    },
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            AppError::AccountExists(_) => StatusCode::CONFLICT,
            AppError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::WithdrawNotPersisted { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({"error": self.to_string()}))).into_response()
    }
}
