use crate::config::ConfigError;
use crate::gamification::AchievementError;
use crate::import::AttendanceImportError;
use crate::incentives::IncentiveError;
use crate::ledger::LedgerError;
use crate::rules::RuleServiceError;
use crate::store::StoreError;
use crate::sync::SyncError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Store(StoreError),
    Rules(RuleServiceError),
    Achievement(AchievementError),
    Incentive(IncentiveError),
    Import(AttendanceImportError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Store(err) => store_status(err),
            AppError::Rules(RuleServiceError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Rules(RuleServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Rules(RuleServiceError::Ledger(LedgerError::MemberNotFound(_))) => {
                StatusCode::NOT_FOUND
            }
            AppError::Rules(RuleServiceError::Store(err)) => store_status(err),
            AppError::Achievement(AchievementError::Validation(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Achievement(
                AchievementError::NotFound(_) | AchievementError::MemberNotFound(_),
            ) => StatusCode::NOT_FOUND,
            AppError::Achievement(AchievementError::AlreadyAwarded { .. }) => StatusCode::CONFLICT,
            AppError::Achievement(AchievementError::Sync(SyncError::Ledger(
                LedgerError::MemberNotFound(_),
            ))) => StatusCode::NOT_FOUND,
            AppError::Achievement(AchievementError::Store(err))
            | AppError::Achievement(AchievementError::Sync(SyncError::Store(err)))
            | AppError::Achievement(AchievementError::Sync(SyncError::Ledger(LedgerError::Store(
                err,
            ))))
            | AppError::Rules(RuleServiceError::Ledger(LedgerError::Store(err))) => store_status(err),
            AppError::Incentive(IncentiveError::StandardNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Incentive(IncentiveError::Routine(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Incentive(IncentiveError::Store(err)) => store_status(err),
            AppError::Import(AttendanceImportError::Csv(_))
            | AppError::Import(AttendanceImportError::InvalidRow { .. }) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Itemised validation messages, when the failure carries any.
    fn details(&self) -> Option<&[String]> {
        match self {
            AppError::Rules(RuleServiceError::Validation(errors)) => Some(errors.messages()),
            AppError::Achievement(AchievementError::Validation(errors)) => Some(&errors.0),
            _ => None,
        }
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Store(err) => write!(f, "storage error: {}", err),
            AppError::Rules(err) => write!(f, "{}", err),
            AppError::Achievement(err) => write!(f, "{}", err),
            AppError::Incentive(err) => write!(f, "{}", err),
            AppError::Import(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Rules(err) => Some(err),
            AppError::Achievement(err) => Some(err),
            AppError::Incentive(err) => Some(err),
            AppError::Import(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.details() {
            Some(errors) => json!({ "error": self.to_string(), "errors": errors }),
            None => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<RuleServiceError> for AppError {
    fn from(value: RuleServiceError) -> Self {
        Self::Rules(value)
    }
}

impl From<AchievementError> for AppError {
    fn from(value: AchievementError) -> Self {
        Self::Achievement(value)
    }
}

impl From<IncentiveError> for AppError {
    fn from(value: IncentiveError) -> Self {
        Self::Incentive(value)
    }
}

impl From<AttendanceImportError> for AppError {
    fn from(value: AttendanceImportError) -> Self {
        Self::Import(value)
    }
}
