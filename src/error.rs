use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use sea_orm::DbErr;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("authentication required")]
  Unauthenticated,
  #[error("forbidden: {0}")]
  Forbidden(String),
  #[error("{0} not found")]
  NotFound(&'static str),
  #[error("invalid input: {0}")]
  Validation(String),
  #[error("conflict: {0}")]
  Conflict(String),
  #[error("external service: {0}")]
  External(String),
  #[error("internal: {0}")]
  Internal(String),
  #[error(transparent)]
  Db(#[from] DbErr),
}

impl Error {
  pub fn forbidden(reason: impl Into<String>) -> Self {
    Self::Forbidden(reason.into())
  }

  pub fn validation(reason: impl Into<String>) -> Self {
    Self::Validation(reason.into())
  }

  pub fn conflict(reason: impl Into<String>) -> Self {
    Self::Conflict(reason.into())
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::Unauthenticated => StatusCode::UNAUTHORIZED,
      Self::Forbidden(_) => StatusCode::FORBIDDEN,
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
      Self::Conflict(_) => StatusCode::CONFLICT,
      Self::External(_) => StatusCode::BAD_GATEWAY,
      Self::Internal(_) | Self::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Message safe to show to the caller. Storage and internal details stay
  /// in the logs.
  pub fn user_message(&self) -> String {
    match self {
      Self::Internal(_) | Self::Db(_) => "Internal error, try again later".into(),
      Self::External(_) => "Payment provider is unavailable".into(),
      other => other.to_string(),
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!("request failed: {self}");
    } else {
      tracing::debug!("request rejected: {self}");
    }

    let body = json::json!({ "error": self.user_message() });
    (status, Json(body)).into_response()
  }
}
