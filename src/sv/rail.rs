//! Outbound payment rail used for payouts.
//!
//! The production rail is the CryptoBot Crypto Pay API
//! (https://help.send.tg/en/articles/10279948-crypto-pay-api). Transfers are
//! keyed by `spend_id`, which the API uses to reject duplicates, so a payout
//! retried with the same idempotency key can never be paid twice.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::prelude::*;

pub const MAINNET_URL: &str = "https://pay.crypt.bot/api/";
pub const TESTNET_URL: &str = "https://testnet-pay.crypt.bot/api/";

const ASSET: &str = "USDT";

#[derive(Debug, Clone, thiserror::Error)]
pub enum RailError {
  /// The rail answered and refused the transfer; nothing was sent.
  #[error("transfer rejected: {0}")]
  Rejected(String),
  /// No definitive answer (timeout, transport, garbled response); the
  /// transfer may or may not have happened.
  #[error("rail unavailable: {0}")]
  Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
  pub idempotency_key: String,
  pub destination: String,
  pub amount: i64,
  pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
  pub transfer_id: String,
  pub amount: i64,
}

#[async_trait]
pub trait PaymentRail: Send + Sync {
  fn provider(&self) -> &'static str;

  async fn transfer(
    &self,
    req: &TransferRequest,
  ) -> std::result::Result<Transfer, RailError>;

  /// Looks a transfer up by the idempotency key it was issued with.
  async fn find_transfer(
    &self,
    idempotency_key: &str,
  ) -> std::result::Result<Option<Transfer>, RailError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
  ok: bool,
  result: Option<T>,
  error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
  code: i32,
  name: String,
}

impl<T> ApiResponse<T> {
  /// Only a client error proves the request was refused. Server errors and
  /// unexplained failures may still have moved money.
  fn into_result(self) -> std::result::Result<T, RailError> {
    if self.ok {
      return self
        .result
        .ok_or_else(|| RailError::Unavailable("Empty result".into()));
    }

    match self.error {
      Some(err) if (400..500).contains(&err.code) => {
        Err(RailError::Rejected(format!("{}: {}", err.name, err.code)))
      }
      Some(err) => {
        Err(RailError::Unavailable(format!("{}: {}", err.name, err.code)))
      }
      None => Err(RailError::Unavailable("Unknown error".into())),
    }
  }
}

#[derive(Debug, Deserialize)]
struct ApiTransfer {
  transfer_id: i64,
  amount: String,
  status: String,
}

#[derive(Debug, Serialize)]
struct TransferParams<'a> {
  user_id: i64,
  asset: &'a str,
  amount: String,
  spend_id: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  comment: Option<&'a str>,
}

#[derive(Clone)]
pub struct CryptoBot {
  client: Client,
  base_url: String,
  api_token: String,
}

impl CryptoBot {
  pub fn new(
    api_token: String,
    use_testnet: bool,
    timeout: Duration,
  ) -> anyhow::Result<Self> {
    let base_url =
      if use_testnet { TESTNET_URL } else { MAINNET_URL }.to_string();
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .context("Failed to build CryptoBot HTTP client")?;

    Ok(Self { client, base_url, api_token })
  }

  async fn get<T: for<'de> Deserialize<'de>>(
    &self,
    method: &str,
    params: HashMap<&str, String>,
  ) -> std::result::Result<T, RailError> {
    let url = format!("{}{}", self.base_url, method);
    let response = self
      .client
      .get(&url)
      .header("Crypto-Pay-API-Token", &self.api_token)
      .query(&params)
      .send()
      .await
      .map_err(|e| RailError::Unavailable(format!("Request failed: {e}")))?;

    Self::unwrap(response).await
  }

  async fn post<T: for<'de> Deserialize<'de>, B: Serialize>(
    &self,
    method: &str,
    body: &B,
  ) -> std::result::Result<T, RailError> {
    let url = format!("{}{}", self.base_url, method);
    let response = self
      .client
      .post(&url)
      .header("Crypto-Pay-API-Token", &self.api_token)
      .json(body)
      .send()
      .await
      .map_err(|e| RailError::Unavailable(format!("Request failed: {e}")))?;

    Self::unwrap(response).await
  }

  async fn unwrap<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
  ) -> std::result::Result<T, RailError> {
    let api_response: ApiResponse<T> = response.json().await.map_err(|e| {
      RailError::Unavailable(format!("Failed to parse response: {e}"))
    })?;
    api_response.into_result()
  }

  fn convert(transfer: ApiTransfer) -> std::result::Result<Transfer, RailError> {
    let amount = parse_cents(&transfer.amount).ok_or_else(|| {
      RailError::Unavailable(format!("Bad amount `{}`", transfer.amount))
    })?;
    Ok(Transfer { transfer_id: transfer.transfer_id.to_string(), amount })
  }
}

#[async_trait]
impl PaymentRail for CryptoBot {
  fn provider(&self) -> &'static str {
    "cryptobot"
  }

  async fn transfer(
    &self,
    req: &TransferRequest,
  ) -> std::result::Result<Transfer, RailError> {
    let user_id = req.destination.trim().parse().map_err(|_| {
      RailError::Rejected(format!(
        "Destination `{}` is not a Telegram user id",
        req.destination
      ))
    })?;

    let params = TransferParams {
      user_id,
      asset: ASSET,
      amount: format_cents(req.amount),
      spend_id: &req.idempotency_key,
      comment: req.comment.as_deref(),
    };

    let transfer: ApiTransfer = self.post("transfer", &params).await?;
    Self::convert(transfer)
  }

  async fn find_transfer(
    &self,
    idempotency_key: &str,
  ) -> std::result::Result<Option<Transfer>, RailError> {
    #[derive(Deserialize)]
    struct ItemsResponse {
      items: Vec<ApiTransfer>,
    }

    let mut params = HashMap::new();
    params.insert("asset", ASSET.to_string());
    params.insert("spend_id", idempotency_key.to_string());

    let response: ItemsResponse = self.get("getTransfers", params).await?;
    response
      .items
      .into_iter()
      .find(|t| t.status == "completed")
      .map(Self::convert)
      .transpose()
  }
}

/// Cents to the decimal string the API expects (`1234` -> `"12.34"`).
pub fn format_cents(cents: i64) -> String {
  let sign = if cents < 0 { "-" } else { "" };
  let abs = cents.unsigned_abs();
  format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Parses an API decimal amount back to cents, rejecting sub-cent precision.
pub fn parse_cents(raw: &str) -> Option<i64> {
  let raw = raw.trim();
  let (whole, frac) = raw.split_once('.').unwrap_or((raw, ""));
  if frac.len() > 2 || whole.is_empty() {
    return None;
  }

  let whole: i64 = whole.parse().ok()?;
  let frac: i64 = if frac.is_empty() {
    0
  } else {
    format!("{frac:0<2}").parse().ok()?
  };
  whole.checked_mul(100)?.checked_add(frac)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_cents() {
    assert_eq!(format_cents(1234), "12.34");
    assert_eq!(format_cents(100), "1.00");
    assert_eq!(format_cents(5), "0.05");
  }

  #[test]
  fn test_parse_cents() {
    assert_eq!(parse_cents("12.34"), Some(1234));
    assert_eq!(parse_cents("12.3"), Some(1230));
    assert_eq!(parse_cents("7"), Some(700));
    assert_eq!(parse_cents("0.001"), None);
    assert_eq!(parse_cents("abc"), None);
  }

  #[test]
  fn test_parse_transfer_response() {
    let body = r#"{"ok":true,"result":{"transfer_id":42,"spend_id":"k","user_id":7,"asset":"USDT","amount":"3.50","status":"completed","completed_at":"2026-01-01T00:00:00Z"}}"#;
    let parsed: ApiResponse<ApiTransfer> = json::from_str(body).unwrap();
    let transfer = CryptoBot::convert(parsed.result.unwrap()).unwrap();
    assert_eq!(transfer.transfer_id, "42");
    assert_eq!(transfer.amount, 350);
  }

  fn outcome(body: &str) -> std::result::Result<ApiTransfer, RailError> {
    json::from_str::<ApiResponse<ApiTransfer>>(body).unwrap().into_result()
  }

  #[test]
  fn test_client_error_is_a_rejection() {
    let body = r#"{"ok":false,"error":{"code":400,"name":"INSUFFICIENT_FUNDS"}}"#;
    assert!(matches!(
      outcome(body),
      Err(RailError::Rejected(msg)) if msg == "INSUFFICIENT_FUNDS: 400"
    ));
  }

  #[test]
  fn test_server_error_is_ambiguous() {
    let body = r#"{"ok":false,"error":{"code":500,"name":"INTERNAL_ERROR"}}"#;
    assert!(matches!(outcome(body), Err(RailError::Unavailable(_))));

    let bare = r#"{"ok":false}"#;
    assert!(matches!(outcome(bare), Err(RailError::Unavailable(_))));

    let empty = r#"{"ok":true}"#;
    assert!(matches!(outcome(empty), Err(RailError::Unavailable(_))));
  }
}
