use std::sync::Arc;

use axum::{
  Json,
  body::Bytes,
  extract::{FromRequestParts, Path, Query, State},
  http::{HeaderMap, StatusCode, request::Parts},
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{
  entity::{
    AccessRole, AffiliateStatus, UserRole, affiliate, brand, brand_access,
    genre, order, payment_method, payout, platform_referral, user,
  },
  prelude::*,
  state::AppState,
  sv::{
    access::Role,
    activity::Event,
    affiliate::{AffiliateStats, Enrolment},
    attribution::OrderEvent,
    brand::Moderation,
    commission::{CommissionConfig, CommissionUpdate},
    ledger::{BrandCheck, Breakdown, Drift, Summary},
    payout::Receipt,
    referral::ReferralStats,
  },
};

/// Set by the upstream identity provider after it authenticated the caller.
pub const IDENTITY_HEADER: &str = "x-user-email";
/// Hex HMAC-SHA256 of the raw order webhook body.
pub const SIGNATURE_HEADER: &str = "x-signature";

type HmacSha256 = Hmac<Sha256>;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
  headers
    .get(name)
    .and_then(|value| value.to_str().ok())
    .map(str::trim)
    .filter(|value| !value.is_empty())
}

/// Authenticated caller; the account is created on first sight.
pub struct Identity(pub user::Model);

impl FromRequestParts<Arc<AppState>> for Identity {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    app: &Arc<AppState>,
  ) -> Result<Self> {
    let email =
      header(&parts.headers, IDENTITY_HEADER).ok_or(Error::Unauthenticated)?;
    let user = app.sv().user.get_or_create(email).await?;
    Ok(Self(user))
  }
}

/// Caller email if one was supplied, for routes open to anonymous readers.
pub struct Viewer(pub Option<String>);

impl FromRequestParts<Arc<AppState>> for Viewer {
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    _: &Arc<AppState>,
  ) -> Result<Self> {
    Ok(Self(header(&parts.headers, IDENTITY_HEADER).map(str::to_lowercase)))
  }
}

fn verify_signature(
  secret: &str,
  headers: &HeaderMap,
  body: &[u8],
) -> Result<()> {
  let provided =
    header(headers, SIGNATURE_HEADER).ok_or(Error::Unauthenticated)?;
  let provided = hex::decode(provided.trim_start_matches("sha256="))
    .map_err(|_| Error::Unauthenticated)?;

  let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
    .map_err(|e| Error::Internal(format!("webhook key: {e}")))?;
  mac.update(body);
  mac.verify_slice(&provided).map_err(|_| {
    warn!("order webhook with a bad signature");
    Error::Unauthenticated
  })
}

pub async fn health() -> &'static str {
  "OK"
}

#[derive(Serialize)]
pub struct Ingested {
  status: &'static str,
  order: order::Model,
}

pub async fn ingest_order(
  State(app): State<Arc<AppState>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<Ingested>> {
  verify_signature(&app.config.webhook_secret, &headers, &body)?;
  let event: OrderEvent = json::from_slice(&body)
    .map_err(|e| Error::validation(format!("malformed order event: {e}")))?;

  let recorded = app.sv().ledger.ingest(event).await?;
  let status = if recorded.is_duplicate() { "duplicate" } else { "recorded" };
  Ok(Json(Ingested { status, order: recorded.order().clone() }))
}

#[derive(Serialize)]
pub struct Earnings {
  summary: Summary,
  breakdown: Breakdown,
}

pub async fn earnings(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
) -> Result<Json<Earnings>> {
  let ledger = app.sv().ledger;
  Ok(Json(Earnings {
    summary: ledger.summary(user.id).await?,
    breakdown: ledger.breakdown(user.id).await?,
  }))
}

pub async fn request_payout(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
) -> Result<Json<Receipt>> {
  Ok(Json(app.sv().payout.request(user.id).await?))
}

pub async fn payouts(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
) -> Result<Json<Vec<payout::Model>>> {
  Ok(Json(app.sv().payout.history(user.id).await?))
}

#[derive(Deserialize)]
pub struct PaymentMethodReq {
  provider: String,
  destination: String,
}

pub async fn set_payment_method(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Json(req): Json<PaymentMethodReq>,
) -> Result<Json<payment_method::Model>> {
  let method = app
    .sv()
    .user
    .set_payment_method(user.id, &req.provider, &req.destination)
    .await?;
  Ok(Json(method))
}

#[derive(Deserialize)]
pub struct RoleReq {
  email: String,
  role: String,
}

pub async fn set_user_role(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Json(req): Json<RoleReq>,
) -> Result<Json<user::Model>> {
  let role = match req.role.parse::<Role>()? {
    Role::User => UserRole::User,
    Role::PlatformAdmin => UserRole::PlatformAdmin,
    Role::SuperAdmin => UserRole::SuperAdmin,
    other => {
      return Err(Error::validation(format!("{other} is a brand role")));
    }
  };
  Ok(Json(app.sv().user.set_role(&user.email, &req.email, role).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralReq {
  referrer_email: String,
  #[serde(default)]
  link_id: String,
}

pub async fn register_referral(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Json(req): Json<ReferralReq>,
) -> Result<Json<platform_referral::Model>> {
  let referral = app
    .sv()
    .referral
    .register(&req.referrer_email, &user.email, &req.link_id)
    .await?;
  Ok(Json(referral))
}

#[derive(Serialize)]
pub struct Referrals {
  stats: ReferralStats,
  referrals: Vec<platform_referral::Model>,
}

pub async fn referrals(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
) -> Result<Json<Referrals>> {
  let sv = app.sv();
  Ok(Json(Referrals {
    stats: sv.referral.stats(&user.email).await?,
    referrals: sv.referral.by_referrer(&user.email).await?,
  }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandReq {
  name: String,
  #[serde(default)]
  genre_id: Option<i32>,
}

pub async fn create_brand(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Json(req): Json<BrandReq>,
) -> Result<(StatusCode, Json<brand::Model>)> {
  let brand =
    app.sv().brand.create(&user.email, &req.name, req.genre_id).await?;
  Ok((StatusCode::CREATED, Json(brand)))
}

pub async fn brand(
  State(app): State<Arc<AppState>>,
  Viewer(viewer): Viewer,
  Path(id): Path<i32>,
) -> Result<Json<brand::Model>> {
  Ok(Json(app.sv().brand.view(id, viewer.as_deref()).await?))
}

pub async fn delete_brand(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(id): Path<i32>,
) -> Result<StatusCode> {
  app.sv().brand.delete(id, &user.email).await?;
  Ok(StatusCode::NO_CONTENT)
}

pub async fn moderate_brand(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(id): Path<i32>,
  Json(req): Json<Moderation>,
) -> Result<Json<brand::Model>> {
  Ok(Json(app.sv().brand.moderate(id, &user.email, req).await?))
}

#[derive(Deserialize)]
pub struct Page {
  limit: Option<u64>,
}

impl Page {
  fn limit(&self) -> u64 {
    self.limit.unwrap_or(50).clamp(1, 200)
  }
}

pub async fn brand_orders(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(id): Path<i32>,
  Query(page): Query<Page>,
) -> Result<Json<Vec<order::Model>>> {
  let orders =
    app.sv().ledger.recent_orders(id, &user.email, page.limit()).await?;
  Ok(Json(orders))
}

pub async fn brand_activity(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(id): Path<i32>,
  Query(page): Query<Page>,
) -> Result<Json<Vec<Event>>> {
  let sv = app.sv();
  sv.access.live_brand(id).await?;
  sv.access.require(id, &user.email, Role::Manager).await?;
  Ok(Json(sv.activity.by_brand(id, page.limit()).await?))
}

fn require_admin(user: &user::Model) -> Result<()> {
  if Role::from(user.role).is_admin() {
    Ok(())
  } else {
    Err(Error::forbidden("requires platform admin"))
  }
}

pub async fn verify_brand(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(id): Path<i32>,
) -> Result<Json<BrandCheck>> {
  require_admin(&user)?;
  Ok(Json(app.sv().ledger.verify_brand(id).await?))
}

pub async fn verify_affiliate(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(code): Path<String>,
) -> Result<Json<Drift>> {
  require_admin(&user)?;
  let sv = app.sv();
  let affiliate =
    sv.affiliate.by_code(&code).await?.ok_or(Error::NotFound("affiliate"))?;
  Ok(Json(sv.ledger.verify_affiliate(affiliate.id).await?))
}

#[derive(Deserialize)]
pub struct ReferrerQuery {
  email: String,
}

pub async fn verify_referrals(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Query(query): Query<ReferrerQuery>,
) -> Result<Json<Drift>> {
  require_admin(&user)?;
  let email = crate::sv::user::normalize_email(&query.email)?;
  Ok(Json(app.sv().ledger.verify_referrals(&email).await?))
}

pub async fn commission(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(id): Path<i32>,
) -> Result<Json<CommissionConfig>> {
  let sv = app.sv();
  sv.access.live_brand(id).await?;
  sv.access.require(id, &user.email, Role::Manager).await?;
  Ok(Json(sv.commission.config(id).await?))
}

pub async fn update_commission(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(id): Path<i32>,
  Json(req): Json<CommissionUpdate>,
) -> Result<Json<CommissionConfig>> {
  Ok(Json(app.sv().commission.update_config(id, &user.email, req).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenreRateReq {
  base_rate: i32,
}

pub async fn set_genre_commission(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(id): Path<i32>,
  Json(req): Json<GenreRateReq>,
) -> Result<Json<genre::Model>> {
  let genre =
    app.sv().commission.set_genre_rate(id, &user.email, req.base_rate).await?;
  Ok(Json(genre))
}

pub async fn list_access(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(id): Path<i32>,
) -> Result<Json<Vec<brand_access::Model>>> {
  Ok(Json(app.sv().access.list(id, &user.email).await?))
}

#[derive(Deserialize)]
pub struct GrantReq {
  email: String,
  role: String,
}

pub async fn grant_access(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(id): Path<i32>,
  Json(req): Json<GrantReq>,
) -> Result<(StatusCode, Json<brand_access::Model>)> {
  let role = match req.role.parse::<Role>()? {
    Role::Owner => AccessRole::Owner,
    Role::Manager => AccessRole::Manager,
    other => {
      return Err(Error::validation(format!("{other} is not a brand role")));
    }
  };

  let access = app.sv().access.grant(id, &user.email, &req.email, role).await?;
  Ok((StatusCode::CREATED, Json(access)))
}

pub async fn revoke_access(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path((id, email)): Path<(i32, String)>,
) -> Result<StatusCode> {
  app.sv().access.revoke(id, &user.email, &email).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReq {
  new_owner_email: String,
}

pub async fn transfer_ownership(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(id): Path<i32>,
  Json(req): Json<TransferReq>,
) -> Result<StatusCode> {
  app
    .sv()
    .access
    .transfer_ownership(id, &user.email, &req.new_owner_email)
    .await?;
  Ok(StatusCode::NO_CONTENT)
}

pub async fn enrol_affiliate(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(id): Path<i32>,
  Json(req): Json<Enrolment>,
) -> Result<(StatusCode, Json<affiliate::Model>)> {
  let affiliate = app.sv().affiliate.enrol(id, &user.email, req).await?;
  Ok((StatusCode::CREATED, Json(affiliate)))
}

/// Open to the affiliate themselves and to the brand's team.
pub async fn affiliate_stats(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(code): Path<String>,
) -> Result<Json<AffiliateStats>> {
  let sv = app.sv();
  let affiliate =
    sv.affiliate.by_code(&code).await?.ok_or(Error::NotFound("affiliate"))?;
  if affiliate.user_id != user.id {
    sv.access.require(affiliate.brand_id, &user.email, Role::Manager).await?;
  }
  Ok(Json(sv.affiliate.stats(affiliate.id).await?))
}

#[derive(Deserialize)]
pub struct StatusReq {
  status: AffiliateStatus,
}

pub async fn set_affiliate_status(
  State(app): State<Arc<AppState>>,
  Identity(user): Identity,
  Path(code): Path<String>,
  Json(req): Json<StatusReq>,
) -> Result<Json<affiliate::Model>> {
  let sv = app.sv();
  let affiliate =
    sv.affiliate.by_code(&code).await?.ok_or(Error::NotFound("affiliate"))?;
  let updated =
    sv.affiliate.set_status(affiliate.id, &user.email, req.status).await?;
  Ok(Json(updated))
}

pub async fn affiliate_click(
  State(app): State<Arc<AppState>>,
  Path(code): Path<String>,
) -> Result<StatusCode> {
  app.sv().affiliate.record_click(&code).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
  use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request},
  };
  use tower::ServiceExt;

  use super::*;
  use crate::{
    config::Config,
    plugins::server::router,
    sv::test_utils::{
      rail::{MockRail, Outcome},
      test_db,
    },
  };

  const SECRET: &str = "webhook-secret";

  fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
  }
  const SELLER: &str = "seller@shop.io";

  async fn app() -> (Router, Arc<AppState>) {
    let config =
      Config { webhook_secret: SECRET.into(), ..Config::default() };
    let state = Arc::new(AppState::from_parts(
      test_db::setup().await,
      config,
      Arc::new(MockRail::new(Outcome::Succeed)),
    ));
    (router(state.clone()), state)
  }

  fn request(
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<json::Value>,
  ) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
      builder = builder.header(IDENTITY_HEADER, user);
    }
    match body {
      Some(body) => builder
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    }
  }

  fn webhook(body: &json::Value, signature: &str) -> Request<Body> {
    Request::builder()
      .method(Method::POST)
      .uri("/api/orders")
      .header("content-type", "application/json")
      .header(SIGNATURE_HEADER, signature)
      .body(Body::from(body.to_string()))
      .unwrap()
  }

  async fn read(response: axum::response::Response) -> json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    json::from_slice(&bytes).unwrap()
  }

  #[tokio::test]
  async fn test_health() {
    let (router, _) = app().await;
    let response = router
      .oneshot(request(Method::GET, "/health", None, None))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn test_identity_required() {
    let (router, _) = app().await;
    let response = router
      .oneshot(request(Method::GET, "/api/earnings", None, None))
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read(response).await["error"], "authentication required");
  }

  #[tokio::test]
  async fn test_webhook_is_signed_and_idempotent() {
    let (router, state) = app().await;
    let brand = test_db::brand(&state.db, SELLER).await;

    let body = json::json!({
      "external_order_id": "shop-1001",
      "brand_id": brand.id,
      "total_amount": 10_000,
    });
    let signature = sign(SECRET, body.to_string().as_bytes());

    let forged =
      router.clone().oneshot(webhook(&body, "deadbeef")).await.unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    let first =
      router.clone().oneshot(webhook(&body, &signature)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(read(first).await["status"], "recorded");

    let second =
      router.clone().oneshot(webhook(&body, &signature)).await.unwrap();
    let second = read(second).await;
    assert_eq!(second["status"], "duplicate");
    assert_eq!(second["order"]["brand_earnings"], 5_000);

    let earnings = router
      .oneshot(request(Method::GET, "/api/earnings", Some(SELLER), None))
      .await
      .unwrap();
    let earnings = read(earnings).await;
    assert_eq!(earnings["summary"]["totalEarnings"], 5_000);
    assert_eq!(earnings["summary"]["availableForPayout"], 5_000);
  }

  #[tokio::test]
  async fn test_payout_flow() {
    let (router, state) = app().await;
    let brand = test_db::brand(&state.db, SELLER).await;
    state
      .sv()
      .ledger
      .ingest(OrderEvent {
        external_order_id: "o-1".into(),
        brand_id: brand.id,
        total_amount: 400,
        customer_email: None,
        referral_code: None,
      })
      .await
      .unwrap();

    let missing = router
      .clone()
      .oneshot(request(Method::POST, "/api/payouts", Some(SELLER), None))
      .await
      .unwrap();
    assert_eq!(missing.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let method = router
      .clone()
      .oneshot(request(
        Method::PUT,
        "/api/payment-methods",
        Some(SELLER),
        Some(json::json!({ "provider": "cryptobot", "destination": "42" })),
      ))
      .await
      .unwrap();
    assert_eq!(method.status(), StatusCode::OK);

    let paid = router
      .oneshot(request(Method::POST, "/api/payouts", Some(SELLER), None))
      .await
      .unwrap();
    assert_eq!(paid.status(), StatusCode::OK);
    assert_eq!(read(paid).await["amount"], 200);
  }

  #[tokio::test]
  async fn test_access_routes() {
    let (router, state) = app().await;
    let brand = test_db::brand(&state.db, "a@shop.io").await;
    let uri = format!("/api/brands/{}/access", brand.id);

    let granted = router
      .clone()
      .oneshot(request(
        Method::POST,
        &uri,
        Some("a@shop.io"),
        Some(json::json!({ "email": "m@shop.io", "role": "MANAGER" })),
      ))
      .await
      .unwrap();
    assert_eq!(granted.status(), StatusCode::CREATED);

    let last_owner = router
      .clone()
      .oneshot(request(
        Method::DELETE,
        &format!("{uri}/a@shop.io"),
        Some("a@shop.io"),
        None,
      ))
      .await
      .unwrap();
    assert_eq!(last_owner.status(), StatusCode::CONFLICT);

    let outsider = router
      .clone()
      .oneshot(request(Method::GET, &uri, Some("x@shop.io"), None))
      .await
      .unwrap();
    assert_eq!(outsider.status(), StatusCode::FORBIDDEN);

    let transferred = router
      .clone()
      .oneshot(request(
        Method::POST,
        &format!("/api/brands/{}/transfer", brand.id),
        Some("a@shop.io"),
        Some(json::json!({ "newOwnerEmail": "m@shop.io" })),
      ))
      .await
      .unwrap();
    assert_eq!(transferred.status(), StatusCode::NO_CONTENT);
    assert_eq!(test_db::owners(&state.db, brand.id).await, vec!["m@shop.io"]);
  }

  #[tokio::test]
  async fn test_hidden_brand_is_not_found_for_outsiders() {
    let (router, state) = app().await;
    let brand = test_db::brand(&state.db, "a@shop.io").await;
    brand::ActiveModel { is_hidden: Set(true), ..brand.clone().into() }
      .update(&state.db)
      .await
      .unwrap();
    let uri = format!("/api/brands/{}", brand.id);

    let anonymous = router
      .clone()
      .oneshot(request(Method::GET, &uri, None, None))
      .await
      .unwrap();
    assert_eq!(anonymous.status(), StatusCode::NOT_FOUND);

    let owner = router
      .oneshot(request(Method::GET, &uri, Some("a@shop.io"), None))
      .await
      .unwrap();
    assert_eq!(owner.status(), StatusCode::OK);
  }
}
