mod handlers;

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
  Router,
  routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

use crate::{prelude::*, state::AppState};

/// Every route, without the per-IP rate limit (which needs the peer address).
pub fn router(app: Arc<AppState>) -> Router {
  Router::new()
    .route("/health", get(handlers::health))
    .route("/api/orders", post(handlers::ingest_order))
    .route("/api/earnings", get(handlers::earnings))
    .route(
      "/api/payouts",
      get(handlers::payouts).post(handlers::request_payout),
    )
    .route("/api/payment-methods", put(handlers::set_payment_method))
    .route("/api/users/role", put(handlers::set_user_role))
    .route(
      "/api/referrals",
      get(handlers::referrals).post(handlers::register_referral),
    )
    .route("/api/brands", post(handlers::create_brand))
    .route(
      "/api/brands/{id}",
      get(handlers::brand).delete(handlers::delete_brand),
    )
    .route("/api/brands/{id}/moderation", put(handlers::moderate_brand))
    .route("/api/brands/{id}/orders", get(handlers::brand_orders))
    .route("/api/brands/{id}/activity", get(handlers::brand_activity))
    .route("/api/brands/{id}/ledger-check", get(handlers::verify_brand))
    .route(
      "/api/brands/{id}/commission",
      get(handlers::commission).put(handlers::update_commission),
    )
    .route(
      "/api/genres/{id}/commission",
      put(handlers::set_genre_commission),
    )
    .route(
      "/api/brands/{id}/access",
      get(handlers::list_access).post(handlers::grant_access),
    )
    .route(
      "/api/brands/{id}/access/{email}",
      delete(handlers::revoke_access),
    )
    .route("/api/brands/{id}/transfer", post(handlers::transfer_ownership))
    .route("/api/brands/{id}/affiliates", post(handlers::enrol_affiliate))
    .route("/api/affiliates/{code}/stats", get(handlers::affiliate_stats))
    .route("/api/affiliates/{code}/click", post(handlers::affiliate_click))
    .route(
      "/api/affiliates/{code}/status",
      put(handlers::set_affiliate_status),
    )
    .route(
      "/api/affiliates/{code}/ledger-check",
      get(handlers::verify_affiliate),
    )
    .route("/api/referrals/ledger-check", get(handlers::verify_referrals))
    .layer(
      ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
          .allow_origin(Any)
          .allow_methods(Any)
          .allow_headers(Any),
      ),
    )
    .with_state(app)
}

pub struct Plugin;

#[async_trait]
impl super::Plugin for Plugin {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let governor_conf = Arc::new(
      GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(100)
        .finish()
        .context("Failed to build rate limiter config")?,
    );

    let governor_limiter = governor_conf.limiter().clone();

    tokio::spawn(async move {
      loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
        governor_limiter.retain_recent();
      }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], app.config.port));
    let service = router(app)
      .layer(GovernorLayer::new(governor_conf))
      .into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(addr)
      .await
      .with_context(|| format!("Failed to bind {addr}"))?;

    info!("HTTP Server listening on {addr}");
    axum::serve(listener, service).await.context("HTTP server failed")?;

    Ok(())
  }
}
