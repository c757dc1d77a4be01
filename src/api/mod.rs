// HTTP surface - JSON endpoints over the loan service.

mod handlers;
mod request_tracing;
mod response;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::application::LoanService;

pub use response::{app_error_status, ApiError};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LoanService>,
}

impl AppState {
    pub fn new(service: LoanService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/auth/signup", post(handlers::signup))
        .route("/api/auth/login", post(handlers::login))
        .route(
            "/api/auth/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .route("/api/loans/rates", get(handlers::rates))
        .route("/api/loans/quote", post(handlers::quote))
        .route("/api/loans/apply", post(handlers::apply))
        .route("/api/loans/my-loans", get(handlers::my_loans))
        .route("/api/loans/:id", get(handlers::get_loan))
        .route("/api/admin/loans", get(handlers::admin_loans))
        .route(
            "/api/admin/loans/:loan_id/status",
            put(handlers::update_status),
        )
        .route("/api/admin/stats", get(handlers::stats))
        .route("/api/admin/users", get(handlers::users))
        .route("/api/admin/audit", get(handlers::audit))
        .layer(middleware::from_fn(
            request_tracing::request_tracing_middleware,
        ))
        .with_state(state)
}

/// Serve on an already bound listener until ctrl-c.
pub async fn serve(listener: TcpListener, service: LoanService) -> Result<()> {
    let addr = listener.local_addr().context("Failed to read listener address")?;
    info!(%addr, "microloan api listening");

    let app = build_router(AppState::new(service));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("microloan api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
