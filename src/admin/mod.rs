//! Admin API.
//!
//! # Data Flow
//! ```text
//! gateway-cli / operator
//!     → auth.rs (Authorization: Bearer <api_key>)
//!     → handlers.rs
//!         GET  /admin/status             version, route count, uptime
//!         GET  /admin/routes             current route snapshot
//!         POST /admin/routes/invalidate  publish on the invalidation channel
//! ```
//!
//! # Design Decisions
//! - Separate listener; never exposed on the gateway port
//! - Invalidation goes through pub/sub so every gateway instance reloads

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

use crate::cache::PubSub;
use crate::lifecycle::Shutdown;
use crate::routing::RouteTable;

use self::auth::admin_auth_middleware;
use self::handlers::{get_routes, get_status, invalidate_routes};

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub table: Arc<RouteTable>,
    pub pubsub: Arc<dyn PubSub>,
    pub channel: String,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/routes/invalidate", post(invalidate_routes))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

pub async fn run_admin(state: AdminState, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin listener starting");

    let app = setup_admin_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.graceful())
        .await?;

    tracing::info!("Admin listener stopped");
    Ok(())
}
