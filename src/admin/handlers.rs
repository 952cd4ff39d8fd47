use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::routing::definition::ENCRYPTION_KEY_METADATA;
use crate::routing::RouteDefinition;

const REDACTED: &str = "***";

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub routes: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidationResult {
    pub channel: String,
    pub published: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        routes: state.table.len(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Route keys are never echoed back.
pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<RouteDefinition>> {
    let mut definitions = state.table.definitions();
    for def in &mut definitions {
        if let Some(key) = def.metadata.get_mut(ENCRYPTION_KEY_METADATA) {
            *key = REDACTED.to_string();
        }
    }
    Json(definitions)
}

pub async fn invalidate_routes(
    State(state): State<AdminState>,
) -> (StatusCode, Json<InvalidationResult>) {
    match state.pubsub.publish(&state.channel, b"invalidate".to_vec()).await {
        Ok(()) => {
            tracing::info!(channel = %state.channel, "Route invalidation published");
            (
                StatusCode::ACCEPTED,
                Json(InvalidationResult {
                    channel: state.channel.clone(),
                    published: true,
                }),
            )
        }
        Err(e) => {
            tracing::error!(channel = %state.channel, error = %e, "Failed to publish route invalidation");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(InvalidationResult {
                    channel: state.channel.clone(),
                    published: false,
                }),
            )
        }
    }
}
