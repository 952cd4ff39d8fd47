//! IP blacklist gate, first filter in every chain.

use async_trait::async_trait;
use axum::http::StatusCode;

use crate::filter::{Exchange, FilterAction, GatewayFilter};
use crate::http::error::{bare_status, GatewayError};
use crate::observability::metrics;
use crate::security::SecurityGate;

pub struct BlacklistFilter {
    gate: SecurityGate,
}

impl BlacklistFilter {
    pub fn new(gate: SecurityGate) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl GatewayFilter for BlacklistFilter {
    fn name(&self) -> &'static str {
        "IpBlacklist"
    }

    fn order(&self) -> i32 {
        i32::MIN
    }

    /// Blocked clients get a bare 403. A store failure fails closed.
    async fn on_request(&self, exchange: &mut Exchange) -> Result<FilterAction, GatewayError> {
        let ip = exchange.context.client_ip.to_string();

        if self.gate.is_blocked(&ip).await? {
            tracing::warn!(
                request_id = %exchange.context.request_id,
                client_ip = %ip,
                "Blocked request from blacklisted IP"
            );
            metrics::record_blocked();
            return Ok(FilterAction::Respond(bare_status(StatusCode::FORBIDDEN)));
        }

        Ok(FilterAction::Continue)
    }
}
