//! Per-client-IP request limiting for the API surface.

use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::warn;

use crate::{error::AppError, state::AppState};

const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone)]
pub struct RateLimitState {
    limiter: Option<Arc<DefaultKeyedRateLimiter<String>>>,
}

impl RateLimitState {
    /// Allows `requests` per `window_secs` for each client, all of which may
    /// arrive as one burst. Zero for either value disables limiting.
    pub fn new(requests: u32, window_secs: u64) -> Self {
        let Some(burst) = NonZeroU32::new(requests) else {
            return Self::disabled();
        };
        let period = Duration::from_secs(window_secs) / requests;
        let Some(quota) = Quota::with_period(period) else {
            return Self::disabled();
        };

        Self {
            limiter: Some(Arc::new(RateLimiter::keyed(quota.allow_burst(burst)))),
        }
    }

    pub fn disabled() -> Self {
        Self { limiter: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    pub fn check(&self, client: &str) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check_key(&client.to_string()).is_ok(),
            None => true,
        }
    }
}

fn client_key(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub async fn limit_requests(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.rate_limit.is_enabled() {
        return next.run(req).await;
    }

    let client = client_key(&req);
    if state.rate_limit.check(&client) {
        next.run(req).await
    } else {
        warn!(client = %client, path = %req.uri().path(), "rate limit exceeded");
        AppError::too_many_requests().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_when_requests_is_zero() {
        let state = RateLimitState::new(0, 900);
        assert!(!state.is_enabled());
        for _ in 0..1000 {
            assert!(state.check("127.0.0.1"));
        }
    }

    #[test]
    fn rejects_after_burst_per_client() {
        let state = RateLimitState::new(3, 900);
        assert!(state.is_enabled());
        for _ in 0..3 {
            assert!(state.check("10.0.0.1"));
        }
        assert!(!state.check("10.0.0.1"));
        assert!(state.check("10.0.0.2"));
    }
}
