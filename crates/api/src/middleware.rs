use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::app::errors::json_error;

/// Sliding-window request limiter keyed by client.
///
/// A limit of zero disables limiting.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<Windows>,
}

#[derive(Default)]
struct Windows {
    by_client: HashMap<String, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(Windows::default()),
        }
    }

    /// Record a hit for `key` at `now`; `false` when the client is over its limit.
    pub fn check(&self, key: &str, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }

        // A poisoned limiter fails open; it guards nothing but request counts.
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.sweep(&mut state, now);

        let window = state.by_client.entry(key.to_string()).or_default();
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.limit as usize {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Once per window, drop clients whose newest hit has aged out.
    fn sweep(&self, state: &mut Windows, now: Instant) {
        if let Some(last) = state.last_sweep {
            if now.duration_since(last) < self.window {
                return;
            }
        }
        state.last_sweep = Some(now);
        let window = self.window;
        state.by_client.retain(|_, hits| {
            hits.back()
                .is_some_and(|newest| now.duration_since(*newest) < window)
        });
    }

    /// Number of clients with hits still inside the window (or not yet swept).
    pub fn tracked_clients(&self) -> usize {
        match self.state.lock() {
            Ok(guard) => guard.by_client.len(),
            Err(poisoned) => poisoned.into_inner().by_client.len(),
        }
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let client = client_key(req.headers());
    if !limiter.check(&client, Instant::now()) {
        tracing::warn!(client = %client, "rate limit exceeded");
        return json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "too many requests, slow down",
        );
    }

    next.run(req).await
}

pub async fn trace_requests(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("local")
        .to_string()
}
