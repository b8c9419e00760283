//! Admission checks for the write routes: bearer token first, then a fixed
//! per-client request window.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

const WINDOW: Duration = Duration::from_secs(60);
const MAX_TRACKED_CLIENTS: usize = 10_000;

pub(crate) struct WriteGuard {
    token_digest: Option<blake3::Hash>,
    limiter: Option<RateLimiter>,
}

impl WriteGuard {
    /// `per_minute == 0` disables rate limiting; `token == None` disables auth.
    pub(crate) fn new(token: Option<&str>, per_minute: u32) -> Self {
        Self {
            token_digest: token.map(|t| blake3::hash(t.as_bytes())),
            limiter: (per_minute > 0).then(|| RateLimiter::new(per_minute)),
        }
    }

    pub(crate) fn requires_token(&self) -> bool {
        self.token_digest.is_some()
    }

    /// Check an `Authorization` header value against the configured token.
    ///
    /// Digests are compared rather than raw strings so neither the length
    /// nor a matching prefix can be timed.
    pub(crate) fn authorize(&self, header: Option<&str>) -> bool {
        let Some(expected) = &self.token_digest else {
            return true;
        };
        let presented = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .unwrap_or_default();
        let presented = blake3::hash(presented.as_bytes());
        presented.as_bytes().ct_eq(expected.as_bytes()).into()
    }

    pub(crate) fn admit(&self, client: IpAddr, now: Instant) -> bool {
        self.limiter
            .as_ref()
            .is_none_or(|limiter| limiter.admit(client, now))
    }
}

struct RateLimiter {
    per_window: u32,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

#[derive(Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

impl Window {
    fn expired(self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= WINDOW
    }
}

impl RateLimiter {
    fn new(per_window: u32) -> Self {
        Self {
            per_window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn admit(&self, client: IpAddr, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        if windows.len() >= MAX_TRACKED_CLIENTS && !windows.contains_key(&client) {
            windows.retain(|_, w| !w.expired(now));
        }

        let fresh = Window {
            started: now,
            hits: 0,
        };
        let window = windows.entry(client).or_insert(fresh);
        if window.expired(now) {
            *window = fresh;
        }
        window.hits = window.hits.saturating_add(1);
        window.hits <= self.per_window
    }
}

pub(crate) async fn guard_writes(
    State(guard): State<Arc<WriteGuard>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if !guard.authorize(bearer) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    // Requests routed without a socket (tests, in-process calls) share one bucket.
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(addr)| {
            addr.ip()
        });
    if !guard.admit(client, Instant::now()) {
        tracing::debug!(%client, "write rejected by rate limit");
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }

    next.run(req).await
}
