use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use skillswap_core::Engine;
use skillswap_core::config::GatewayConfig;
use skillswap_ledger::{RecordSource, RecordWriter};
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::guard::WriteGuard;
use crate::router::build_router;

pub(crate) struct AppState<S> {
    pub engine: Arc<Engine<S>>,
    pub started_at: Instant,
}

impl<S> AppState<S> {
    pub(crate) fn new(engine: Arc<Engine<S>>) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            started_at: self.started_at,
        }
    }
}

/// HTTP front end for one engine, stopped by the shared shutdown flag.
pub struct GatewayServer<S> {
    addr: SocketAddr,
    guard: Arc<WriteGuard>,
    max_body_size: usize,
    engine: Arc<Engine<S>>,
    shutdown: watch::Receiver<bool>,
}

impl<S> GatewayServer<S>
where
    S: RecordSource + RecordWriter + 'static,
{
    /// An unparsable `bind` falls back to loopback.
    #[must_use]
    pub fn from_config(
        config: &GatewayConfig,
        engine: Arc<Engine<S>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let ip = config.bind.trim().parse::<IpAddr>().unwrap_or_else(|e| {
            tracing::warn!(bind = %config.bind, "invalid gateway bind address ({e}), using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        });
        if ip.is_unspecified() {
            tracing::warn!(%ip, "gateway exposed on every interface");
        }

        let guard = WriteGuard::new(config.auth_token.as_deref(), config.rate_limit);
        if !guard.requires_token() {
            tracing::warn!("no gateway auth token configured, profile writes are open");
        }

        Self {
            addr: SocketAddr::new(ip, config.port),
            guard: Arc::new(guard),
            max_body_size: config.max_body_size,
            engine,
            shutdown,
        }
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until the shutdown flag is set or its sender goes away.
    ///
    /// # Errors
    ///
    /// `GatewayError::Bind` if the listener cannot be opened, or
    /// `GatewayError::Server` if accepting connections fails.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr, e))?;
        tracing::info!(addr = %self.addr, "gateway listening");

        let app = build_router(AppState::new(self.engine), self.guard, self.max_body_size);
        let mut shutdown = self.shutdown;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
            tracing::info!("gateway draining connections");
        })
        .await
        .map_err(GatewayError::Server)
    }
}

#[cfg(test)]
mod tests {
    use skillswap_annotations::AnnotationStore;
    use skillswap_ledger::InMemoryLedger;

    use super::*;

    fn engine() -> Arc<Engine<InMemoryLedger>> {
        Arc::new(Engine::new(
            Arc::new(InMemoryLedger::default()),
            Arc::new(AnnotationStore::memory_only()),
        ))
    }

    fn config(bind: &str, port: u16) -> GatewayConfig {
        GatewayConfig {
            bind: bind.into(),
            port,
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn config_sets_address_and_guard() {
        let (_tx, rx) = watch::channel(false);
        let mut cfg = config("0.0.0.0", 8090);
        cfg.auth_token = Some("token".into());
        cfg.max_body_size = 512;
        let server = GatewayServer::from_config(&cfg, engine(), rx);

        assert_eq!(server.addr(), SocketAddr::from(([0, 0, 0, 0], 8090)));
        assert_eq!(server.max_body_size, 512);
        assert!(server.guard.requires_token());
    }

    #[test]
    fn unparsable_bind_uses_loopback() {
        let (_tx, rx) = watch::channel(false);
        let server = GatewayServer::from_config(&config("not_an_ip", 9999), engine(), rx);
        assert_eq!(server.addr(), SocketAddr::from(([127, 0, 0, 1], 9999)));
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let server = GatewayServer::from_config(&config("127.0.0.1", 0), engine(), rx);
        let handle = tokio::spawn(server.serve());
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn serve_stops_when_shutdown_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        let server = GatewayServer::from_config(&config("127.0.0.1", 0), engine(), rx);
        let handle = tokio::spawn(server.serve());
        drop(tx);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let (_tx, rx) = watch::channel(false);
        let server = GatewayServer::from_config(&config("127.0.0.1", port), engine(), rx);
        let err = server.serve().await.unwrap_err();
        assert!(matches!(err, GatewayError::Bind(addr, _) if addr.port() == port));
    }
}
