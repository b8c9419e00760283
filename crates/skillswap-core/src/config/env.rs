use super::{Config, SchemeKind};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SKILLSWAP_IDENTITY") {
            self.participant.identity = Some(v);
        }
        if let Ok(v) = std::env::var("SKILLSWAP_SQLITE_PATH") {
            self.annotations.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("SKILLSWAP_CHANNEL_CAPACITY")
            && let Ok(capacity) = v.parse::<usize>()
        {
            self.sync.channel_capacity = capacity;
        }
        if let Ok(v) = std::env::var("SKILLSWAP_SNAPSHOT_PATH") {
            self.ledger.snapshot_path = Some(v);
        }
        if let Ok(v) = std::env::var("SKILLSWAP_FINGERPRINT_SCHEME") {
            match v.trim().to_ascii_lowercase().as_str() {
                "digest" => self.ledger.fingerprint_scheme = SchemeKind::Digest,
                "text" => self.ledger.fingerprint_scheme = SchemeKind::Text,
                _ => tracing::warn!("ignoring invalid SKILLSWAP_FINGERPRINT_SCHEME value: {v}"),
            }
        }
        self.apply_env_overrides_gateway();
    }

    fn apply_env_overrides_gateway(&mut self) {
        if let Ok(v) = std::env::var("SKILLSWAP_GATEWAY_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.gateway.enabled = enabled;
        }
        if let Ok(v) = std::env::var("SKILLSWAP_GATEWAY_BIND") {
            self.gateway.bind = v;
        }
        if let Ok(v) = std::env::var("SKILLSWAP_GATEWAY_PORT")
            && let Ok(port) = v.parse::<u16>()
        {
            self.gateway.port = port;
        }
        if let Ok(v) = std::env::var("SKILLSWAP_GATEWAY_RATE_LIMIT")
            && let Ok(limit) = v.parse::<u32>()
        {
            self.gateway.rate_limit = limit;
        }
        if let Ok(v) = std::env::var("SKILLSWAP_GATEWAY_MAX_BODY_SIZE")
            && let Ok(size) = v.parse::<usize>()
        {
            self.gateway.max_body_size = size;
        }
        if let Ok(v) = std::env::var("SKILLSWAP_GATEWAY_TOKEN")
            && !v.trim().is_empty()
        {
            self.gateway.auth_token = Some(v);
        }
    }
}
