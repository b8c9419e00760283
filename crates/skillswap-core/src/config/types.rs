use serde::{Deserialize, Serialize};
use skillswap_ledger::FingerprintScheme;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub participant: ParticipantConfig,
    #[serde(default)]
    pub annotations: AnnotationsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParticipantConfig {
    /// Identity of the participant running this node, if any.
    #[serde(default)]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnnotationsConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_sqlite_path() -> String {
    "data/annotations.db".into()
}

impl Default for AnnotationsConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

impl AnnotationsConfig {
    /// Database path, or `None` when annotations stay in memory.
    #[must_use]
    pub fn persistence_path(&self) -> Option<&str> {
        let path = self.sqlite_path.trim();
        (!path.is_empty() && path != ":memory:").then_some(path)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeKind {
    #[default]
    Digest,
    Text,
}

impl From<SchemeKind> for FingerprintScheme {
    fn from(kind: SchemeKind) -> Self {
        match kind {
            SchemeKind::Digest => Self::Digest,
            SchemeKind::Text => Self::Text,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// JSON snapshot used to seed the in-process ledger.
    #[serde(default)]
    pub snapshot_path: Option<String>,
    #[serde(default)]
    pub fingerprint_scheme: SchemeKind,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,
    #[serde(default = "default_gateway_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_gateway_max_body")]
    pub max_body_size: usize,
}

fn default_gateway_bind() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    8090
}

fn default_gateway_rate_limit() -> u32 {
    120
}

fn default_gateway_max_body() -> usize {
    65_536
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            auth_token: None,
            rate_limit: default_gateway_rate_limit(),
            max_body_size: default_gateway_max_body(),
        }
    }
}
