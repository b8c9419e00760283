use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Ledger-assigned participant id. Zero is reserved for "not registered".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ParticipantId(u64);

impl ParticipantId {
    #[must_use]
    pub fn new(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for ParticipantId {
    type Error = String;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| "participant id must be positive".to_owned())
    }
}

impl From<ParticipantId> for u64 {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized participant handle (trimmed, ASCII lower-case).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `0x1234...abcd` form for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        let s = self.0.as_str();
        if s.len() <= 10 || !s.is_ascii() {
            return s.to_owned();
        }
        format!("{}...{}", &s[..6], &s[s.len() - 4..])
    }
}

impl From<String> for Identity {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for Identity {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactChannels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farcaster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl ContactChannels {
    /// Trim every channel and drop the empty ones.
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
        }
        Self {
            twitter: clean(self.twitter),
            farcaster: clean(self.farcaster),
            email: clean(self.email),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.twitter.is_none() && self.farcaster.is_none() && self.email.is_none()
    }

    /// Channel-wise overlay: fields set in `update` win.
    #[must_use]
    pub fn overlay(&self, update: &Self) -> Self {
        Self {
            twitter: update.twitter.clone().or_else(|| self.twitter.clone()),
            farcaster: update.farcaster.clone().or_else(|| self.farcaster.clone()),
            email: update.email.clone().or_else(|| self.email.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: ParticipantId,
    pub identity: Identity,
    pub display_name: String,
    pub teach_fingerprint: Fingerprint,
    pub learn_fingerprint: Fingerprint,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub contacts: ContactChannels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Registered,
    Updated,
    Matched,
}

impl ChangeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Updated => "updated",
            Self::Matched => "matched",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub kind: ChangeKind,
    pub identity: Identity,
    #[serde(default)]
    pub affected_ids: Vec<ParticipantId>,
}
