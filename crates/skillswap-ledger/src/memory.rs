//! Process-local ledger used for demos, seeding from snapshots, and tests.
//!
//! Mirrors the contract semantics of the hosted ledger: ids start at 1,
//! display names are immutable, empty update fields keep the stored value,
//! and every write emits a change notification.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::SourceError;
use crate::fingerprint::Fingerprint;
use crate::source::{ProfileUpdate, RecordSource, RecordWriter, Registration, Subscription};
use crate::types::{
    ChangeKind, ChangeNotification, Identity, ParticipantId, ParticipantRecord,
};

/// How skill text becomes a fingerprint on write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FingerprintScheme {
    /// One-way digest; decode never succeeds.
    #[default]
    Digest,
    /// Recoverable bytes32 text, as older ledger deployments stored it.
    Text,
}

impl FingerprintScheme {
    fn apply(self, text: &str) -> Result<Fingerprint, SourceError> {
        match self {
            Self::Digest => Ok(Fingerprint::digest(text)),
            Self::Text => {
                Fingerprint::encode_text(text).map_err(|e| SourceError::Rejected(e.to_string()))
            }
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    records: Vec<ParticipantRecord>,
    matches: Vec<(ParticipantId, Vec<ParticipantId>)>,
}

impl LedgerState {
    /// Append `other` to the match list of `owner` unless already present.
    fn link(&mut self, owner: ParticipantId, other: ParticipantId) {
        match self.matches.iter_mut().find(|(o, _)| *o == owner) {
            Some((_, ids)) if ids.contains(&other) => {}
            Some((_, ids)) => ids.push(other),
            None => self.matches.push((owner, vec![other])),
        }
    }
}

#[derive(Debug)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    events: broadcast::Sender<ChangeNotification>,
    scheme: FingerprintScheme,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    reads: AtomicU64,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(256)
    }
}

impl InMemoryLedger {
    #[must_use]
    pub fn new(channel_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            state: RwLock::new(LedgerState::default()),
            events,
            scheme: FingerprintScheme::default(),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            reads: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: FingerprintScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Insert records verbatim, e.g. from a snapshot. No notifications are emitted.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Rejected` on a duplicate id or identity.
    pub fn seed(&self, records: Vec<ParticipantRecord>) -> Result<(), SourceError> {
        let mut state = self.write_state();
        for record in records {
            if state
                .records
                .iter()
                .any(|r| r.id == record.id || r.identity == record.identity)
            {
                return Err(SourceError::Rejected(format!(
                    "duplicate participant {} ({})",
                    record.id, record.identity
                )));
            }
            state.records.push(record);
        }
        Ok(())
    }

    /// Simulate the ledger going offline; every call fails until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Add artificial latency to every read.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of read calls served, including failed ones.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Publish a notification as if the ledger emitted it.
    pub fn emit(&self, notification: ChangeNotification) {
        let _ = self.events.send(notification);
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, LedgerState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, LedgerState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn gate(&self) -> Result<(), SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("ledger offline".into()));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("ledger offline".into()));
        }
        Ok(())
    }
}

fn trimmed(v: Option<&String>) -> Option<&str> {
    v.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl RecordSource for InMemoryLedger {
    async fn read_all(&self) -> Result<Vec<ParticipantRecord>, SourceError> {
        self.gate().await?;
        Ok(self.read_state().records.clone())
    }

    async fn read_by_id(&self, id: ParticipantId) -> Result<Option<ParticipantRecord>, SourceError> {
        self.gate().await?;
        Ok(self.read_state().records.iter().find(|r| r.id == id).cloned())
    }

    async fn read_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<ParticipantRecord>, SourceError> {
        self.gate().await?;
        Ok(self
            .read_state()
            .records
            .iter()
            .find(|r| r.identity == *identity)
            .cloned())
    }

    async fn read_match_ids(&self, id: ParticipantId) -> Result<Vec<ParticipantId>, SourceError> {
        self.gate().await?;
        Ok(self
            .read_state()
            .matches
            .iter()
            .find(|(owner, _)| *owner == id)
            .map(|(_, ids)| ids.clone())
            .unwrap_or_default())
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.events.subscribe())
    }
}

impl RecordWriter for InMemoryLedger {
    async fn register(
        &self,
        identity: &Identity,
        registration: &Registration,
    ) -> Result<ParticipantId, SourceError> {
        self.check_writable()?;
        if identity.is_empty() {
            return Err(SourceError::Rejected("identity is required".into()));
        }
        let teach = self.scheme.apply(&registration.teach)?;
        let learn = self.scheme.apply(&registration.learn)?;
        if teach == learn {
            return Err(SourceError::Rejected(
                "skill to teach must differ from skill to learn".into(),
            ));
        }

        let id = {
            let mut state = self.write_state();
            if state.records.iter().any(|r| r.identity == *identity) {
                return Err(SourceError::Rejected(format!(
                    "{} is already registered",
                    identity.short()
                )));
            }
            let next = state.records.iter().map(|r| r.id.get()).max().unwrap_or(0) + 1;
            let id = ParticipantId::new(next)
                .ok_or_else(|| SourceError::Rejected("id space exhausted".into()))?;
            state.records.push(ParticipantRecord {
                id,
                identity: identity.clone(),
                display_name: registration.display_name.trim().to_owned(),
                teach_fingerprint: teach,
                learn_fingerprint: learn,
                bio: String::new(),
                contacts: registration.contacts.clone().normalized(),
            });
            id
        };

        tracing::debug!(%id, identity = %identity.short(), "participant registered");
        self.emit(ChangeNotification {
            kind: ChangeKind::Registered,
            identity: identity.clone(),
            affected_ids: vec![id],
        });
        Ok(id)
    }

    async fn update_profile(
        &self,
        id: ParticipantId,
        update: &ProfileUpdate,
    ) -> Result<(), SourceError> {
        self.check_writable()?;
        let teach = trimmed(update.teach.as_ref())
            .map(|t| self.scheme.apply(t))
            .transpose()?;
        let learn = trimmed(update.learn.as_ref())
            .map(|t| self.scheme.apply(t))
            .transpose()?;

        let identity = {
            let mut state = self.write_state();
            let record = state
                .records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| SourceError::Rejected(format!("participant {id} not found")))?;

            let next_teach = teach.unwrap_or(record.teach_fingerprint);
            let next_learn = learn.unwrap_or(record.learn_fingerprint);
            if next_teach == next_learn {
                return Err(SourceError::Rejected(
                    "skill to teach must differ from skill to learn".into(),
                ));
            }
            record.teach_fingerprint = next_teach;
            record.learn_fingerprint = next_learn;
            if let Some(bio) = trimmed(update.bio.as_ref()) {
                bio.clone_into(&mut record.bio);
            }
            record.contacts = record
                .contacts
                .overlay(&update.contacts.clone().normalized());
            record.identity.clone()
        };

        self.emit(ChangeNotification {
            kind: ChangeKind::Updated,
            identity,
            affected_ids: vec![id],
        });
        Ok(())
    }

    async fn compute_matches(&self, id: ParticipantId) -> Result<Vec<ParticipantId>, SourceError> {
        self.check_writable()?;
        let (identity, matched) = {
            let mut state = self.write_state();
            let me = state
                .records
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| SourceError::Rejected(format!("participant {id} not found")))?;
            let matched: Vec<ParticipantId> = state
                .records
                .iter()
                .filter(|c| {
                    c.id != me.id
                        && c.teach_fingerprint == me.learn_fingerprint
                        && c.learn_fingerprint == me.teach_fingerprint
                })
                .map(|c| c.id)
                .collect();
            match state.matches.iter().position(|(owner, _)| *owner == id) {
                Some(i) => state.matches[i].1.clone_from(&matched),
                None => state.matches.push((id, matched.clone())),
            }
            (me.identity, matched)
        };

        self.emit(ChangeNotification {
            kind: ChangeKind::Matched,
            identity,
            affected_ids: matched.clone(),
        });
        Ok(matched)
    }

    async fn match_users(&self, a: ParticipantId, b: ParticipantId) -> Result<(), SourceError> {
        self.check_writable()?;
        if a == b {
            return Err(SourceError::Rejected(format!(
                "participant {a} cannot be matched with itself"
            )));
        }

        let (identity_a, identity_b) = {
            let mut state = self.write_state();
            let identity_of = |id: ParticipantId| {
                state
                    .records
                    .iter()
                    .find(|r| r.id == id)
                    .map(|r| r.identity.clone())
                    .ok_or_else(|| SourceError::Rejected(format!("participant {id} not found")))
            };
            let identity_a = identity_of(a)?;
            let identity_b = identity_of(b)?;
            state.link(a, b);
            state.link(b, a);
            (identity_a, identity_b)
        };

        tracing::debug!(%a, %b, "participants matched");
        self.emit(ChangeNotification {
            kind: ChangeKind::Matched,
            identity: identity_a,
            affected_ids: vec![b],
        });
        self.emit(ChangeNotification {
            kind: ChangeKind::Matched,
            identity: identity_b,
            affected_ids: vec![a],
        });
        Ok(())
    }
}
