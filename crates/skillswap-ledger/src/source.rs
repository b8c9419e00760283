use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{DecodeError, SourceError};
use crate::fingerprint::Fingerprint;
use crate::types::{ChangeNotification, ContactChannels, Identity, ParticipantId, ParticipantRecord};

/// Read side of the external participant ledger.
///
/// Every method may suspend on network or ledger latency. "Not found" is a
/// normal outcome and is reported as `Ok(None)`, never as an error.
pub trait RecordSource: Send + Sync {
    /// All participants in ledger order.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Unavailable` if the ledger cannot be reached.
    fn read_all(
        &self,
    ) -> impl Future<Output = Result<Vec<ParticipantRecord>, SourceError>> + Send;

    /// # Errors
    ///
    /// Returns `SourceError::Unavailable` if the ledger cannot be reached.
    fn read_by_id(
        &self,
        id: ParticipantId,
    ) -> impl Future<Output = Result<Option<ParticipantRecord>, SourceError>> + Send;

    /// Sources without an identity index fall back to scanning `read_all`.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Unavailable` if the ledger cannot be reached.
    fn read_by_identity(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Option<ParticipantRecord>, SourceError>> + Send {
        async move {
            let all = self.read_all().await?;
            Ok(all.into_iter().find(|r| r.identity == *identity))
        }
    }

    /// Match ids persisted by a previous `compute_matches`, in ledger order.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Unavailable` if the ledger cannot be reached.
    fn read_match_ids(
        &self,
        id: ParticipantId,
    ) -> impl Future<Output = Result<Vec<ParticipantId>, SourceError>> + Send;

    fn subscribe(&self) -> Subscription;

    /// Try to recover skill text from a fingerprint.
    ///
    /// The default understands the ledger's bytes32 string encoding.
    ///
    /// # Errors
    ///
    /// Returns a `DecodeError` when the fingerprint is not recoverable, which
    /// is the common case for digests.
    fn decode(
        &self,
        fingerprint: &Fingerprint,
    ) -> impl Future<Output = Result<String, DecodeError>> + Send {
        std::future::ready(fingerprint.decode_text())
    }
}

/// Write side of the ledger, used only for the local participant.
pub trait RecordWriter: Send + Sync {
    /// # Errors
    ///
    /// Returns `SourceError::Rejected` if the ledger refuses the registration.
    fn register(
        &self,
        identity: &Identity,
        registration: &Registration,
    ) -> impl Future<Output = Result<ParticipantId, SourceError>> + Send;

    /// Empty fields in `update` leave the stored value unchanged.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Rejected` if the ledger refuses the update.
    fn update_profile(
        &self,
        id: ParticipantId,
        update: &ProfileUpdate,
    ) -> impl Future<Output = Result<(), SourceError>> + Send;

    /// Compute and persist complementary matches for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the participant does not exist or the ledger is
    /// unavailable.
    fn compute_matches(
        &self,
        id: ParticipantId,
    ) -> impl Future<Output = Result<Vec<ParticipantId>, SourceError>> + Send;

    /// Record `a` and `b` as matched with each other, whatever their skills.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Rejected` if the ids are equal or either is
    /// unknown, and `SourceError::Unavailable` if the ledger is offline.
    fn match_users(
        &self,
        a: ParticipantId,
        b: ParticipantId,
    ) -> impl Future<Output = Result<(), SourceError>> + Send;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub display_name: String,
    pub teach: String,
    pub learn: String,
    #[serde(default)]
    pub contacts: ContactChannels,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub teach: Option<String>,
    #[serde(default)]
    pub learn: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub contacts: ContactChannels,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    Change(ChangeNotification),
    /// The subscriber fell behind and this many notifications were skipped.
    Missed(u64),
}

/// Live stream of change notifications. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<ChangeNotification>,
}

impl Subscription {
    #[must_use]
    pub fn new(rx: broadcast::Receiver<ChangeNotification>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the source has shut down.
    pub async fn recv(&mut self) -> Option<SubscriptionEvent> {
        match self.rx.recv().await {
            Ok(n) => Some(SubscriptionEvent::Change(n)),
            Err(broadcast::error::RecvError::Lagged(n)) => Some(SubscriptionEvent::Missed(n)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    pub fn unsubscribe(self) {}
}
