//! Participant record model and the boundary to the external skill ledger.

pub mod error;
pub mod fingerprint;
pub mod memory;
pub mod snapshot;
pub mod source;
pub mod types;

pub use error::{DecodeError, SourceError};
pub use fingerprint::Fingerprint;
pub use memory::{FingerprintScheme, InMemoryLedger};
pub use source::{
    ProfileUpdate, RecordSource, RecordWriter, Registration, Subscription, SubscriptionEvent,
};
pub use types::{
    ChangeKind, ChangeNotification, ContactChannels, Identity, ParticipantId, ParticipantRecord,
};
