use serde::Serialize;
use skillswap_ledger::{ContactChannels, Fingerprint, Identity, ParticipantId, ParticipantRecord};

/// Where a display string came from, in decreasing order of trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplaySource {
    Annotation,
    Decoded,
    Raw,
}

/// Display-ready participant. Rebuilt by the reconciler, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedView {
    pub id: ParticipantId,
    pub identity: Identity,
    pub display_name: String,
    pub bio: String,
    pub contacts: ContactChannels,
    pub teach_fingerprint: Fingerprint,
    pub learn_fingerprint: Fingerprint,
    pub teach_display: String,
    pub learn_display: String,
    pub teach_source: DisplaySource,
    pub learn_source: DisplaySource,
}

impl MergedView {
    /// The authoritative part of the view, for re-merging without a ledger read.
    #[must_use]
    pub fn to_record(&self) -> ParticipantRecord {
        ParticipantRecord {
            id: self.id,
            identity: self.identity.clone(),
            display_name: self.display_name.clone(),
            teach_fingerprint: self.teach_fingerprint,
            learn_fingerprint: self.learn_fingerprint,
            bio: self.bio.clone(),
            contacts: self.contacts.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub self_id: ParticipantId,
    pub other_id: ParticipantId,
    pub other: MergedView,
}

/// Anything carrying the authoritative identity and skill fingerprints.
pub trait SkillPair {
    fn participant_id(&self) -> ParticipantId;
    fn identity(&self) -> &Identity;
    fn teach(&self) -> &Fingerprint;
    fn learn(&self) -> &Fingerprint;
}

impl SkillPair for ParticipantRecord {
    fn participant_id(&self) -> ParticipantId {
        self.id
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn teach(&self) -> &Fingerprint {
        &self.teach_fingerprint
    }

    fn learn(&self) -> &Fingerprint {
        &self.learn_fingerprint
    }
}

impl SkillPair for MergedView {
    fn participant_id(&self) -> ParticipantId {
        self.id
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn teach(&self) -> &Fingerprint {
        &self.teach_fingerprint
    }

    fn learn(&self) -> &Fingerprint {
        &self.learn_fingerprint
    }
}

impl<T: SkillPair + ?Sized> SkillPair for std::sync::Arc<T> {
    fn participant_id(&self) -> ParticipantId {
        (**self).participant_id()
    }

    fn identity(&self) -> &Identity {
        (**self).identity()
    }

    fn teach(&self) -> &Fingerprint {
        (**self).teach()
    }

    fn learn(&self) -> &Fingerprint {
        (**self).learn()
    }
}
