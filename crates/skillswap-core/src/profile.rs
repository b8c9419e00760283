//! Input checks for the local participant's register and update calls.

use std::sync::LazyLock;

use regex::Regex;
use skillswap_ledger::{ContactChannels, ParticipantRecord, ProfileUpdate, Registration};

use crate::error::EngineError;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"));

fn invalid(msg: &str) -> EngineError {
    EngineError::Validation(msg.to_owned())
}

fn same_skill(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn check_email(contacts: &ContactChannels) -> Result<(), EngineError> {
    match contacts.email.as_deref() {
        Some(email) if !EMAIL_RE.is_match(email) => Err(invalid("email address is malformed")),
        _ => Ok(()),
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Validate a registration and return it with every text field trimmed.
///
/// # Errors
///
/// Returns `EngineError::Validation` naming the first rule that failed.
pub fn validate_registration(registration: &Registration) -> Result<Registration, EngineError> {
    let display_name = registration.display_name.trim();
    let teach = registration.teach.trim();
    let learn = registration.learn.trim();

    if display_name.is_empty() {
        return Err(invalid("name is required"));
    }
    if teach.is_empty() || learn.is_empty() {
        return Err(invalid("both a skill to teach and a skill to learn are required"));
    }
    if same_skill(teach, learn) {
        return Err(invalid("teach and learn skills must differ"));
    }

    let contacts = registration.contacts.clone().normalized();
    if contacts.is_empty() {
        return Err(invalid("at least one contact channel is required"));
    }
    check_email(&contacts)?;

    Ok(Registration {
        display_name: display_name.to_owned(),
        teach: teach.to_owned(),
        learn: learn.to_owned(),
        contacts,
    })
}

/// Validate an update against the participant's current record.
///
/// Empty fields mean "keep the current value" and are dropped from the
/// returned update.
///
/// # Errors
///
/// Returns `EngineError::Validation` naming the first rule that failed.
pub fn validate_update(
    update: &ProfileUpdate,
    current: &ParticipantRecord,
) -> Result<ProfileUpdate, EngineError> {
    let teach = clean(update.teach.as_deref());
    let learn = clean(update.learn.as_deref());
    let bio = clean(update.bio.as_deref());

    if let (Some(t), Some(l)) = (&teach, &learn)
        && same_skill(t, l)
    {
        return Err(invalid("teach and learn skills must differ"));
    }

    let contacts = update.contacts.clone().normalized();
    check_email(&contacts)?;
    if current.contacts.overlay(&contacts).is_empty() {
        return Err(invalid("at least one contact channel is required"));
    }

    Ok(ProfileUpdate {
        teach,
        learn,
        bio,
        contacts,
    })
}
