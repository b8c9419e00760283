use std::sync::Arc;

use skillswap_ledger::{ParticipantId, SourceError};

use crate::view::{MatchResult, MergedView, SkillPair};

/// `other` teaches what `me` wants to learn and learns what `me` teaches.
///
/// Symmetric by construction. Compares fingerprints only, never display text.
#[must_use]
pub fn is_complementary<A, B>(me: &A, other: &B) -> bool
where
    A: SkillPair + ?Sized,
    B: SkillPair + ?Sized,
{
    me.identity() != other.identity()
        && me.participant_id() != other.participant_id()
        && other.teach() == me.learn()
        && other.learn() == me.teach()
}

fn is_degenerate<P: SkillPair + ?Sized>(p: &P) -> bool {
    p.teach() == p.learn()
}

/// Complementary candidates of `me`, in candidate order.
///
/// Participants whose teach and learn fingerprints are equal are excluded
/// and reported.
pub fn find_matches<'a, S, C, I>(me: &S, candidates: I) -> Vec<&'a C>
where
    S: SkillPair + ?Sized,
    C: SkillPair + 'a,
    I: IntoIterator<Item = &'a C>,
{
    if is_degenerate(me) {
        tracing::warn!(
            id = %me.participant_id(),
            "participant teaches and learns the same skill, skipping matching"
        );
        return Vec::new();
    }

    candidates
        .into_iter()
        .filter(|c| {
            if is_degenerate(*c) {
                tracing::warn!(
                    id = %c.participant_id(),
                    "excluding candidate that teaches and learns the same skill"
                );
                return false;
            }
            is_complementary(me, *c)
        })
        .collect()
}

/// Match preview over cached views.
#[must_use]
pub fn match_views(me: &MergedView, views: &[Arc<MergedView>]) -> Vec<MatchResult> {
    find_matches(me, views)
        .into_iter()
        .map(|other| MatchResult {
            self_id: me.id,
            other_id: other.id,
            other: MergedView::clone(other),
        })
        .collect()
}

/// Resolve ledger-persisted match ids to views, keeping ledger order.
///
/// The persisted list is authoritative: the predicate is not re-checked.
/// Ids that no longer resolve are skipped.
///
/// # Errors
///
/// Returns the first source error from `resolve`.
pub async fn resolve_recorded<F, Fut>(
    self_id: ParticipantId,
    ids: &[ParticipantId],
    resolve: F,
) -> Result<Vec<MatchResult>, SourceError>
where
    F: Fn(ParticipantId) -> Fut,
    Fut: Future<Output = Result<Option<MergedView>, SourceError>>,
{
    let resolved = futures::future::try_join_all(ids.iter().map(|&id| resolve(id))).await?;

    Ok(ids
        .iter()
        .zip(resolved)
        .filter_map(|(&other_id, view)| {
            if view.is_none() {
                tracing::debug!(%self_id, %other_id, "recorded match no longer resolves");
            }
            view.map(|other| MatchResult {
                self_id,
                other_id,
                other,
            })
        })
        .collect())
}
