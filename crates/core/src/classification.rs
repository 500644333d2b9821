//! The shared status-classification algorithm (§4.5, §4.6).
//!
//! One total ordering of precedence is used by both the Collection
//! Reconciler and the Actor Subscription Reconciler; the only
//! differences are (a) native collections substitute "keep previous
//! status" for the release-date rule when the date is missing, and
//! (b) the actor reconciler inserts a session-scoped dedup check
//! between ranks 2 and 3, and turns rank 4 into a subscribe attempt
//! rather than an immediate `MISSING` verdict.

use chrono::NaiveDate;

use crate::models::MediaStatus;

/// Outcome of classifying a plain collection candidate (§4.5 step 4).
/// Rank 4 resolves directly to `Missing` — collection reconciliation
/// never itself calls the downloader.
pub fn classify_collection_item(
    in_library: bool,
    previously_subscribed: bool,
    release_date: Option<NaiveDate>,
    today: NaiveDate,
) -> MediaStatus {
    if in_library {
        return MediaStatus::InLibrary;
    }
    if previously_subscribed {
        return MediaStatus::Subscribed;
    }
    match release_date {
        Some(date) if date > today => MediaStatus::PendingRelease,
        _ => MediaStatus::Missing,
    }
}

/// Native-collection variant: when `release_date` is absent, rank 3
/// becomes "keep previous status" instead of falling through to
/// `Missing`, to avoid churn on TMDb records without dates.
pub fn classify_native_item(
    in_library: bool,
    previously_subscribed: bool,
    release_date: Option<NaiveDate>,
    previous_status: MediaStatus,
    today: NaiveDate,
) -> MediaStatus {
    if in_library {
        return MediaStatus::InLibrary;
    }
    if previously_subscribed {
        return MediaStatus::Subscribed;
    }
    match release_date {
        Some(date) if date > today => MediaStatus::PendingRelease,
        Some(_) => MediaStatus::Missing,
        None => previous_status,
    }
}

/// Rank-4 outcome for the actor reconciler: unlike the plain collection
/// path, a work that reaches rank 4 triggers a subscribe attempt rather
/// than resolving straight to `Missing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorWorkClassification {
    InLibrary,
    Subscribed,
    PendingRelease,
    NeedsSubscribeAttempt,
}

impl ActorWorkClassification {
    pub fn to_media_status_if_no_attempt_made(self) -> MediaStatus {
        match self {
            Self::InLibrary => MediaStatus::InLibrary,
            Self::Subscribed => MediaStatus::Subscribed,
            Self::PendingRelease => MediaStatus::PendingRelease,
            Self::NeedsSubscribeAttempt => MediaStatus::Missing,
        }
    }
}

/// Classifies one work in an actor's filtered filmography, honoring the
/// extra session-scoped dedup rank between "previously subscribed" and
/// "pending release" (§4.6 step 3).
pub fn classify_actor_work(
    tmdb_id: &str,
    in_library: bool,
    previously_subscribed: bool,
    session_subscribed_ids: &std::collections::HashSet<String>,
    release_date: Option<NaiveDate>,
    today: NaiveDate,
) -> ActorWorkClassification {
    if in_library {
        return ActorWorkClassification::InLibrary;
    }
    if previously_subscribed {
        return ActorWorkClassification::Subscribed;
    }
    if session_subscribed_ids.contains(tmdb_id) {
        return ActorWorkClassification::Subscribed;
    }
    match release_date {
        Some(date) if date > today => ActorWorkClassification::PendingRelease,
        _ => ActorWorkClassification::NeedsSubscribeAttempt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    }

    #[test]
    fn in_library_wins_over_everything() {
        let status = classify_collection_item(true, true, Some(today() + Duration::days(5)), today());
        assert_eq!(status, MediaStatus::InLibrary);
    }

    #[test]
    fn sticky_subscribed_beats_pending_release() {
        let status = classify_collection_item(false, true, Some(today() + Duration::days(5)), today());
        assert_eq!(status, MediaStatus::Subscribed);
    }

    #[test]
    fn future_release_is_pending() {
        let status = classify_collection_item(false, false, Some(today() + Duration::days(1)), today());
        assert_eq!(status, MediaStatus::PendingRelease);
    }

    #[test]
    fn past_release_with_no_subscription_is_missing() {
        let status = classify_collection_item(false, false, Some(today() - Duration::days(1)), today());
        assert_eq!(status, MediaStatus::Missing);
    }

    #[test]
    fn native_collection_keeps_previous_status_without_release_date() {
        let status =
            classify_native_item(false, false, None, MediaStatus::PendingRelease, today());
        assert_eq!(status, MediaStatus::PendingRelease);
    }

    #[test]
    fn actor_work_session_dedup_prevents_double_subscribe() {
        let mut session = std::collections::HashSet::new();
        session.insert("1022789".to_string());
        let outcome = classify_actor_work("1022789", false, false, &session, None, today());
        assert_eq!(outcome, ActorWorkClassification::Subscribed);
    }

    #[test]
    fn actor_work_without_session_hit_needs_attempt() {
        let session = std::collections::HashSet::new();
        let outcome = classify_actor_work(
            "1022789",
            false,
            false,
            &session,
            Some(today() - Duration::days(1)),
            today(),
        );
        assert_eq!(outcome, ActorWorkClassification::NeedsSubscribeAttempt);
    }
}
