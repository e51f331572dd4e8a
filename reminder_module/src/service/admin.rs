//! Administrative entitlement actions, bypassing trial-expiry arithmetic.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::profile_store::{EntitlementState, ProfileStore, ProfileStoreError};

pub fn grant_premium(store: &ProfileStore, user_id: i64) -> Result<(), ProfileStoreError> {
    store.update_entitlement(user_id, EntitlementState::Premium)?;
    info!("granted premium to user {}", user_id);
    Ok(())
}

/// Revoking premium restores whatever the stored trial window implies: an
/// unfinished trial resumes, a finished one lands on expired, and a user who
/// never had a trial goes back to none.
pub fn revoke_premium(
    store: &ProfileStore,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<EntitlementState, ProfileStoreError> {
    let restored = match store.trial_ends_at(user_id)? {
        Some(ends_at) if now >= ends_at => EntitlementState::TrialExpired,
        Some(ends_at) => EntitlementState::TrialActive { ends_at },
        None => EntitlementState::NoTrial,
    };
    store.update_entitlement(user_id, restored)?;
    info!("revoked premium for user {}; now {:?}", user_id, restored);
    Ok(restored)
}

pub fn entitlement_status(
    store: &ProfileStore,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<String, ProfileStoreError> {
    let profile = store
        .get_profile(user_id)?
        .ok_or(ProfileStoreError::UnknownUser(user_id))?;
    Ok(match profile.entitlement {
        EntitlementState::Premium => format!("user {user_id}: premium"),
        EntitlementState::TrialActive { .. } => format!(
            "user {user_id}: trial active, {} day(s) remaining",
            profile.entitlement.days_remaining(now).unwrap_or(0)
        ),
        EntitlementState::TrialExpired => format!("user {user_id}: trial expired"),
        EntitlementState::NoTrial => format!("user {user_id}: no trial"),
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap()
    }

    #[test]
    fn revoke_restores_trial_derived_state() {
        let temp = TempDir::new().expect("tempdir");
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        store
            .complete_registration(100, "Alex", chrono::Duration::days(14), now())
            .expect("register");

        grant_premium(&store, 100).expect("grant");
        let profile = store.get_profile(100).expect("get").expect("exists");
        assert_eq!(profile.entitlement, EntitlementState::Premium);

        // Revoked while the trial window is still open: the trial resumes.
        let restored = revoke_premium(&store, 100, now()).expect("revoke");
        assert_eq!(
            restored,
            EntitlementState::TrialActive {
                ends_at: now() + chrono::Duration::days(14),
            }
        );

        // Revoked after the window has passed: straight to expired.
        grant_premium(&store, 100).expect("grant");
        let later = now() + chrono::Duration::days(30);
        let restored = revoke_premium(&store, 100, later).expect("revoke");
        assert_eq!(restored, EntitlementState::TrialExpired);
    }

    #[test]
    fn unknown_user_is_an_error() {
        let temp = TempDir::new().expect("tempdir");
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        assert!(matches!(
            grant_premium(&store, 42),
            Err(ProfileStoreError::UnknownUser(42))
        ));
        assert!(matches!(
            revoke_premium(&store, 42, now()),
            Err(ProfileStoreError::UnknownUser(42))
        ));
    }
}
