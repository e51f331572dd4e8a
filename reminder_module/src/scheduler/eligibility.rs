//! Entitlement gating: who may receive notifications right now.
//!
//! The check runs every tick for every user, so it stays cheap (one enum
//! match, no I/O on the happy path) and its only side effect, the one-shot
//! trial expiry transition, is idempotent.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::profile_store::{EntitlementState, ProfileStore, UserScheduleProfile};

use super::ledger::WarningKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligibleReason {
    TrialExpired,
    NoTrial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

pub struct EligibilityFilter<'a> {
    store: &'a ProfileStore,
}

impl<'a> EligibilityFilter<'a> {
    pub fn new(store: &'a ProfileStore) -> Self {
        Self { store }
    }

    /// Decide whether the user currently qualifies for notifications, and
    /// flip `TrialActive -> TrialExpired` when the trial end has passed.
    ///
    /// A failed write-back leaves the stored state active so the next tick
    /// retries the transition; this tick still treats the user as
    /// ineligible.
    pub fn check(
        &self,
        profile: &mut UserScheduleProfile,
        now: DateTime<Utc>,
    ) -> Eligibility {
        match profile.entitlement {
            EntitlementState::Premium => Eligibility::Eligible,
            EntitlementState::TrialActive { ends_at } if now < ends_at => Eligibility::Eligible,
            EntitlementState::TrialActive { .. } => {
                match self
                    .store
                    .update_entitlement(profile.user_id, EntitlementState::TrialExpired)
                {
                    Ok(()) => {
                        info!("trial expired for user {}", profile.user_id);
                        profile.entitlement = EntitlementState::TrialExpired;
                    }
                    Err(err) => {
                        warn!(
                            "failed to record trial expiry for user {}: {}",
                            profile.user_id, err
                        );
                    }
                }
                Eligibility::Ineligible(IneligibleReason::TrialExpired)
            }
            EntitlementState::TrialExpired => {
                Eligibility::Ineligible(IneligibleReason::TrialExpired)
            }
            EntitlementState::NoTrial => Eligibility::Ineligible(IneligibleReason::NoTrial),
        }
    }
}

/// Warning thresholds crossed for an active trial, nearest first. More than
/// one can come back after scheduler downtime; the ledger keeps each kind to
/// a single delivery per trial period.
pub fn due_warnings(profile: &UserScheduleProfile, now: DateTime<Utc>) -> Vec<WarningKind> {
    let ends_at = match profile.entitlement {
        EntitlementState::TrialActive { ends_at } if now < ends_at => ends_at,
        _ => return Vec::new(),
    };
    let remaining = ends_at - now;
    [WarningKind::ThreeDay, WarningKind::OneDay]
        .into_iter()
        .filter(|kind| remaining <= chrono::Duration::days(kind.threshold_days()))
        .collect()
}
