// Job-type algebra: pure functions deciding how intents combine.
//
// Everything here is free of engine state; collapse is the only operation
// that needs the unit's activation state.

use crate::domain::job_type::JobType;
use crate::domain::unit::ActiveState;

#[cfg(test)]
#[path = "algebra_test.rs"]
mod algebra_test;

/// Types that participate in the merge table. Compound types must be
/// collapsed before they reach a slot, so an installed regular job is
/// always mergeable.
pub fn is_mergeable(t: JobType) -> bool {
    matches!(
        t,
        JobType::Start | JobType::VerifyActive | JobType::Stop | JobType::Reload | JobType::Restart
    )
}

/// Combine two intents against the same unit into the stronger one.
/// Commutative; `None` means the types are incompatible.
pub fn merge(a: JobType, b: JobType) -> Option<JobType> {
    use JobType::*;

    if a == b {
        return Some(a);
    }
    match (a, b) {
        (Start, VerifyActive) | (VerifyActive, Start) => Some(Start),
        (Start, Reload) | (Reload, Start) => Some(ReloadOrStart),
        (VerifyActive, Reload) | (Reload, VerifyActive) => Some(Reload),
        (Restart, Start | VerifyActive | Reload) | (Start | VerifyActive | Reload, Restart) => {
            Some(Restart)
        }
        _ => None,
    }
}

/// Resolve a compound type into a primitive given the unit's current state.
pub fn collapse(t: JobType, state: ActiveState) -> JobType {
    match t {
        JobType::TryRestart => {
            if state.is_inactive_or_deactivating() {
                JobType::Nop
            } else {
                JobType::Restart
            }
        }
        JobType::TryReload => {
            if state.is_inactive_or_deactivating() {
                JobType::Nop
            } else {
                JobType::Reload
            }
        }
        JobType::ReloadOrStart => {
            if state.is_inactive_or_deactivating() {
                JobType::Start
            } else {
                JobType::Reload
            }
        }
        other => other,
    }
}

/// The composed operation used at every install site. Associative once the
/// unit state is fixed.
pub fn merge_and_collapse(a: JobType, b: JobType, state: ActiveState) -> Option<JobType> {
    merge(a, b).map(|t| collapse(t, state))
}

/// Two types conflict iff they are both mergeable but their merge is
/// incompatible.
pub fn is_conflicting(a: JobType, b: JobType) -> bool {
    is_mergeable(a) && is_mergeable(b) && merge(a, b).is_none()
}

/// Whether a job of type `a` already entails everything a job of type `b`
/// would do.
pub fn is_superset(a: JobType, b: JobType) -> bool {
    if a == b {
        return true;
    }
    match a {
        JobType::Start | JobType::Reload => b == JobType::VerifyActive,
        JobType::Restart => matches!(
            b,
            JobType::Start | JobType::VerifyActive | JobType::Reload
        ),
        _ => false,
    }
}

/// Merging into an already-running job is allowed for every type except
/// `reload`: a daemon that already began consuming its old configuration
/// must be re-dispatched to pick up the new one.
pub fn allows_late_merge(t: JobType) -> bool {
    t != JobType::Reload
}

/// A job is redundant when its desired effect already holds on the unit.
pub fn is_redundant(t: JobType, state: ActiveState) -> bool {
    match t {
        JobType::Start | JobType::VerifyActive => state.is_active_or_reloading(),
        JobType::Stop => state.is_inactive_or_failed(),
        JobType::Reload => state == ActiveState::Reloading,
        JobType::Restart => state == ActiveState::Activating,
        _ => false,
    }
}
