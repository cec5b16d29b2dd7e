//! Unit tests for the job-type algebra

use super::*;
use crate::domain::job_type::JobType::*;
use crate::domain::unit::ActiveState;

const MERGE_DOMAIN: [JobType; 5] = [Start, VerifyActive, Stop, Reload, Restart];

#[test]
fn test_merge_table() {
    assert_eq!(merge(Start, Start), Some(Start));
    assert_eq!(merge(Start, VerifyActive), Some(Start));
    assert_eq!(merge(Start, Stop), None);
    assert_eq!(merge(Start, Reload), Some(ReloadOrStart));

    assert_eq!(merge(VerifyActive, VerifyActive), Some(VerifyActive));
    assert_eq!(merge(VerifyActive, Stop), None);
    assert_eq!(merge(VerifyActive, Reload), Some(Reload));

    assert_eq!(merge(Stop, Stop), Some(Stop));
    assert_eq!(merge(Stop, Reload), None);

    assert_eq!(merge(Reload, Reload), Some(Reload));

    assert_eq!(merge(Restart, Start), Some(Restart));
    assert_eq!(merge(Restart, VerifyActive), Some(Restart));
    assert_eq!(merge(Restart, Stop), None);
    assert_eq!(merge(Restart, Reload), Some(Restart));
}

#[test]
fn test_merge_is_commutative() {
    for a in MERGE_DOMAIN {
        for b in MERGE_DOMAIN {
            assert_eq!(merge(a, b), merge(b, a), "merge({a}, {b})");
        }
    }
}

#[test]
fn test_merge_and_collapse_is_associative() {
    // Associativity holds after collapse, for every fixed unit state.
    for state in ActiveState::ALL {
        for a in MERGE_DOMAIN {
            for b in MERGE_DOMAIN {
                for c in MERGE_DOMAIN {
                    let left = merge_and_collapse(a, b, state)
                        .and_then(|ab| merge_and_collapse(ab, c, state));
                    let right = merge_and_collapse(b, c, state)
                        .and_then(|bc| merge_and_collapse(a, bc, state));
                    assert_eq!(left, right, "({a} + {b}) + {c} vs {a} + ({b} + {c}) @ {state}");
                }
            }
        }
    }
}

#[test]
fn test_collapse() {
    assert_eq!(collapse(TryRestart, ActiveState::Inactive), Nop);
    assert_eq!(collapse(TryRestart, ActiveState::Deactivating), Nop);
    assert_eq!(collapse(TryRestart, ActiveState::Active), Restart);

    assert_eq!(collapse(TryReload, ActiveState::Failed), Nop);
    assert_eq!(collapse(TryReload, ActiveState::Active), Reload);

    assert_eq!(collapse(ReloadOrStart, ActiveState::Inactive), Start);
    assert_eq!(collapse(ReloadOrStart, ActiveState::Active), Reload);
    assert_eq!(collapse(ReloadOrStart, ActiveState::Activating), Reload);

    // Primitives and restart pass through untouched.
    for state in ActiveState::ALL {
        for t in [Start, VerifyActive, Stop, Reload, Restart, Nop] {
            assert_eq!(collapse(t, state), t);
        }
    }
}

#[test]
fn test_conflicts() {
    assert!(is_conflicting(Start, Stop));
    assert!(is_conflicting(Stop, Start));
    assert!(is_conflicting(Stop, Reload));
    assert!(is_conflicting(Stop, Restart));
    assert!(!is_conflicting(Start, Reload));
    assert!(!is_conflicting(Stop, Stop));
    // Nop is outside the merge domain and conflicts with nothing.
    assert!(!is_conflicting(Nop, Stop));
}

#[test]
fn test_supersets() {
    assert!(is_superset(Start, VerifyActive));
    assert!(is_superset(Reload, VerifyActive));
    assert!(is_superset(Restart, Start));
    assert!(is_superset(Restart, VerifyActive));
    assert!(is_superset(Restart, Reload));
    for t in JobType::ALL {
        assert!(is_superset(t, t));
    }
    assert!(!is_superset(Start, Restart));
    assert!(!is_superset(VerifyActive, Start));
    assert!(!is_superset(Stop, Start));
}

#[test]
fn test_late_merge_policy() {
    assert!(allows_late_merge(Start));
    assert!(allows_late_merge(VerifyActive));
    assert!(allows_late_merge(Stop));
    assert!(allows_late_merge(Restart));
    assert!(!allows_late_merge(Reload));
}

#[test]
fn test_redundancy() {
    assert!(is_redundant(Start, ActiveState::Active));
    assert!(is_redundant(Start, ActiveState::Reloading));
    assert!(!is_redundant(Start, ActiveState::Activating));

    assert!(is_redundant(VerifyActive, ActiveState::Active));

    assert!(is_redundant(Stop, ActiveState::Inactive));
    assert!(is_redundant(Stop, ActiveState::Failed));
    assert!(!is_redundant(Stop, ActiveState::Deactivating));

    assert!(is_redundant(Reload, ActiveState::Reloading));
    assert!(!is_redundant(Reload, ActiveState::Active));

    assert!(is_redundant(Restart, ActiveState::Activating));
    assert!(!is_redundant(Restart, ActiveState::Active));

    assert!(!is_redundant(Nop, ActiveState::Active));
}
