//! Event filtering: without this layer, the engine's own status writes
//! would retrigger reconciliation forever. Each function
//! below is a projection `Fn(&K) -> Option<u64>` in exactly the shape
//! `kube::runtime::predicates` (`kube_runtime::utils::predicate::
//! predicates::{generation, labels, annotations, ...}`) uses, so it plugs
//! straight into `WatchStreamExt::predicate_filter`: the watch stream only
//! re-emits an object when the projection's hash changes from the last
//! time that object's key was seen.
//!
//! Rather than hashing one property (as `predicates::generation` does),
//! each projection here hashes a tuple capturing exactly the semantic
//! slice that matters for that watcher, so an update that doesn't touch
//! that slice collapses to the same hash and is filtered out.

use std::hash::{Hash, Hasher};

use crate::condition::ConditionStatus;
use crate::issuer::IssuerObject;
use crate::request::RequestObject;

fn hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Request predicate: reconcile on create/delete
/// (handled by the watcher itself, not this filter) and on update only if
/// annotations changed, the condition-type set changed, or any non-`Ready`
/// condition's `status` changed. Changing `reason`/`message` alone, or the
/// engine's own `Ready` writes, must not pass this filter.
pub fn request_semantic_change<R: RequestObject>(obj: &R) -> Option<u64> {
    use kube::ResourceExt;

    let mut types: Vec<&str> = obj.conditions_ref().iter().map(|c| c.type_.as_str()).collect();
    types.sort_unstable();

    let mut non_ready_statuses: Vec<(&str, ConditionStatus)> = obj
        .conditions_ref()
        .iter()
        .filter(|c| c.type_ != "Ready")
        .map(|c| (c.type_.as_str(), c.status))
        .collect();
    non_ready_statuses.sort_by_key(|(t, _)| *t);

    let mut annotations: Vec<(&str, &str)> = obj
        .annotations()
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    annotations.sort_unstable();

    Some(hash(&(annotations, types, non_ready_statuses)))
}

/// Linked-issuer predicate: a request watching its
/// referenced issuer only cares whether `Ready`'s `status` changed, or
/// whether the condition was added/removed. `reason`/`message` changes on
/// `Ready` are ignored here too.
///
/// `IssuerController` uses the same underlying signal
/// (`condition::ready_signal`) to decide when to broadcast a ready-change
/// ping to the request controllers (see `EventRouter::broadcast_ready_change`
/// in `event_router.rs`), since a generic multi-kind engine can't express
/// this as a single `kube_runtime::Controller::watches` call the way a
/// fixed-shape controller would.
pub fn linked_issuer_ready_change<I: IssuerObject>(obj: &I) -> Option<u64> {
    Some(hash(&crate::condition::ready_signal(obj.ready_condition().as_ref())))
}

/// Issuer predicate: the issuer controller reconciles
/// its own kind on generation change, annotation change, or a
/// presence-transition of `Ready` (added or removed; a `reason`-only
/// update to an existing `Ready` does not count).
pub fn issuer_semantic_change<I: IssuerObject>(obj: &I) -> Option<u64> {
    use kube::ResourceExt;

    let mut annotations: Vec<(&str, &str)> = obj
        .annotations()
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    annotations.sort_unstable();

    Some(hash(&(obj.generation(), annotations, obj.ready_condition().is_some())))
}

#[cfg(test)]
mod tests {
    //! Predicate-matrix tests: enumerate representative
    //! `(old, new)` condition-set transitions and assert which ones the
    //! request predicate's hash distinguishes.
    use super::*;
    use crate::condition::ConditionView;
    use chrono::Utc;

    fn cond(type_: &str, status: ConditionStatus, reason: &str) -> ConditionView {
        ConditionView {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: String::new(),
            observed_generation: None,
            last_transition_time: Some(Utc::now()),
        }
    }

    // A minimal stand-in object exposing only what the projections need,
    // so the predicate matrix can be exercised without a full CRD.
    struct Fake {
        annotations: std::collections::BTreeMap<String, String>,
        conditions: Vec<ConditionView>,
    }

    fn hash_request(f: &Fake) -> u64 {
        let mut types: Vec<&str> = f.conditions.iter().map(|c| c.type_.as_str()).collect();
        types.sort_unstable();
        let mut non_ready: Vec<(&str, ConditionStatus)> = f
            .conditions
            .iter()
            .filter(|c| c.type_ != "Ready")
            .map(|c| (c.type_.as_str(), c.status))
            .collect();
        non_ready.sort_by_key(|(t, _)| *t);
        let mut anns: Vec<(&str, &str)> = f.annotations.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        anns.sort_unstable();
        hash(&(anns, types, non_ready))
    }

    #[test]
    fn ready_reason_only_change_is_invisible() {
        let before = Fake {
            annotations: Default::default(),
            conditions: vec![cond("Ready", ConditionStatus::False, "Pending")],
        };
        let after = Fake {
            annotations: Default::default(),
            conditions: vec![cond("Ready", ConditionStatus::False, "Failed")],
        };
        assert_eq!(hash_request(&before), hash_request(&after));
    }

    #[test]
    fn ready_status_change_is_invisible_to_request_predicate() {
        // The request predicate ignores Ready entirely (only non-Ready
        // condition status changes matter) - this is what prevents the
        // engine's own Ready writes from retriggering the request watch.
        let before = Fake {
            annotations: Default::default(),
            conditions: vec![cond("Ready", ConditionStatus::Unknown, "Initializing")],
        };
        let after = Fake {
            annotations: Default::default(),
            conditions: vec![cond("Ready", ConditionStatus::True, "Issued")],
        };
        assert_eq!(hash_request(&before), hash_request(&after));
    }

    #[test]
    fn non_ready_status_change_is_visible() {
        let before = Fake {
            annotations: Default::default(),
            conditions: vec![cond("Approved", ConditionStatus::False, "")],
        };
        let after = Fake {
            annotations: Default::default(),
            conditions: vec![cond("Approved", ConditionStatus::True, "")],
        };
        assert_ne!(hash_request(&before), hash_request(&after));
    }

    #[test]
    fn non_ready_reason_only_change_is_invisible() {
        let before = Fake {
            annotations: Default::default(),
            conditions: vec![cond("Approved", ConditionStatus::True, "UserApproved")],
        };
        let after = Fake {
            annotations: Default::default(),
            conditions: vec![cond("Approved", ConditionStatus::True, "AutoApproved")],
        };
        assert_eq!(hash_request(&before), hash_request(&after));
    }

    #[test]
    fn condition_type_set_change_is_visible() {
        let before = Fake {
            annotations: Default::default(),
            conditions: vec![cond("Approved", ConditionStatus::True, "")],
        };
        let after = Fake {
            annotations: Default::default(),
            conditions: vec![
                cond("Approved", ConditionStatus::True, ""),
                cond("Denied", ConditionStatus::False, ""),
            ],
        };
        assert_ne!(hash_request(&before), hash_request(&after));
    }

    #[test]
    fn annotation_change_is_visible() {
        let before = Fake {
            annotations: Default::default(),
            conditions: vec![],
        };
        let mut anns = std::collections::BTreeMap::new();
        anns.insert("a".to_string(), "b".to_string());
        let after = Fake {
            annotations: anns,
            conditions: vec![],
        };
        assert_ne!(hash_request(&before), hash_request(&after));
    }

    #[test]
    fn linked_issuer_predicate_ignores_reason_changes() {
        let before = Some(cond("Ready", ConditionStatus::False, "Pending"));
        let after = Some(cond("Ready", ConditionStatus::False, "Checking"));
        assert_eq!(
            hash(&before.map(|c| c.status)),
            hash(&after.map(|c| c.status))
        );
    }

    #[test]
    fn linked_issuer_predicate_sees_status_change() {
        let before = Some(cond("Ready", ConditionStatus::False, "Pending"));
        let after = Some(cond("Ready", ConditionStatus::True, "Checked"));
        assert_ne!(
            hash(&before.map(|c| c.status)),
            hash(&after.map(|c| c.status))
        );
    }

    #[test]
    fn linked_issuer_predicate_sees_presence_transition() {
        let before: Option<ConditionView> = None;
        let after = Some(cond("Ready", ConditionStatus::Unknown, "Initializing"));
        assert_ne!(
            hash(&before.map(|c| c.status)),
            hash(&after.map(|c| c.status))
        );
    }
}
