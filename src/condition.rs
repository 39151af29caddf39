//! A neutral view over a single status condition, used so the engine can
//! reason about `Ready`/`Failed`/custom conditions the same way regardless
//! of whether the underlying object stores them as
//! `k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition` (the
//! namespaced `CertificateRequest`/`Issuer` shape) or
//! `k8s_openapi::api::certificates::v1::CertificateSigningRequestCondition`
//! (the built-in cluster-wide shape).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A read-only snapshot of one condition on an object.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionView {
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub observed_generation: Option<i64>,
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl ConditionView {
    pub fn find<'a>(conditions: &'a [ConditionView], type_: &str) -> Option<&'a ConditionView> {
        conditions.iter().find(|c| c.type_ == type_)
    }
}

/// Reason vocabulary for the `Ready` condition, shared by both
/// request variants and the issuer.
pub mod reason {
    pub const INITIALIZING: &str = "Initializing";
    pub const PENDING: &str = "Pending";
    pub const DENIED: &str = "Denied";
    pub const FAILED: &str = "Failed";
    pub const ISSUED: &str = "Issued";
    pub const CHECKED: &str = "Checked";
}

/// Event vocabulary, emitted on both requests and issuers.
pub mod event_reason {
    pub const WAITING_FOR_ISSUER_EXIST: &str = "WaitingForIssuerExist";
    pub const WAITING_FOR_ISSUER_READY: &str = "WaitingForIssuerReady";
    pub const RETRYABLE_ERROR: &str = "RetryableError";
    pub const PERMANENT_ERROR: &str = "PermanentError";
    pub const ISSUED: &str = "Issued";
    pub const CHECKED: &str = "Checked";
    pub const UNEXPECTED_ERROR: &str = "UnexpectedError";
}

/// Computes whether writing `new` over `existing` constitutes a condition
/// *transition* — i.e. whether `lastTransitionTime` must be bumped.
///
/// The timestamp changes iff `status` changed; a `reason`/`message`-only
/// update preserves it.
pub fn did_transition(existing: Option<&ConditionView>, new_status: ConditionStatus) -> bool {
    match existing {
        None => true,
        Some(existing) => existing.status != new_status,
    }
}

/// The signal a request watching its referenced issuer actually cares
/// about: whether `Ready` is present at all, and if so, its `status`.
/// `reason`/`message` changes carry no information a blocked request needs.
pub fn ready_signal(ready: Option<&ConditionView>) -> Option<ConditionStatus> {
    ready.map(|c| c.status)
}

/// Picks the `lastTransitionTime` to stamp on a condition write: preserved
/// from `existing` unless the status changed, in which case it becomes
/// `now`.
pub fn transition_time(
    existing: Option<&ConditionView>,
    new_status: ConditionStatus,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if did_transition(existing, new_status) {
        now
    } else {
        existing
            .and_then(|c| c.last_transition_time)
            .unwrap_or(now)
    }
}
