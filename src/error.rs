use thiserror::Error;

use crate::condition::ConditionStatus;

/// Error taxonomy a `Sign` implementation may return.
///
/// Each variant carries a fixed handling policy in `RequestController`:
/// `Pending` bypasses `MaxRetryDuration` and never terminates, `Permanent`
/// always terminates, `Issuer` reroutes through the `EventRouter`,
/// `SetRequestCondition` writes a user condition and then re-triages its
/// wrapped cause, and anything else is retried until the deadline.
#[derive(Debug, Error)]
pub enum SignerError {
    /// "Retrying will succeed in finite time." Never becomes `Terminal`.
    #[error("signing still in progress: {0}")]
    Pending(#[source] anyhow::Error),

    /// "No amount of retrying can help." Always becomes `Terminal`.
    #[error("permanent signing failure: {0}")]
    Permanent(#[source] anyhow::Error),

    /// "This looks like the issuer's fault." Routed to the `EventRouter`.
    #[error("issuer error: {0}")]
    Issuer(#[source] anyhow::Error),

    /// Also write a user-defined condition before triaging the wrapped
    /// error as one of the other classes.
    #[error("{reason}: {source}")]
    SetRequestCondition {
        condition_type: String,
        status: ConditionStatus,
        reason: String,
        #[source]
        source: Box<SignerError>,
    },

    /// Anything else: retryable, subject to `MaxRetryDuration`.
    #[error(transparent)]
    Retryable(#[from] anyhow::Error),
}

impl SignerError {
    /// The wrapped error to triage, unwrapping `SetRequestCondition`
    /// transparently.
    pub fn innermost(&self) -> &SignerError {
        match self {
            SignerError::SetRequestCondition { source, .. } => source.innermost(),
            other => other,
        }
    }
}

/// Error taxonomy a `Check` implementation may return. Only
/// `Permanent` or an arbitrary retryable error; there is no pending or
/// issuer-routing concept for a Check (the issuer *is* what's being
/// checked).
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("permanent issuer failure: {0}")]
    Permanent(#[source] anyhow::Error),

    #[error(transparent)]
    Retryable(#[from] anyhow::Error),
}

/// Errors internal to the engine's interaction with the Kubernetes API.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to get object: {0}")]
    Get(#[source] kube::Error),

    #[error("failed to patch status: {0}")]
    Patch(#[source] kube::Error),

    #[error("missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("no issuer type registered for kind {0:?}")]
    UnknownIssuerKind(String),

    #[error(transparent)]
    Signer(#[from] SignerError),
}
