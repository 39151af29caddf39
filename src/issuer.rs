//! `IssuerController` drives one Issuer object through `Check`,
//! surfacing `Ready`/`Failed` state the same way `RequestController`
//! surfaces its own terminal states.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::condition::{event_reason, reason, ConditionStatus, ConditionView};
use crate::error::{CheckError, ControllerError, SignerError};
use crate::event_router::EventRouter;
use crate::keys::{ObjectKey, RouterKey};
use crate::signer::Signer;
use crate::util::get_opt;

/// Adapter an issuer type (e.g. a `CustomResource`-derived `Issuer` or
/// `ClusterIssuer`) implements so the engine can read/write its `Ready`
/// condition without knowing its concrete shape.
pub trait IssuerObject:
    Resource<DynamicType = ()>
    + ResourceExt
    + Clone
    + std::fmt::Debug
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Stable identifier this issuer kind is registered under, used to
    /// route `signerName`/`issuerRef.kind` lookups and `EventRouter` keys
    /// (e.g. `"acme.example.com/ClusterIssuer"`).
    fn kind_id() -> &'static str;

    fn generation(&self) -> i64 {
        self.meta().generation.unwrap_or(0)
    }

    /// The current `Ready` condition, if the status has one.
    fn ready_condition(&self) -> Option<ConditionView>;

    /// Builds the server-side-apply status patch setting `Ready` to the
    /// given state, stamping `observedGeneration` to the issuer's current
    /// `generation`: the written Ready condition's observedGeneration
    /// always reflects the issuer's current generation.
    fn build_ready_patch(
        &self,
        status: ConditionStatus,
        reason: &str,
        message: String,
        now: DateTime<Utc>,
    ) -> serde_json::Value;

    /// Builds an `Api` handle. `namespace` is `None` for the
    /// controller-level watch (which must see every instance of a
    /// namespaced issuer kind, not just one namespace) and `Some` when
    /// fetching/patching one already-known object. Issuers may be
    /// namespaced or cluster-scoped; a cluster-scoped implementor ignores
    /// `namespace` and always returns `Api::all`.
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>
    where
        Self: Sized;
}

/// Outcome of one issuer reconcile, mirroring `RequestController`'s
/// `ReconcileOutcome` (the request and issuer reconcilers share the same
/// outcome vocabulary; an issuer reconcile never asks for a bare
/// near-term requeue).
#[derive(Debug)]
pub enum IssuerOutcome {
    Done,
    RetryWithBackoff(anyhow::Error),
    Terminal(anyhow::Error),
}

/// What to write to the `Ready` condition, decoupled from any concrete
/// object's patch shape so `decide` stays pure and unit-testable.
pub struct ReadyWrite {
    pub status: ConditionStatus,
    pub reason: &'static str,
    pub message: String,
}

pub struct IssuerDecision {
    pub write: Option<ReadyWrite>,
    pub outcome: IssuerOutcome,
    pub event: Option<(&'static str, String)>,
}

/// Result of a Check-or-reported-error step, abstracted so `decide` can
/// be unit tested without an async signer call.
pub enum CheckOutcome {
    Ok,
    Permanent(anyhow::Error),
    Retryable(anyhow::Error),
}

impl From<Result<(), CheckError>> for CheckOutcome {
    fn from(result: Result<(), CheckError>) -> Self {
        match result {
            Ok(()) => CheckOutcome::Ok,
            Err(CheckError::Permanent(e)) => CheckOutcome::Permanent(e),
            Err(CheckError::Retryable(e)) => CheckOutcome::Retryable(e),
        }
    }
}

/// True once an issuer's `Ready` condition is terminally `Failed` and the
/// spec hasn't changed since.
pub fn is_terminally_failed(existing_ready: Option<&ConditionView>, generation: i64) -> bool {
    existing_ready.is_some_and(|ready| {
        ready.status == ConditionStatus::False
            && ready.reason == reason::FAILED
            && ready.observed_generation.is_some_and(|g| g >= generation)
    })
}

/// Pure core of the issuer state machine: given the outcome of whatever
/// check input was used (a fresh `Check` call or a reported error),
/// decide the `Ready` write and outcome.
pub fn decide(check: CheckOutcome) -> IssuerDecision {
    match check {
        CheckOutcome::Ok => IssuerDecision {
            write: Some(ReadyWrite {
                status: ConditionStatus::True,
                reason: reason::CHECKED,
                message: "Succeeded checking the issuer".to_string(),
            }),
            outcome: IssuerOutcome::Done,
            event: Some((event_reason::CHECKED, "Succeeded checking the issuer".to_string())),
        },
        CheckOutcome::Permanent(err) => {
            let message = err.to_string();
            IssuerDecision {
                write: Some(ReadyWrite {
                    status: ConditionStatus::False,
                    reason: reason::FAILED,
                    message: message.clone(),
                }),
                outcome: IssuerOutcome::Terminal(err),
                event: Some((event_reason::PERMANENT_ERROR, message)),
            }
        }
        CheckOutcome::Retryable(err) => {
            let message = err.to_string();
            IssuerDecision {
                write: Some(ReadyWrite {
                    status: ConditionStatus::False,
                    reason: reason::PENDING,
                    message: message.clone(),
                }),
                outcome: IssuerOutcome::RetryWithBackoff(err),
                event: Some((event_reason::RETRYABLE_ERROR, message)),
            }
        }
    }
}

/// Drives one Issuer object through `Check`.
pub struct IssuerController<I, S> {
    pub client: Client,
    pub signer: Arc<S>,
    pub router: Arc<EventRouter>,
    pub clock: Arc<dyn Clock>,
    pub field_owner: String,
    pub reporter: Reporter,
    pub ignore: Option<Arc<dyn Fn(&I) -> bool + Send + Sync>>,
}

impl<I, S> IssuerController<I, S>
where
    I: IssuerObject,
    S: Signer<I>,
{
    /// Publishes a human-facing event against `issuer`: every terminal
    /// transition emits a Warning event whose message equals the condition
    /// message. Best-effort, same as the request controller's `emit`.
    async fn emit(&self, issuer: &I, event_type: EventType, reason: &'static str, note: String) {
        match event_type {
            EventType::Warning => warn!(event = reason, message = %note, "issuer event"),
            EventType::Normal => info!(event = reason, message = %note, "issuer event"),
        }
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), issuer.object_ref(&()));
        if let Err(error) = recorder
            .publish(&Event {
                type_: event_type,
                reason: reason.to_string(),
                note: Some(note),
                action: "Reconciling".to_string(),
                secondary: None,
            })
            .await
        {
            warn!(%error, "failed to publish issuer event");
        }
    }

    #[instrument(skip_all, fields(issuer.kind = I::kind_id(), issuer.name = %key.name))]
    pub async fn reconcile(&self, key: ObjectKey) -> Result<(), ControllerError> {
        let api = I::api(self.client.clone(), key.namespace.as_deref());
        let issuer = match get_opt(&api, &key.name).await? {
            Some(issuer) => issuer,
            None => {
                debug!("issuer not found, nothing to do");
                return Ok(());
            }
        };

        if let Some(ignore) = &self.ignore {
            if ignore(&issuer) {
                debug!("issuer ignored by pre-gate hook");
                return Ok(());
            }
        }

        let generation = issuer.generation();
        let existing_ready = issuer.ready_condition();
        let now = self.clock.now();

        if is_terminally_failed(existing_ready.as_ref(), generation) {
            debug!("issuer terminally failed, not touching it again");
            return Ok(());
        }

        if existing_ready.is_none() {
            let patch =
                issuer.build_ready_patch(ConditionStatus::Unknown, reason::INITIALIZING, String::new(), now);
            self.apply_status(&api, &key.name, patch).await?;
            return Ok(());
        }

        let router_key = RouterKey::new(I::kind_id(), key.clone());
        let current_ready_true = existing_ready
            .as_ref()
            .is_some_and(|c| c.status == ConditionStatus::True);
        // The reported error survives exactly one reconcile whether or
        // not it's used, so always consume it.
        let reported = self.router.consume_error(&router_key);
        let check_outcome: CheckOutcome = match reported {
            Some(err) if current_ready_true => {
                CheckOutcome::Retryable(anyhow::anyhow!("Not ready yet: {err}"))
            }
            _ => self.signer.check(&issuer).await.into(),
        };

        let decision = decide(check_outcome);

        if let Some(write) = decision.write {
            let before = crate::condition::ready_signal(existing_ready.as_ref());
            let patch = issuer.build_ready_patch(write.status, write.reason, write.message, now);
            self.apply_status(&api, &key.name, patch).await?;

            if before != Some(write.status) {
                self.router.broadcast_ready_change();
            }
        }

        if let Some((event, message)) = decision.event.clone() {
            let event_type = if event == event_reason::CHECKED {
                EventType::Normal
            } else {
                EventType::Warning
            };
            self.emit(&issuer, event_type, event, message).await;
        }

        match decision.outcome {
            IssuerOutcome::Done => Ok(()),
            IssuerOutcome::Terminal(err) => {
                warn!(error = %err, "issuer check permanently failed");
                Ok(())
            }
            IssuerOutcome::RetryWithBackoff(err) => {
                Err(ControllerError::Signer(SignerError::Retryable(err)))
            }
        }
    }

    async fn apply_status(
        &self,
        api: &Api<I>,
        name: &str,
        patch: serde_json::Value,
    ) -> Result<(), ControllerError> {
        let params = PatchParams::apply(&self.field_owner).force();
        api.patch_status(name, &params, &Patch::Apply(patch))
            .await
            .map_err(ControllerError::Patch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_ok_is_done_with_ready_true() {
        let decision = decide(CheckOutcome::Ok);
        let write = decision.write.expect("patch");
        assert_eq!(write.status, ConditionStatus::True);
        assert_eq!(write.reason, reason::CHECKED);
        assert!(matches!(decision.outcome, IssuerOutcome::Done));
    }

    #[test]
    fn check_permanent_is_terminal_with_ready_failed() {
        let decision = decide(CheckOutcome::Permanent(anyhow::anyhow!("nope")));
        let write = decision.write.expect("patch");
        assert_eq!(write.status, ConditionStatus::False);
        assert_eq!(write.reason, reason::FAILED);
        assert!(matches!(decision.outcome, IssuerOutcome::Terminal(_)));
    }

    #[test]
    fn check_retryable_is_pending_and_retries() {
        let decision = decide(CheckOutcome::Retryable(anyhow::anyhow!("timeout")));
        let write = decision.write.expect("patch");
        assert_eq!(write.status, ConditionStatus::False);
        assert_eq!(write.reason, reason::PENDING);
        assert!(matches!(decision.outcome, IssuerOutcome::RetryWithBackoff(_)));
    }

    #[test]
    fn terminal_failed_at_or_past_generation_is_sticky() {
        let ready = ConditionView {
            type_: "Ready".into(),
            status: ConditionStatus::False,
            reason: reason::FAILED.into(),
            message: String::new(),
            observed_generation: Some(3),
            last_transition_time: None,
        };
        assert!(is_terminally_failed(Some(&ready), 3));
        assert!(is_terminally_failed(Some(&ready), 2));
    }

    #[test]
    fn failed_with_stale_observed_generation_is_not_sticky() {
        let ready = ConditionView {
            type_: "Ready".into(),
            status: ConditionStatus::False,
            reason: reason::FAILED.into(),
            message: String::new(),
            observed_generation: Some(1),
            last_transition_time: None,
        };
        assert!(!is_terminally_failed(Some(&ready), 2));
    }

    #[test]
    fn pending_is_not_sticky() {
        let ready = ConditionView {
            type_: "Ready".into(),
            status: ConditionStatus::False,
            reason: reason::PENDING.into(),
            message: String::new(),
            observed_generation: Some(3),
            last_transition_time: None,
        };
        assert!(!is_terminally_failed(Some(&ready), 3));
    }
}
