//! `RequestController` drives one signing request, of either variant,
//! through its state machine to a terminal state or a retry/back-off.

pub mod cluster;
pub mod namespaced;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::api::Api;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::condition::{event_reason, ConditionStatus, ConditionView};
use crate::error::{ControllerError, SignerError};
use crate::event_router::EventRouter;
use crate::keys::{IssuerRef, ObjectKey, RouterKey};
use crate::signer::{PemBundle, RequestView, Signer};
use crate::util::get_opt;

/// Whether an issuer kind is namespaced or cluster-scoped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssuerScope {
    Namespaced,
    Cluster,
}

/// Adapter a request variant (namespaced `CertificateRequest` or the
/// built-in cluster-wide `CertificateSigningRequest`) implements so the
/// generic `RequestController` can drive it.
pub trait RequestObject:
    Resource<DynamicType = ()>
    + ResourceExt
    + Clone
    + std::fmt::Debug
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
    type PatchBuilder: RequestPatchBuilder;

    /// Which issuer scopes this variant may reference. The cluster variant
    /// rejects namespaced issuer types explicitly.
    const ALLOWED_ISSUER_SCOPES: &'static [IssuerScope];

    /// Whether this variant tracks a `Ready` condition at all. The cluster
    /// variant doesn't manage a Ready condition at all; its success signal
    /// is solely the `Certificate` field being populated. When `false`,
    /// the `Initializing` detour is skipped entirely.
    const HAS_READY_CONDITION: bool = true;

    fn is_approved(&self) -> bool;
    /// Raw administrative signal: the user denied this request. Stays
    /// `true` forever once set; does not by itself imply the engine has
    /// recorded the terminal write yet (see `is_terminal`).
    fn is_denied(&self) -> bool;
    /// The request has already reached its successful terminal state
    /// (`Ready=True` for the namespaced variant, a populated `Certificate`
    /// for the cluster variant, which has no `Ready` condition to check).
    fn is_ready(&self) -> bool;
    /// True once the engine's own terminal write - `Failed` or `Denied` -
    /// has already been recorded. Requests carry an immutable generation,
    /// so unlike the issuer's stickiness check this needs no
    /// `observedGeneration` comparison: once written, it stays true
    /// forever.
    fn is_terminal(&self) -> bool;

    /// Resolves which issuer this request names, or `None` if it can't be
    /// parsed at all (treated the same as a foreign/mismatched request).
    fn issuer_ref(&self) -> Option<IssuerRef>;

    fn csr(&self) -> &[u8];

    fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.meta().creation_timestamp.as_ref().map(|t| t.0)
    }

    fn generation(&self) -> i64 {
        self.meta().generation.unwrap_or(0)
    }

    /// All conditions currently on the request's status, used both by the
    /// predicate layer and to look up `Ready`/custom conditions.
    fn conditions_ref(&self) -> Vec<ConditionView>;

    fn ready_condition(&self) -> Option<ConditionView> {
        ConditionView::find(&self.conditions_ref(), "Ready").cloned()
    }

    /// Builds a patch writer seeded with this request's current
    /// conditions, so it can compute `didTransition`/`lastTransitionTime`
    /// correctly.
    fn patch_builder(&self, now: DateTime<Utc>) -> Self::PatchBuilder;

    fn api(client: Client, namespace: Option<&str>) -> Api<Self>
    where
        Self: Sized;

    fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace(), self.name_any())
    }
}

/// Per-variant builder producing the server-side-apply status patch
/// one method per state-machine transition, mirroring the familiar
/// builder-per-reconcile-loop shape.
pub trait RequestPatchBuilder: Send {
    fn set_initializing(&mut self);
    fn set_denied_terminal(&mut self);
    fn set_waiting_for_issuer_exist(&mut self, message: String);
    fn set_waiting_for_issuer_ready(&mut self, message: String);
    /// Writes/merges a custom condition, returning whether its `status`
    /// newly transitioned.
    fn set_custom_condition(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: String,
    ) -> bool;
    fn set_pending(&mut self, message: String);
    fn set_retryable_error(&mut self, message: String);
    fn set_permanent_error(&mut self, message: String);
    fn set_issued(&mut self, chain: Vec<u8>);
    /// Back-compat: also copy the CA bytes into the request's `CA` status
    /// field, gated by `Options::set_ca_on_certificate_request`. A
    /// no-op on variants without such a field.
    fn set_ca(&mut self, ca: Vec<u8>);
    fn build(self: Box<Self>) -> serde_json::Value;
}

/// Result of fetching the issuer, checking its readiness, and calling
/// `Sign` against one registered issuer backend.
pub enum SignAttempt {
    IssuerNotFound,
    IssuerNotReady(String),
    Signed(PemBundle),
    SignError(SignerError),
}

/// One registered `(issuer kind, Signer)` pair, type-erased so
/// `RequestController` can hold many of them (one per `IssuerTypes`/
/// `ClusterIssuerTypes` entry) without being generic over all of them at
/// once.
#[async_trait]
pub trait IssuerBackend: Send + Sync {
    fn kind_id(&self) -> &str;
    fn scope(&self) -> IssuerScope;
    async fn attempt_sign(&self, issuer_key: &ObjectKey, request: RequestView<'_>) -> SignAttempt;
    fn router_key(&self, issuer_key: &ObjectKey) -> RouterKey {
        RouterKey::new(self.kind_id().to_string(), issuer_key.clone())
    }
}

/// Computes the message for an issuer whose `Ready` condition is absent,
/// outdated, or present-but-not-true. Returns `None` if the issuer is
/// usable.
pub fn issuer_readiness_message(ready: Option<&ConditionView>, issuer_generation: i64) -> Option<String> {
    match ready {
        None => Some(
            "Waiting for issuer to become ready. Current issuer ready condition: <none>.".to_string(),
        ),
        Some(ready) if ready.observed_generation.map_or(true, |g| g < issuer_generation) => Some(
            "Waiting for issuer to become ready. Current issuer ready condition is outdated.".to_string(),
        ),
        Some(ready) if ready.status != ConditionStatus::True => Some(format!(
            "Waiting for issuer to become ready. Current issuer ready condition is \"{}\": {}.",
            ready.reason, ready.message
        )),
        Some(_) => None,
    }
}

/// Concrete implementation of `IssuerBackend` for one `(I, S)` pair.
pub struct ConcreteIssuerBackend<I, S> {
    pub client: Client,
    pub signer: Arc<S>,
    pub kind_id: String,
    pub scope: IssuerScope,
    _marker: std::marker::PhantomData<I>,
}

impl<I, S> ConcreteIssuerBackend<I, S> {
    pub fn new(client: Client, signer: Arc<S>, kind_id: impl Into<String>, scope: IssuerScope) -> Self {
        Self {
            client,
            signer,
            kind_id: kind_id.into(),
            scope,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<I, S> IssuerBackend for ConcreteIssuerBackend<I, S>
where
    I: crate::issuer::IssuerObject,
    S: Signer<I>,
{
    fn kind_id(&self) -> &str {
        &self.kind_id
    }

    fn scope(&self) -> IssuerScope {
        self.scope
    }

    async fn attempt_sign(&self, issuer_key: &ObjectKey, request: RequestView<'_>) -> SignAttempt {
        let api = I::api(self.client.clone(), issuer_key.namespace.as_deref());
        let issuer = match get_opt(&api, &issuer_key.name).await {
            Ok(Some(issuer)) => issuer,
            Ok(None) => return SignAttempt::IssuerNotFound,
            Err(err) => return SignAttempt::SignError(SignerError::Retryable(err.into())),
        };

        let generation = issuer.generation();
        let ready = issuer.ready_condition();
        if let Some(message) = issuer_readiness_message(ready.as_ref(), generation) {
            return SignAttempt::IssuerNotReady(message);
        }

        match self.signer.sign(request, &issuer).await {
            Ok(bundle) => SignAttempt::Signed(bundle),
            Err(err) => SignAttempt::SignError(err),
        }
    }
}

/// Outcome of one request reconcile.
#[derive(Debug)]
pub enum ReconcileOutcome {
    Done,
    RetryWithBackoff(anyhow::Error),
    Terminal(anyhow::Error),
    RequeueSoon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Triage {
    Done,
    RequeueSoon,
    Terminal,
    RetryWithBackoff,
}

struct TriageResult {
    action: Triage,
    route_issuer_error: Option<String>,
    event: Option<(&'static str, String)>,
}

/// Given the `Sign` error and whether the retry deadline has passed,
/// writes the appropriate condition(s) via `builder` and returns what to
/// do next. Recurses once per `SetRequestCondition` wrapper layer.
fn triage(builder: &mut dyn RequestPatchBuilder, err: &SignerError, deadline_passed: bool) -> TriageResult {
    match err {
        SignerError::Issuer(inner) => {
            let message = format!(
                "Failed to sign: the issuer's status may be outdated: {inner}"
            );
            builder.set_pending(message);
            TriageResult {
                action: Triage::Done,
                route_issuer_error: Some(inner.to_string()),
                event: None,
            }
        }
        SignerError::SetRequestCondition {
            condition_type,
            status,
            reason,
            source,
        } => {
            let did_transition =
                builder.set_custom_condition(condition_type, *status, reason, source.to_string());
            let mut result = triage(builder, source, deadline_passed);
            result.action = match (result.action, did_transition) {
                (Triage::RequeueSoon, true) => Triage::Done,
                (Triage::RetryWithBackoff, true) => Triage::Terminal,
                (action, _) => action,
            };
            result
        }
        SignerError::Pending(inner) => {
            builder.set_pending(format!("Signing still in progress. Reason: {inner}"));
            TriageResult {
                action: Triage::RequeueSoon,
                route_issuer_error: None,
                event: None,
            }
        }
        SignerError::Permanent(inner) => {
            builder.set_permanent_error(inner.to_string());
            TriageResult {
                action: Triage::Terminal,
                route_issuer_error: None,
                event: Some((event_reason::PERMANENT_ERROR, inner.to_string())),
            }
        }
        SignerError::Retryable(inner) => {
            if deadline_passed {
                builder.set_permanent_error(inner.to_string());
                TriageResult {
                    action: Triage::Terminal,
                    route_issuer_error: None,
                    event: Some((event_reason::PERMANENT_ERROR, inner.to_string())),
                }
            } else {
                let message = format!("Failed to sign, will retry: {inner}");
                builder.set_retryable_error(message.clone());
                TriageResult {
                    action: Triage::RetryWithBackoff,
                    route_issuer_error: None,
                    event: Some((event_reason::RETRYABLE_ERROR, message)),
                }
            }
        }
    }
}

/// Drives one Request object (of whichever variant `R` binds) through its
/// state machine.
pub struct RequestController<R: RequestObject> {
    pub client: Client,
    pub router: Arc<EventRouter>,
    pub clock: Arc<dyn Clock>,
    pub field_owner: String,
    pub reporter: Reporter,
    pub max_retry_duration: chrono::Duration,
    pub backends: Vec<Arc<dyn IssuerBackend>>,
    pub ignore: Option<Arc<dyn Fn(&R, &str, &str) -> bool + Send + Sync>>,
    pub set_ca_on_certificate_request: bool,
    _marker: std::marker::PhantomData<R>,
}

impl<R: RequestObject> RequestController<R> {
    pub fn new(
        client: Client,
        router: Arc<EventRouter>,
        clock: Arc<dyn Clock>,
        field_owner: String,
        max_retry_duration: chrono::Duration,
        backends: Vec<Arc<dyn IssuerBackend>>,
    ) -> Self {
        let reporter = Reporter::from(field_owner.clone());
        Self {
            client,
            router,
            clock,
            field_owner,
            reporter,
            max_retry_duration,
            backends,
            ignore: None,
            set_ca_on_certificate_request: false,
            _marker: std::marker::PhantomData,
        }
    }

    fn find_backend(&self, issuer_ref: &IssuerRef) -> Option<&Arc<dyn IssuerBackend>> {
        self.backends.iter().find(|b| {
            b.kind_id() == issuer_ref.kind_id && R::ALLOWED_ISSUER_SCOPES.contains(&b.scope())
        })
    }

    /// Builds an event recorder attached to `req`. One
    /// `Recorder` per reconcile, following `kube_runtime`'s own
    /// per-object-reference usage — cheap, since it just wraps an `Api`
    /// handle and a cloned `ObjectReference`.
    fn recorder(&self, req: &R) -> Recorder {
        Recorder::new(self.client.clone(), self.reporter.clone(), req.object_ref(&()))
    }

    /// Publishes a human-facing event and logs it: every terminal
    /// transition emits a Warning event whose message equals the
    /// condition message (and, for the non-terminal reasons here, the
    /// analogous informational events). Best-effort: a failed publish is
    /// logged but never turns a successful reconcile into an error, since
    /// the engine's correctness depends only on the status patch, not on
    /// this side channel.
    async fn emit(&self, req: &R, event_type: EventType, reason: &'static str, note: String) {
        match event_type {
            EventType::Warning => warn!(event = reason, message = %note, "request event"),
            EventType::Normal => info!(event = reason, message = %note, "request event"),
        }
        if let Err(error) = self
            .recorder(req)
            .publish(&Event {
                type_: event_type,
                reason: reason.to_string(),
                note: Some(note),
                action: "Reconciling".to_string(),
                secondary: None,
            })
            .await
        {
            warn!(%error, "failed to publish request event");
        }
    }

    #[instrument(skip_all, fields(request.name = %req.name_any(), request.namespace = req.namespace().as_deref().unwrap_or("")))]
    pub async fn reconcile(&self, req: &R) -> Result<ReconcileOutcome, ControllerError> {
        let now = self.clock.now();

        // Gate on state.
        if req.is_ready() || req.is_terminal() {
            debug!("request already terminal, nothing to do");
            return Ok(ReconcileOutcome::Done);
        }
        if req.is_approved() == req.is_denied() {
            // Neither or both set: not a valid (Approved XOR Denied) state.
            debug!("request not in approved-xor-denied state, waiting");
            return Ok(ReconcileOutcome::Done);
        }

        // Match to a known issuer type.
        let issuer_ref = match req.issuer_ref() {
            Some(r) => r,
            None => {
                debug!("request's issuer reference could not be parsed, treating as foreign");
                return Ok(ReconcileOutcome::Done);
            }
        };
        let backend = match self.find_backend(&issuer_ref) {
            Some(backend) => backend.clone(),
            None => {
                debug!(kind = %issuer_ref.kind_id, "request targets an unregistered or disallowed issuer kind, ignoring");
                return Ok(ReconcileOutcome::Done);
            }
        };

        // Optional pre-gate hook.
        if let Some(ignore) = &self.ignore {
            if ignore(req, &issuer_ref.kind_id, &issuer_ref.name) {
                debug!("request ignored by pre-gate hook");
                return Ok(ReconcileOutcome::Done);
            }
        }

        // Denied is terminal and takes priority; otherwise
        // initialize Ready on variants that track it, if not done yet.
        let mut builder = req.patch_builder(now);
        if req.is_denied() {
            builder.set_denied_terminal();
            let patch = builder.build();
            self.apply_status(req, patch).await?;
            self.emit(req, EventType::Warning, event_reason::PERMANENT_ERROR, "The request was denied".to_string())
                .await;
            return Ok(ReconcileOutcome::Done);
        }
        if R::HAS_READY_CONDITION && req.ready_condition().is_none() {
            builder.set_initializing();
            let patch = builder.build();
            self.apply_status(req, patch).await?;
            return Ok(ReconcileOutcome::Done);
        }

        // Delegate to the matched issuer backend.
        let req_namespace = req.namespace();
        let req_name = req.name_any();
        let request_view = RequestView {
            namespace: req_namespace.as_deref(),
            name: &req_name,
            csr: req.csr(),
        };
        let attempt = backend.attempt_sign(&issuer_ref.key(), request_view).await;

        match attempt {
            SignAttempt::IssuerNotFound => {
                let message = format!(
                    "{} \"{}\" not found. Waiting for it to be created.",
                    issuer_ref.kind_id, issuer_ref.name
                );
                builder.set_waiting_for_issuer_exist(message.clone());
                let patch = builder.build();
                self.apply_status(req, patch).await?;
                self.emit(req, EventType::Normal, event_reason::WAITING_FOR_ISSUER_EXIST, message)
                    .await;
                Ok(ReconcileOutcome::Done)
            }
            SignAttempt::IssuerNotReady(message) => {
                builder.set_waiting_for_issuer_ready(message.clone());
                let patch = builder.build();
                self.apply_status(req, patch).await?;
                self.emit(req, EventType::Normal, event_reason::WAITING_FOR_ISSUER_READY, message)
                    .await;
                Ok(ReconcileOutcome::Done)
            }
            SignAttempt::Signed(bundle) => {
                builder.set_issued(bundle.chain);
                if self.set_ca_on_certificate_request && !bundle.ca.is_empty() {
                    builder.set_ca(bundle.ca);
                }
                let patch = builder.build();
                self.apply_status(req, patch).await?;
                self.emit(
                    req,
                    EventType::Normal,
                    event_reason::ISSUED,
                    "The certificate has been issued".to_string(),
                )
                .await;
                Ok(ReconcileOutcome::Done)
            }
            SignAttempt::SignError(err) => {
                let deadline_passed = !matches!(err.innermost(), SignerError::Pending(_))
                    && req
                        .creation_timestamp()
                        .is_some_and(|created| now > created + self.max_retry_duration);

                let result = triage(&mut builder, &err, deadline_passed);
                let patch = builder.build();
                self.apply_status(req, patch).await?;

                if let Some(message) = result.route_issuer_error {
                    self.router
                        .report_error(backend.router_key(&issuer_ref.key()), anyhow::anyhow!(message))?;
                }
                if let Some((event, message)) = result.event.clone() {
                    self.emit(req, EventType::Warning, event, message).await;
                }

                match result.action {
                    Triage::Done => Ok(ReconcileOutcome::Done),
                    Triage::RequeueSoon => Ok(ReconcileOutcome::RequeueSoon),
                    Triage::Terminal => Ok(ReconcileOutcome::Terminal(err.into())),
                    Triage::RetryWithBackoff => Ok(ReconcileOutcome::RetryWithBackoff(err.into())),
                }
            }
        }
    }

    async fn apply_status(&self, req: &R, patch: serde_json::Value) -> Result<(), ControllerError> {
        use kube::api::{Patch, PatchParams};
        let api = R::api(self.client.clone(), req.namespace().as_deref());
        let params = PatchParams::apply(&self.field_owner).force();
        api.patch_status(&req.name_any(), &params, &Patch::Apply(patch))
            .await
            .map_err(ControllerError::Patch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::reason;

    /// A minimal in-memory `RequestPatchBuilder` used to unit-test
    /// `triage` without a concrete request variant.
    #[derive(Default)]
    struct RecordingBuilder {
        custom_conditions: std::collections::HashMap<String, ConditionStatus>,
        ready_status: Option<ConditionStatus>,
        ready_reason: Option<String>,
        ready_message: Option<String>,
    }

    impl RequestPatchBuilder for RecordingBuilder {
        fn set_initializing(&mut self) {
            self.ready_status = Some(ConditionStatus::Unknown);
            self.ready_reason = Some(reason::INITIALIZING.to_string());
        }
        fn set_denied_terminal(&mut self) {
            self.ready_status = Some(ConditionStatus::False);
            self.ready_reason = Some(reason::DENIED.to_string());
        }
        fn set_waiting_for_issuer_exist(&mut self, message: String) {
            self.ready_status = Some(ConditionStatus::False);
            self.ready_reason = Some(reason::PENDING.to_string());
            self.ready_message = Some(message);
        }
        fn set_waiting_for_issuer_ready(&mut self, message: String) {
            self.set_waiting_for_issuer_exist(message);
        }
        fn set_custom_condition(
            &mut self,
            type_: &str,
            status: ConditionStatus,
            _reason: &str,
            _message: String,
        ) -> bool {
            let existing = self.custom_conditions.get(type_).copied();
            self.custom_conditions.insert(type_.to_string(), status);
            existing != Some(status)
        }
        fn set_pending(&mut self, message: String) {
            self.ready_status = Some(ConditionStatus::False);
            self.ready_reason = Some(reason::PENDING.to_string());
            self.ready_message = Some(message);
        }
        fn set_retryable_error(&mut self, message: String) {
            self.set_pending(message);
        }
        fn set_permanent_error(&mut self, message: String) {
            self.ready_status = Some(ConditionStatus::False);
            self.ready_reason = Some(reason::FAILED.to_string());
            self.ready_message = Some(message);
        }
        fn set_issued(&mut self, _chain: Vec<u8>) {
            self.ready_status = Some(ConditionStatus::True);
            self.ready_reason = Some(reason::ISSUED.to_string());
        }
        fn set_ca(&mut self, _ca: Vec<u8>) {}
        fn build(self: Box<Self>) -> serde_json::Value {
            serde_json::json!({})
        }
    }

    #[test]
    fn pending_never_terminates_even_past_deadline() {
        let mut builder = RecordingBuilder::default();
        let err = SignerError::Pending(anyhow::anyhow!("still working"));
        let result = triage(&mut builder, &err, true);
        assert_eq!(result.action, Triage::RequeueSoon);
        assert_eq!(builder.ready_reason.as_deref(), Some(reason::PENDING));
    }

    #[test]
    fn permanent_is_always_terminal() {
        let mut builder = RecordingBuilder::default();
        let err = SignerError::Permanent(anyhow::anyhow!("no amount of retrying helps"));
        let result = triage(&mut builder, &err, false);
        assert_eq!(result.action, Triage::Terminal);
        assert_eq!(builder.ready_reason.as_deref(), Some(reason::FAILED));
    }

    #[test]
    fn retryable_past_deadline_becomes_terminal() {
        let mut builder = RecordingBuilder::default();
        let err = SignerError::Retryable(anyhow::anyhow!("flaky"));
        let result = triage(&mut builder, &err, true);
        assert_eq!(result.action, Triage::Terminal);
        assert_eq!(builder.ready_reason.as_deref(), Some(reason::FAILED));
    }

    #[test]
    fn retryable_before_deadline_retries_with_backoff() {
        let mut builder = RecordingBuilder::default();
        let err = SignerError::Retryable(anyhow::anyhow!("flaky"));
        let result = triage(&mut builder, &err, false);
        assert_eq!(result.action, Triage::RetryWithBackoff);
        assert_eq!(builder.ready_reason.as_deref(), Some(reason::PENDING));
    }

    #[test]
    fn issuer_error_routes_and_is_done() {
        let mut builder = RecordingBuilder::default();
        let err = SignerError::Issuer(anyhow::anyhow!("vault outage"));
        let result = triage(&mut builder, &err, false);
        assert_eq!(result.action, Triage::Done);
        assert!(result.route_issuer_error.is_some());
        assert!(builder.ready_message.unwrap().contains("outdated"));
    }

    #[test]
    fn set_request_condition_transition_turns_requeue_into_done() {
        let mut builder = RecordingBuilder::default();
        let err = SignerError::SetRequestCondition {
            condition_type: "X".to_string(),
            status: ConditionStatus::True,
            reason: "R".to_string(),
            source: Box::new(SignerError::Pending(anyhow::anyhow!("still working"))),
        };
        let result = triage(&mut builder, &err, false);
        assert_eq!(result.action, Triage::Done);
        assert_eq!(builder.custom_conditions.get("X"), Some(&ConditionStatus::True));
    }

    #[test]
    fn set_request_condition_no_transition_keeps_requeue_soon() {
        let mut builder = RecordingBuilder::default();
        // Pre-seed the same status so the second write doesn't transition.
        builder.set_custom_condition("X", ConditionStatus::True, "R", String::new());
        let err = SignerError::SetRequestCondition {
            condition_type: "X".to_string(),
            status: ConditionStatus::True,
            reason: "R".to_string(),
            source: Box::new(SignerError::Pending(anyhow::anyhow!("still working"))),
        };
        let result = triage(&mut builder, &err, false);
        assert_eq!(result.action, Triage::RequeueSoon);
    }

    #[test]
    fn set_request_condition_transition_turns_retry_into_terminal() {
        let mut builder = RecordingBuilder::default();
        let err = SignerError::SetRequestCondition {
            condition_type: "X".to_string(),
            status: ConditionStatus::True,
            reason: "R".to_string(),
            source: Box::new(SignerError::Retryable(anyhow::anyhow!("why"))),
        };
        let result = triage(&mut builder, &err, false);
        assert_eq!(result.action, Triage::Terminal);
    }

    #[test]
    fn issuer_readiness_absent_condition() {
        let message = issuer_readiness_message(None, 1).unwrap();
        assert!(message.contains("<none>"));
    }

    #[test]
    fn issuer_readiness_outdated_generation() {
        let ready = ConditionView {
            type_: "Ready".into(),
            status: ConditionStatus::True,
            reason: reason::CHECKED.into(),
            message: String::new(),
            observed_generation: Some(1),
            last_transition_time: None,
        };
        let message = issuer_readiness_message(Some(&ready), 2).unwrap();
        assert!(message.contains("outdated"));
    }

    #[test]
    fn issuer_readiness_not_true() {
        let ready = ConditionView {
            type_: "Ready".into(),
            status: ConditionStatus::False,
            reason: reason::PENDING.into(),
            message: "vault sealed".into(),
            observed_generation: Some(2),
            last_transition_time: None,
        };
        let message = issuer_readiness_message(Some(&ready), 2).unwrap();
        assert!(message.contains("Pending"));
        assert!(message.contains("vault sealed"));
    }

    #[test]
    fn issuer_readiness_ready_is_none() {
        let ready = ConditionView {
            type_: "Ready".into(),
            status: ConditionStatus::True,
            reason: reason::CHECKED.into(),
            message: String::new(),
            observed_generation: Some(2),
            last_transition_time: None,
        };
        assert!(issuer_readiness_message(Some(&ready), 2).is_none());
    }
}
