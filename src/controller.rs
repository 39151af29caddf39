//! `CombinedController` wires the `IssuerController`/`RequestController`
//! engine into running `kube_runtime::Controller` watch loops — one per
//! registered issuer kind, plus one for each enabled request variant.
//!
//! Follows the familiar `Controller::new(api, watcher::Config::default())
//! .reconcile_all_on(reload_rx).shutdown_on_signal().run(reconcile,
//! error_policy, ctx)` wiring, generalized to many registered kinds via the
//! same type-erasure `RequestController` already uses for issuer backends
//! (`IssuerBackend`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller as KubeController, WatchStreamExt};
use kube::{Client, ResourceExt};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::clock::{Clock, UtcClock};
use crate::event_router::EventRouter;
use crate::issuer::IssuerController;
use crate::issuer::IssuerObject;
use crate::keys::ObjectKey;
use crate::predicates::{issuer_semantic_change, request_semantic_change};
use crate::request::cluster::CertificateSigningRequest;
use crate::request::namespaced::CertificateRequest;
use crate::request::{IssuerBackend, IssuerScope, RequestController, RequestObject};
use crate::signer::Signer;

const RETRY_AFTER: Duration = Duration::from_secs(5);
const REQUEUE_SOON_AFTER: Duration = Duration::from_secs(1);
const RESYNC_PERIOD: Duration = Duration::from_secs(300);

/// Configuration surface shared by every registered controller.
pub struct Options {
    /// Stable field-manager string for server-side apply: one stable
    /// field-manager name per controller instance.
    pub field_owner: String,
    /// Wall-clock budget after which a request's retryable error becomes
    /// permanent.
    pub max_retry_duration: chrono::Duration,
    pub clock: Arc<dyn Clock>,
    /// Back-compat: copies `Sign`'s returned CA bytes into the namespaced
    /// variant's `CA` status field too.
    pub set_ca_on_certificate_request: bool,
    pub disable_certificate_request_controller: bool,
    pub disable_kubernetes_csr_controller: bool,
    pub ignore_certificate_request: Option<Arc<dyn Fn(&CertificateRequest, &str, &str) -> bool + Send + Sync>>,
    pub ignore_kubernetes_csr: Option<Arc<dyn Fn(&CertificateSigningRequest, &str, &str) -> bool + Send + Sync>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            field_owner: "issuer-lib".to_string(),
            max_retry_duration: chrono::Duration::hours(1),
            clock: Arc::new(UtcClock),
            set_ca_on_certificate_request: false,
            disable_certificate_request_controller: false,
            disable_kubernetes_csr_controller: false,
            ignore_certificate_request: None,
            ignore_kubernetes_csr: None,
        }
    }
}

/// Spawns and drives the `kube_runtime::Controller` loop for one registered
/// issuer kind, type-erased so `CombinedController` doesn't need to be
/// generic over every kind at once (same trick as `IssuerBackend`).
#[async_trait]
trait IssuerRunner: Send + Sync {
    async fn run(self: Box<Self>, client: Client, router: Arc<EventRouter>, options: Arc<Options>);
}

struct ConcreteIssuerRunner<I, S> {
    signer: Arc<S>,
    ignore: Option<Arc<dyn Fn(&I) -> bool + Send + Sync>>,
}

#[async_trait]
impl<I, S> IssuerRunner for ConcreteIssuerRunner<I, S>
where
    I: IssuerObject,
    S: Signer<I>,
{
    async fn run(self: Box<Self>, client: Client, router: Arc<EventRouter>, options: Arc<Options>) {
        let ping_rx = router.register_consumer(I::kind_id());
        let controller = Arc::new(IssuerController {
            client: client.clone(),
            signer: self.signer,
            router,
            clock: options.clock.clone(),
            field_owner: options.field_owner.clone(),
            reporter: kube::runtime::events::Reporter::from(options.field_owner.clone()),
            ignore: self.ignore,
        });

        let api = I::api(client, None);
        info!(kind = I::kind_id(), "starting issuer watch");
        KubeController::new(api, watcher::Config::default())
            .predicate_filter(issuer_semantic_change)
            .reconcile_all_on(UnboundedReceiverStream::new(ping_rx))
            .shutdown_on_signal()
            .run(
                |issuer, ctx: Arc<IssuerController<I, S>>| async move {
                    let key = ObjectKey::new(issuer.namespace(), issuer.name_any());
                    ctx.reconcile(key).await.map(|_| Action::requeue(RESYNC_PERIOD))
                },
                |issuer, error, _ctx| {
                    warn!(issuer = %issuer.name_any(), error = %error, "issuer reconcile failed");
                    Action::requeue(RETRY_AFTER)
                },
                controller,
            )
            .for_each(|res| async move {
                if let Err(error) = res {
                    warn!(kind = I::kind_id(), %error, "issuer controller stream error");
                }
            })
            .await;
        info!(kind = I::kind_id(), "issuer watch terminated");
    }
}

/// Assembles every registered issuer kind plus the enabled request variants
/// into one process's set of running watch loops.
pub struct CombinedController {
    client: Client,
    router: Arc<EventRouter>,
    options: Arc<Options>,
    backends: Vec<Arc<dyn IssuerBackend>>,
    runners: Vec<Box<dyn IssuerRunner>>,
}

impl CombinedController {
    pub fn new(client: Client, options: Options) -> Self {
        Self {
            client,
            router: Arc::new(EventRouter::new()),
            options: Arc::new(options),
            backends: Vec::new(),
            runners: Vec::new(),
        }
    }

    /// Registers one `(IssuerTypes/ClusterIssuerTypes entry, Sign/Check
    /// implementation)` pair. `scope` controls which request variant
    /// (`ALLOWED_ISSUER_SCOPES`) may reference this kind.
    pub fn register_issuer<I, S>(&mut self, signer: Arc<S>, scope: IssuerScope)
    where
        I: IssuerObject,
        S: Signer<I>,
    {
        self.register_issuer_with_ignore::<I, S>(signer, scope, None)
    }

    pub fn register_issuer_with_ignore<I, S>(
        &mut self,
        signer: Arc<S>,
        scope: IssuerScope,
        ignore: Option<Arc<dyn Fn(&I) -> bool + Send + Sync>>,
    ) where
        I: IssuerObject,
        S: Signer<I>,
    {
        self.backends.push(Arc::new(crate::request::ConcreteIssuerBackend::new(
            self.client.clone(),
            signer.clone(),
            I::kind_id(),
            scope,
        )));
        self.runners.push(Box::new(ConcreteIssuerRunner { signer, ignore }));
    }

    async fn run_certificate_requests(&self) {
        let mut controller = RequestController::<CertificateRequest>::new(
            self.client.clone(),
            self.router.clone(),
            self.options.clock.clone(),
            self.options.field_owner.clone(),
            self.options.max_retry_duration,
            self.backends.clone(),
        );
        controller.ignore = self.options.ignore_certificate_request.clone();
        controller.set_ca_on_certificate_request = self.options.set_ca_on_certificate_request;
        let controller = Arc::new(controller);

        let ready_rx = self.router.register_ready_listener();
        let api = CertificateRequest::api(self.client.clone(), None);
        info!("starting CertificateRequest watch");
        KubeController::new(api, watcher::Config::default())
            .predicate_filter(request_semantic_change::<CertificateRequest>)
            .reconcile_all_on(UnboundedReceiverStream::new(ready_rx))
            .shutdown_on_signal()
            .run(
                |req, ctx: Arc<RequestController<CertificateRequest>>| async move { reconcile_request(ctx, req).await },
                |req, error, _ctx| {
                    warn!(request = %req.name_any(), %error, "certificate request reconcile failed");
                    Action::requeue(RETRY_AFTER)
                },
                controller,
            )
            .for_each(|res| async move {
                if let Err(error) = res {
                    warn!(%error, "certificate request controller stream error");
                }
            })
            .await;
        info!("CertificateRequest watch terminated");
    }

    async fn run_kubernetes_csrs(&self) {
        let mut controller = RequestController::<CertificateSigningRequest>::new(
            self.client.clone(),
            self.router.clone(),
            self.options.clock.clone(),
            self.options.field_owner.clone(),
            self.options.max_retry_duration,
            self.backends.clone(),
        );
        controller.ignore = self.options.ignore_kubernetes_csr.clone();
        let controller = Arc::new(controller);

        let ready_rx = self.router.register_ready_listener();
        let api = CertificateSigningRequest::api(self.client.clone(), None);
        info!("starting CertificateSigningRequest watch");
        KubeController::new(api, watcher::Config::default())
            .predicate_filter(request_semantic_change::<CertificateSigningRequest>)
            .reconcile_all_on(UnboundedReceiverStream::new(ready_rx))
            .shutdown_on_signal()
            .run(
                |req, ctx: Arc<RequestController<CertificateSigningRequest>>| async move {
                    reconcile_request(ctx, req).await
                },
                |req, error, _ctx| {
                    warn!(request = %req.name_any(), %error, "CSR reconcile failed");
                    Action::requeue(RETRY_AFTER)
                },
                controller,
            )
            .for_each(|res| async move {
                if let Err(error) = res {
                    warn!(%error, "Kubernetes CSR controller stream error");
                }
            })
            .await;
        info!("CertificateSigningRequest watch terminated");
    }

    /// Runs every registered issuer watch and the enabled request-variant
    /// watches concurrently until shut down. At least one request variant
    /// must remain enabled.
    pub async fn run(mut self) {
        assert!(
            !(self.options.disable_certificate_request_controller
                && self.options.disable_kubernetes_csr_controller),
            "at least one request controller must remain enabled"
        );

        let runners = std::mem::take(&mut self.runners);
        let client = self.client.clone();
        let router = self.router.clone();
        let options = self.options.clone();
        let this = Arc::new(self);

        let mut tasks = Vec::new();
        for runner in runners {
            let client = client.clone();
            let router = router.clone();
            let options = options.clone();
            tasks.push(tokio::spawn(
                async move { runner.run(client, router, options).await },
            ));
        }
        if !this.options.disable_certificate_request_controller {
            let this = this.clone();
            tasks.push(tokio::spawn(async move { this.run_certificate_requests().await }));
        }
        if !this.options.disable_kubernetes_csr_controller {
            let this = this.clone();
            tasks.push(tokio::spawn(async move { this.run_kubernetes_csrs().await }));
        }

        for task in tasks {
            let _ = task.await;
        }
    }
}

async fn reconcile_request<R>(
    ctx: Arc<RequestController<R>>,
    req: Arc<R>,
) -> Result<Action, crate::error::ControllerError>
where
    R: crate::request::RequestObject,
{
    use crate::request::ReconcileOutcome;
    match ctx.reconcile(&req).await? {
        ReconcileOutcome::Done => Ok(Action::requeue(RESYNC_PERIOD)),
        ReconcileOutcome::RequeueSoon => Ok(Action::requeue(REQUEUE_SOON_AFTER)),
        ReconcileOutcome::RetryWithBackoff(error) => {
            Err(crate::error::ControllerError::Signer(crate::error::SignerError::Retryable(error)))
        }
        ReconcileOutcome::Terminal(error) => {
            warn!(request = %req.name_any(), %error, "request terminally failed");
            Ok(Action::requeue(RESYNC_PERIOD))
        }
    }
}
